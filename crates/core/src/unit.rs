//! Unit registry types: tankers and fixed storage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::types::{Liters, UnitId, UnitType};

const MAX_UNIT_CODE_LEN: usize = 16;
const MAX_VEHICLE_NUMBER_LEN: usize = 20;

/// A mobile tanker or fixed storage unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    /// Unique human-readable code, embedded in lot codes.
    pub unit_code: String,
    pub unit_type: UnitType,
    pub vehicle_number: Option<String>,
    pub capacity_liters: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Unit {
    /// Reject operations against a deactivated unit.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` if the unit is inactive.
    pub fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.active {
            Ok(())
        } else {
            Err(LedgerError::validation(format!(
                "unit {} is inactive",
                self.unit_code
            )))
        }
    }

    /// Check that `volume` more fits on top of `in_stock`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` if the unit would overflow.
    pub fn ensure_capacity(&self, in_stock: Liters, volume: Liters) -> Result<(), LedgerError> {
        if in_stock + volume > Decimal::from(self.capacity_liters) {
            return Err(LedgerError::validation(format!(
                "loading {} L into {} would exceed its capacity of {} L ({} L in stock)",
                volume.normalize(),
                self.unit_code,
                self.capacity_liters,
                in_stock.normalize()
            )));
        }
        Ok(())
    }
}

/// Input for registering a unit.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUnit {
    pub unit_code: String,
    pub unit_type: UnitType,
    pub capacity_liters: i32,
    pub vehicle_number: Option<String>,
}

impl NewUnit {
    /// Validate and normalize the input.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for a malformed code, vehicle number
    /// or non-positive capacity.
    pub fn validate(self) -> Result<Self, LedgerError> {
        Ok(Self {
            unit_code: normalize_unit_code(&self.unit_code)?,
            unit_type: self.unit_type,
            capacity_liters: validate_capacity(self.capacity_liters)?,
            vehicle_number: self
                .vehicle_number
                .as_deref()
                .map(normalize_vehicle_number)
                .transpose()?
                .flatten(),
        })
    }
}

/// Partial update for a unit. The unit type never changes once registered.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitPatch {
    pub unit_code: Option<String>,
    pub capacity_liters: Option<i32>,
    pub vehicle_number: Option<String>,
}

impl UnitPatch {
    /// Validate and normalize the patch.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for an empty patch or malformed field.
    pub fn validate(self) -> Result<Self, LedgerError> {
        if self.unit_code.is_none() && self.capacity_liters.is_none() && self.vehicle_number.is_none()
        {
            return Err(LedgerError::validation("unit patch has no fields"));
        }
        Ok(Self {
            unit_code: self
                .unit_code
                .as_deref()
                .map(normalize_unit_code)
                .transpose()?,
            capacity_liters: self.capacity_liters.map(validate_capacity).transpose()?,
            vehicle_number: self
                .vehicle_number
                .as_deref()
                .map(normalize_vehicle_number)
                .transpose()?
                .flatten(),
        })
    }
}

/// Normalize a unit code: trimmed, upper-case, `[A-Z0-9-]`, at most 16 chars.
///
/// # Errors
///
/// Returns `LedgerError::Validation` if the code is empty, too long, or has
/// characters outside the allowed set.
pub fn normalize_unit_code(raw: &str) -> Result<String, LedgerError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(LedgerError::validation("unit_code is required"));
    }
    if code.len() > MAX_UNIT_CODE_LEN {
        return Err(LedgerError::validation(format!(
            "unit_code must be at most {MAX_UNIT_CODE_LEN} characters"
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(LedgerError::validation(
            "unit_code may only contain letters, digits and '-'",
        ));
    }
    Ok(code)
}

/// Normalize a vehicle registration number. Blank input means "none".
///
/// # Errors
///
/// Returns `LedgerError::Validation` if the number is too long.
pub fn normalize_vehicle_number(raw: &str) -> Result<Option<String>, LedgerError> {
    let number: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    if number.is_empty() {
        return Ok(None);
    }
    if number.len() > MAX_VEHICLE_NUMBER_LEN {
        return Err(LedgerError::validation(format!(
            "vehicle number must be at most {MAX_VEHICLE_NUMBER_LEN} characters"
        )));
    }
    Ok(Some(number))
}

fn validate_capacity(capacity: i32) -> Result<i32, LedgerError> {
    if capacity > 0 {
        Ok(capacity)
    } else {
        Err(LedgerError::validation("capacity_liters must be positive"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_code_is_normalized() {
        assert_eq!(normalize_unit_code("  t1 ").unwrap(), "T1");
        assert_eq!(normalize_unit_code("datum-2").unwrap(), "DATUM-2");
    }

    #[test]
    fn test_unit_code_rejects_bad_input() {
        assert!(normalize_unit_code("").is_err());
        assert!(normalize_unit_code("T 1").is_err());
        assert!(normalize_unit_code(&"X".repeat(17)).is_err());
    }

    #[test]
    fn test_new_unit_requires_positive_capacity() {
        let input = NewUnit {
            unit_code: "T1".to_string(),
            unit_type: UnitType::Truck,
            capacity_liters: 0,
            vehicle_number: None,
        };
        assert!(matches!(input.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_new_unit_normalizes_vehicle_number() {
        let input = NewUnit {
            unit_code: "t1".to_string(),
            unit_type: UnitType::Truck,
            capacity_liters: 6000,
            vehicle_number: Some("ap09 ab 1234".to_string()),
        };
        let unit = input.validate().unwrap();
        assert_eq!(unit.unit_code, "T1");
        assert_eq!(unit.vehicle_number.as_deref(), Some("AP09AB1234"));
    }

    #[test]
    fn test_blank_vehicle_number_is_none() {
        assert_eq!(normalize_vehicle_number("   ").unwrap(), None);
    }

    #[test]
    fn test_empty_patch_is_rejected() {
        assert!(UnitPatch::default().validate().is_err());
    }
}
