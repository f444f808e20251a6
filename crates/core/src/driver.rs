//! Driver records referenced by trips and transfers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::types::DriverId;

const MAX_NAME_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 20;
const MAX_LICENSE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    pub phone: Option<String>,
    pub license_no: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDriver {
    pub name: String,
    pub phone: Option<String>,
    pub license_no: Option<String>,
}

impl NewDriver {
    /// Trim and validate the input.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for a blank name or over-long field.
    pub fn validate(self) -> Result<Self, LedgerError> {
        Ok(Self {
            name: required(&self.name, "name", MAX_NAME_LEN)?,
            phone: optional(self.phone.as_deref(), "phone", MAX_PHONE_LEN)?,
            license_no: optional(self.license_no.as_deref(), "license_no", MAX_LICENSE_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub license_no: Option<String>,
}

impl DriverPatch {
    /// Trim and validate the patch.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for an empty patch, blank name or
    /// over-long field.
    pub fn validate(self) -> Result<Self, LedgerError> {
        if self.name.is_none() && self.phone.is_none() && self.license_no.is_none() {
            return Err(LedgerError::validation("driver patch has no fields"));
        }
        Ok(Self {
            name: self
                .name
                .as_deref()
                .map(|n| required(n, "name", MAX_NAME_LEN))
                .transpose()?,
            phone: optional(self.phone.as_deref(), "phone", MAX_PHONE_LEN)?,
            license_no: optional(self.license_no.as_deref(), "license_no", MAX_LICENSE_LEN)?,
        })
    }
}

fn required(raw: &str, field: &str, max: usize) -> Result<String, LedgerError> {
    optional(Some(raw), field, max)?
        .ok_or_else(|| LedgerError::validation(format!("{field} is required")))
}

fn optional(raw: Option<&str>, field: &str, max: usize) -> Result<Option<String>, LedgerError> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.chars().count() > max {
        return Err(LedgerError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(Some(value.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_driver_trims_fields() {
        let driver = NewDriver {
            name: "  Ravi Kumar ".to_string(),
            phone: Some(" ".to_string()),
            license_no: Some("AP0920190001234".to_string()),
        }
        .validate()
        .unwrap();
        assert_eq!(driver.name, "Ravi Kumar");
        assert_eq!(driver.phone, None);
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let input = NewDriver {
            name: "   ".to_string(),
            phone: None,
            license_no: None,
        };
        assert!(input.validate().is_err());
        let patch = DriverPatch {
            name: Some(String::new()),
            ..DriverPatch::default()
        };
        assert!(patch.validate().is_err());
    }
}
