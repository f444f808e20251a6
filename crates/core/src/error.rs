//! Business-rule error taxonomy shared by every ledger component.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::Liters;

/// Errors raised by ledger rules.
///
/// Every variant leaves ledger state untouched: callers run the rule before
/// writing, and writers roll the surrounding transaction back on error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Malformed input (negative volume, closing below opening, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The active lot cannot cover the requested debit.
    #[error(
        "insufficient stock in lot {lot_code}: requested {requested} L, remaining {remaining} L"
    )]
    InsufficientStock {
        lot_code: String,
        requested: Liters,
        remaining: Liters,
    },

    /// The unit as a whole cannot cover the requested volume.
    #[error("overdraw on unit {unit_code}: requested {requested} L, available {available} L")]
    Overdraw {
        unit_code: String,
        requested: Liters,
        available: Liters,
    },

    /// Readings are locked until a trip exists for the truck and date.
    #[error("readings locked: no trip exists for {unit_code} on {date}")]
    TripRequired { unit_code: String, date: NaiveDate },

    /// State conflict or concurrent mutation; the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
}

impl LedgerError {
    /// Build a `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Build a `NotFound` error for an entity.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Overdraw { .. } => "overdraw",
            Self::TripRequired { .. } => "trip_required",
            Self::Conflict(_) => "conflict",
            Self::NotFound { .. } => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_insufficient_stock_message() {
        let err = LedgerError::InsufficientStock {
            lot_code: "LOT05MAR24T1A4000".to_string(),
            requested: Decimal::from(3000),
            remaining: Decimal::from(2500),
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock in lot LOT05MAR24T1A4000: requested 3000 L, remaining 2500 L"
        );
        assert_eq!(err.kind(), "insufficient_stock");
    }

    #[test]
    fn test_trip_required_message() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap_or_default();
        let err = LedgerError::TripRequired {
            unit_code: "T1".to_string(),
            date,
        };
        assert_eq!(
            err.to_string(),
            "readings locked: no trip exists for T1 on 2024-03-06"
        );
    }

    #[test]
    fn test_not_found_builder() {
        let err = LedgerError::not_found("lot", 9);
        assert_eq!(err.to_string(), "lot 9 not found");
        assert_eq!(err.kind(), "not_found");
    }
}
