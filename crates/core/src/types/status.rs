//! Status and classification enums for ledger entities.
//!
//! All enums serialize as `SCREAMING_SNAKE_CASE`, matching the wire format
//! the dashboard clients already send (`"TRUCK"`, `"TANKER_TO_DATUM"`, ...).
//! With the `postgres` feature they map onto the enum types created in the
//! `fuelops` schema.

use serde::{Deserialize, Serialize};

/// Kind of storage unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "fuelops.unit_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitType {
    /// Mobile tanker. Ledger activity is trip-scoped.
    Truck,
    /// Fixed storage tank at a depot.
    Datum,
    /// Any other fixed storage.
    Storage,
}

impl UnitType {
    /// Whether operations against this unit require a trip for the day.
    #[must_use]
    pub const fn is_trip_scoped(self) -> bool {
        matches!(self, Self::Truck)
    }
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truck => write!(f, "TRUCK"),
            Self::Datum => write!(f, "DATUM"),
            Self::Storage => write!(f, "STORAGE"),
        }
    }
}

impl std::str::FromStr for UnitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRUCK" => Ok(Self::Truck),
            "DATUM" => Ok(Self::Datum),
            "STORAGE" => Ok(Self::Storage),
            _ => Err(format!("invalid unit type: {s}")),
        }
    }
}

/// How a lot came into a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "fuelops.load_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    /// Fuel bought from a supplier.
    Purchase,
    /// Destination-side credit of an internal transfer.
    TransferIn,
}

impl LoadType {
    /// Prefix used when coding lots of this type.
    #[must_use]
    pub const fn code_prefix(self) -> &'static str {
        match self {
            Self::Purchase => "LOT",
            Self::TransferIn => "TRF",
        }
    }
}

impl std::fmt::Display for LoadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Purchase => write!(f, "PURCHASE"),
            Self::TransferIn => write!(f, "TRANSFER_IN"),
        }
    }
}

impl std::str::FromStr for LoadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PURCHASE" => Ok(Self::Purchase),
            "TRANSFER_IN" => Ok(Self::TransferIn),
            _ => Err(format!("invalid load type: {s}")),
        }
    }
}

/// Derived depletion state of a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    /// Some volume remains.
    Active,
    /// Fully depleted.
    Sold,
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Sold => write!(f, "SOLD"),
        }
    }
}

/// Ledger activity posted against a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "fuelops.activity", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Activity {
    /// Sale to an external vehicle.
    Sale,
    /// Internal transfer between two tankers.
    TankerToTanker,
    /// Internal transfer from a tanker into fixed storage.
    TankerToDatum,
    /// Fuel drawn for quality testing.
    Testing,
}

impl Activity {
    /// Whether this activity is an internal transfer between units.
    #[must_use]
    pub const fn is_internal_transfer(self) -> bool {
        matches!(self, Self::TankerToTanker | Self::TankerToDatum)
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sale => write!(f, "SALE"),
            Self::TankerToTanker => write!(f, "TANKER_TO_TANKER"),
            Self::TankerToDatum => write!(f, "TANKER_TO_DATUM"),
            Self::Testing => write!(f, "TESTING"),
        }
    }
}

/// Lifecycle state of a trip, derived from its readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripState {
    /// Created, no opening reading yet.
    Created,
    /// Opening recorded, not yet closed.
    Opened,
    /// Closing recorded.
    Closed,
}

/// Outcome of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    /// Meter and ledger agree within tolerance.
    Balanced,
    /// Meter and ledger disagree beyond tolerance.
    Imbalanced,
    /// Readings are missing, so the meter side cannot be computed.
    Unknown,
}

/// Kind of change recorded in the transfer audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "fuelops.audit_action", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Volume or time patched.
    Edit,
    /// Record voided and its effect reversed.
    Void,
}
