//! Database operations for the ledger `PostgreSQL` schema.
//!
//! # Schema: `fuelops`
//!
//! ## Tables
//!
//! - `unit` - Tankers and fixed storage
//! - `driver` - Driver records
//! - `lot` - Purchase lots and transfer credits (`used_liters` is the only mutable volume)
//! - `trip` - Per-truck, per-date trip sessions
//! - `transfer` - Sales, internal transfers and testing draws (never deleted, voided instead)
//! - `transfer_audit` - Edit/void history of transfers
//! - `meter_snapshot` - Operator-reported meter readings
//! - `day_odometer` - Odometer readings per truck+date
//! - `day_log` - Operator notes per unit+date
//!
//! # Transactions
//!
//! Writers lock unit rows with `SELECT ... FOR UPDATE` in ascending id order,
//! then the unit's open lots, and hold both until commit. Functions that run
//! inside such a transaction take `&mut PgConnection`; pool-level CRUD lives on
//! the `*Repository` structs.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p fuelops-cli -- migrate
//! ```

pub mod drivers;
pub mod lots;
pub mod readings;
pub mod snapshots;
pub mod transfers;
pub mod trips;
pub mod units;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use drivers::DriverRepository;
pub use units::UnitRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate unit code).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &secrecy::SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(max_connections.min(2))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique or check violation on `constraint` to `RepositoryError::Conflict`.
pub(crate) fn map_constraint(
    e: sqlx::Error,
    constraint: &str,
    message: impl FnOnce() -> String,
) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some(constraint)
    {
        return RepositoryError::Conflict(message());
    }
    RepositoryError::Database(e)
}
