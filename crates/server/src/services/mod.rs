//! Ledger services.
//!
//! Each service owns one family of operations and runs every write in a
//! single transaction:
//!
//! 1. Lock the affected unit rows (ascending id)
//! 2. Lock the lots the write touches
//! 3. Apply the rule from `fuelops_core` to the locked state
//! 4. Persist the result and commit
//!
//! Any error drops the transaction, which rolls it back, so a failed
//! operation leaves no trace. Reads run in a read-only
//! `REPEATABLE READ` snapshot so multi-query reports see one consistent
//! state.

pub mod ledger;
pub mod readings;
pub mod registry;
pub mod reports;
pub mod transfers;
pub mod trips;

use std::fmt::Display;

use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

use fuelops_core::unit::Unit;
use fuelops_core::{LedgerError, UnitId};

use crate::db::{RepositoryError, units};

pub use ledger::LedgerService;
pub use readings::ReadingsService;
pub use registry::RegistryService;
pub use reports::ReportService;
pub use transfers::TransferService;
pub use trips::TripService;

/// Errors returned by service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A ledger rule rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The database rejected or failed the operation.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Turn a bare `RepositoryError::NotFound` into a named ledger error.
pub(crate) fn not_found(
    entity: &'static str,
    id: impl Display,
) -> impl FnOnce(RepositoryError) -> ServiceError {
    move |err| match err {
        RepositoryError::NotFound => LedgerError::not_found(entity, id).into(),
        other => other.into(),
    }
}

/// Unwrap an optional row or fail with `NotFound`.
pub(crate) fn found<T>(
    value: Option<T>,
    entity: &'static str,
    id: impl Display,
) -> Result<T, ServiceError> {
    value.ok_or_else(|| LedgerError::not_found(entity, id).into())
}

/// Unit rows held under `FOR UPDATE` for the rest of a write.
#[derive(Debug)]
pub(crate) struct LockedUnits(Vec<Unit>);

impl LockedUnits {
    /// Lock `ids` in ascending order.
    pub(crate) async fn lock(
        conn: &mut sqlx::PgConnection,
        ids: &[UnitId],
    ) -> Result<Self, ServiceError> {
        let listed = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let locked = units::lock_units(conn, ids)
            .await
            .map_err(not_found("unit", listed))?;
        Ok(Self(locked))
    }

    pub(crate) fn get(&self, id: UnitId) -> Result<&Unit, ServiceError> {
        found(self.0.iter().find(|u| u.id == id), "unit", id)
    }

    pub(crate) fn contains(&self, id: UnitId) -> bool {
        self.0.iter().any(|u| u.id == id)
    }
}

/// Reject trip and meter operations on units that are not trucks.
pub(crate) fn ensure_truck(unit: &Unit) -> Result<(), LedgerError> {
    if unit.unit_type.is_trip_scoped() {
        Ok(())
    } else {
        Err(LedgerError::validation(format!(
            "{} is a {} unit; only trucks have trips and dispenser meters",
            unit.unit_code, unit.unit_type
        )))
    }
}

/// Begin a read-only transaction over one consistent snapshot.
pub(crate) async fn read_snapshot(pool: &PgPool) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Operator wall clock. Dates and times in the ledger are local.
pub(crate) fn local_now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}
