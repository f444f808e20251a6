//! Unit and driver registry.

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, instrument};

use fuelops_core::driver::{Driver, DriverPatch, NewDriver};
use fuelops_core::lot::LotBook;
use fuelops_core::unit::{NewUnit, Unit, UnitPatch};
use fuelops_core::{DriverId, LedgerError, UnitId, UnitType};

use super::{LockedUnits, ServiceError, found, not_found};
use crate::db::{DriverRepository, UnitRepository, lots, trips, units};

/// Registry operations for units and drivers.
pub struct RegistryService<'a> {
    pool: &'a PgPool,
}

impl<'a> RegistryService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Register a unit.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed code, capacity or vehicle number
    /// - `Conflict` if the code is taken
    #[instrument(skip(self, input), fields(unit_code = %input.unit_code))]
    pub async fn create_unit(&self, input: NewUnit) -> Result<Unit, ServiceError> {
        let input = input.validate()?;
        let unit = UnitRepository::new(self.pool).create(&input).await?;
        info!(unit_id = %unit.id, unit_type = %unit.unit_type, "Unit registered");
        Ok(unit)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the unit does not exist.
    pub async fn get_unit(&self, id: UnitId) -> Result<Unit, ServiceError> {
        let unit = UnitRepository::new(self.pool).get(id).await?;
        found(unit, "unit", id)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn list_units(&self, unit_type: Option<UnitType>) -> Result<Vec<Unit>, ServiceError> {
        Ok(UnitRepository::new(self.pool).list(unit_type).await?)
    }

    /// Update a unit's code, capacity or vehicle number.
    ///
    /// Capacity may not drop below the unit's current stock.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed patch or a capacity below stock
    /// - `NotFound` if the unit does not exist
    /// - `Conflict` if the new code is taken
    #[instrument(skip(self, patch), fields(unit_id = %id))]
    pub async fn update_unit(&self, id: UnitId, patch: UnitPatch) -> Result<Unit, ServiceError> {
        let patch = patch.validate()?;
        let mut tx = self.pool.begin().await?;

        let unit = lock_unit(&mut tx, id).await?;
        if let Some(capacity) = patch.capacity_liters {
            let lots = lots::lock_for_unit(&mut tx, id, &[]).await?;
            let in_stock = LotBook::new(&unit, lots).available();
            if in_stock > Decimal::from(capacity) {
                return Err(LedgerError::validation(format!(
                    "capacity {capacity} L is below the {} L held by {}",
                    in_stock.normalize(),
                    unit.unit_code
                ))
                .into());
            }
        }
        let unit = units::update(&mut tx, id, &patch).await.map_err(not_found("unit", id))?;

        tx.commit().await?;
        info!(unit_code = %unit.unit_code, "Unit updated");
        Ok(unit)
    }

    /// Deactivate a unit. Units are never deleted.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the unit does not exist
    /// - `Conflict` if a trip on the unit is opened but not closed
    #[instrument(skip(self), fields(unit_id = %id))]
    pub async fn deactivate_unit(&self, id: UnitId) -> Result<Unit, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let unit = lock_unit(&mut tx, id).await?;
        if unit.unit_type.is_trip_scoped() && trips::has_unclosed_opening(&mut tx, id).await? {
            return Err(LedgerError::conflict(format!(
                "unit {} has an open trip; close it before deactivating",
                unit.unit_code
            ))
            .into());
        }
        let unit = units::set_active(&mut tx, id, false).await?;

        tx.commit().await?;
        info!(unit_code = %unit.unit_code, "Unit deactivated");
        Ok(unit)
    }

    /// Register a driver.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank name.
    #[instrument(skip(self, input))]
    pub async fn create_driver(&self, input: NewDriver) -> Result<Driver, ServiceError> {
        let input = input.validate()?;
        let driver = DriverRepository::new(self.pool).create(&input).await?;
        info!(driver_id = %driver.id, "Driver registered");
        Ok(driver)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn list_drivers(&self, active_only: bool) -> Result<Vec<Driver>, ServiceError> {
        Ok(DriverRepository::new(self.pool).list(active_only).await?)
    }

    /// # Errors
    ///
    /// - `Validation` for a malformed patch
    /// - `NotFound` if the driver does not exist
    #[instrument(skip(self, patch), fields(driver_id = %id))]
    pub async fn update_driver(
        &self,
        id: DriverId,
        patch: DriverPatch,
    ) -> Result<Driver, ServiceError> {
        let patch = patch.validate()?;
        DriverRepository::new(self.pool)
            .update(id, &patch)
            .await
            .map_err(not_found("driver", id))
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the driver does not exist.
    #[instrument(skip(self), fields(driver_id = %id))]
    pub async fn deactivate_driver(&self, id: DriverId) -> Result<Driver, ServiceError> {
        let driver = DriverRepository::new(self.pool)
            .deactivate(id)
            .await
            .map_err(not_found("driver", id))?;
        info!("Driver deactivated");
        Ok(driver)
    }
}

/// Lock a single unit row.
pub(crate) async fn lock_unit(
    conn: &mut sqlx::PgConnection,
    id: UnitId,
) -> Result<Unit, ServiceError> {
    let locked = LockedUnits::lock(conn, &[id]).await?;
    locked.get(id).cloned()
}
