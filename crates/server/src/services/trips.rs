//! Trip sessions.
//!
//! Every trip write locks the truck's unit row first. That serializes trip
//! creation per truck and keeps trip writes ordered against transfers,
//! which take the same lock before attaching to a trip.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};

use fuelops_core::trip::{MeterReading, Trip, ensure_deletable, next_trip_no};
use fuelops_core::{DriverId, LedgerError, Liters, TransferId, TripId, UnitId};

use super::registry::lock_unit;
use super::transfers::{unit_ids, void_locked};
use super::{LockedUnits, ServiceError, ensure_truck, found, not_found};
use crate::db::{drivers, transfers, trips};

/// Opening reading with the driver taking the trip.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OpeningInput {
    pub liters: Liters,
    pub at: chrono::NaiveDateTime,
    pub driver_id: Option<DriverId>,
}

impl OpeningInput {
    const fn reading(&self) -> MeterReading {
        MeterReading {
            liters: self.liters,
            at: self.at,
        }
    }
}

/// Readings patch for a trip.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripPatch {
    pub opening: Option<OpeningInput>,
    pub closing: Option<MeterReading>,
    /// Required to replace an existing opening reading.
    #[serde(default)]
    pub edit_opening: bool,
    /// Required to replace an existing closing reading.
    #[serde(default)]
    pub edit_closing: bool,
}

/// A deleted trip and the records voided with it.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedTrip {
    pub trip: Trip,
    pub voided_transfer_ids: Vec<TransferId>,
}

/// Service for trip sessions.
pub struct TripService<'a> {
    pool: &'a PgPool,
}

impl<'a> TripService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create the next trip for a truck and date.
    ///
    /// # Errors
    ///
    /// - `Validation` if the unit is not an active truck
    /// - `Conflict` if an earlier trip of the day is not closed
    /// - `NotFound` if the unit does not exist
    #[instrument(skip(self), fields(truck_id = %truck_id, date = %date))]
    pub async fn create(&self, truck_id: UnitId, date: NaiveDate) -> Result<Trip, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let truck = lock_unit(&mut tx, truck_id).await?;
        ensure_truck(&truck)?;
        truck.ensure_active()?;
        let day = trips::list_for_day(&mut *tx, truck_id, date).await?;
        let trip_no = next_trip_no(&day)?;
        let trip = trips::insert(&mut tx, truck_id, date, trip_no).await?;

        tx.commit().await?;

        info!(trip_id = %trip.id, trip_no, "Trip created");
        Ok(trip)
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn list(&self, truck_id: UnitId, date: NaiveDate) -> Result<Vec<Trip>, ServiceError> {
        Ok(trips::list_for_day(self.pool, truck_id, date).await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the trip does not exist.
    pub async fn get(&self, id: TripId) -> Result<Trip, ServiceError> {
        let trip = trips::get(self.pool, id).await?;
        found(trip, "trip", id)
    }

    /// Record or edit a trip's opening and closing readings.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty patch, a negative reading, or a closing
    ///   below the opening
    /// - `Conflict` if a reading exists and the patch is not an edit, or the
    ///   trip is closed and the patch sets an opening
    /// - `NotFound` if the trip or driver does not exist
    #[instrument(skip(self, patch), fields(trip_id = %id))]
    pub async fn patch(&self, id: TripId, patch: TripPatch) -> Result<Trip, ServiceError> {
        if patch.opening.is_none() && patch.closing.is_none() {
            return Err(LedgerError::validation("patch must set opening or closing").into());
        }
        let mut tx = self.pool.begin().await?;

        let current = found(trips::get(&mut *tx, id).await?, "trip", id)?;
        lock_unit(&mut tx, current.truck_id).await?;
        let mut trip = trips::lock(&mut tx, id).await.map_err(not_found("trip", id))?;

        if let Some(opening) = patch.opening {
            if let Some(driver_id) = opening.driver_id
                && !drivers::is_active(&mut *tx, driver_id).await?
            {
                return Err(LedgerError::not_found("driver", driver_id).into());
            }
            trip.record_opening(opening.reading(), opening.driver_id, patch.edit_opening)?;
        }
        if let Some(closing) = patch.closing {
            trip.record_closing(closing, patch.edit_closing)?;
        }
        let trip = trips::update_readings(&mut tx, &trip).await?;

        tx.commit().await?;

        info!(
            trip_no = trip.trip_no,
            state = ?trip.state(),
            opening = ?trip.opening_liters,
            closing = ?trip.closing_liters,
            "Trip readings recorded"
        );
        Ok(trip)
    }

    /// Delete the latest trip of a day together with its records.
    ///
    /// Every record attached to the trip, on either side, is voided and its
    /// effect reversed before the trip row is removed.
    ///
    /// # Errors
    ///
    /// - `Conflict` if a later trip exists for the day, or a destination
    ///   already used the credit of one of the trip's transfers
    /// - `NotFound` if the trip does not exist
    #[instrument(skip(self), fields(trip_id = %id))]
    pub async fn delete(&self, id: TripId) -> Result<DeletedTrip, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let current = found(trips::get(&mut *tx, id).await?, "trip", id)?;
        let mut ids = vec![current.truck_id];
        for record in transfers::list_for_trip(&mut tx, id).await? {
            ids.extend(unit_ids(&record));
        }
        let locked = LockedUnits::lock(&mut tx, &ids).await?;
        let trip = trips::lock(&mut tx, id).await.map_err(not_found("trip", id))?;

        let day = trips::list_for_day(&mut *tx, trip.truck_id, trip.trip_date).await?;
        ensure_deletable(&trip, &day)?;

        let mut records = transfers::list_for_trip(&mut tx, id).await?;
        if records
            .iter()
            .flat_map(unit_ids)
            .any(|unit| !locked.contains(unit))
        {
            return Err(LedgerError::conflict(format!(
                "trip {} changed while it was being deleted; retry",
                trip.trip_no
            ))
            .into());
        }

        records.sort_by_key(|r| std::cmp::Reverse(r.id));
        let reason = format!("trip {} of {} deleted", trip.trip_no, trip.trip_date);
        let mut voided_transfer_ids = Vec::with_capacity(records.len());
        for record in &records {
            let voided = void_locked(&mut tx, &locked, record, Some(&reason)).await?;
            voided_transfer_ids.push(voided.id);
        }
        trips::delete(&mut tx, id).await.map_err(not_found("trip", id))?;

        tx.commit().await?;

        info!(
            trip_no = trip.trip_no,
            voided = voided_transfer_ids.len(),
            "Trip deleted"
        );
        Ok(DeletedTrip {
            trip,
            voided_transfer_ids,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_deserializes_without_edit_flags() {
        let patch: TripPatch = serde_json::from_str(
            r#"{"opening": {"liters": "100", "at": "2024-03-05T06:00:00"}}"#,
        )
        .unwrap();
        let opening = patch.opening.unwrap();
        assert_eq!(opening.liters, Liters::from(100));
        assert!(opening.driver_id.is_none());
        assert!(!patch.edit_opening);
        assert!(!patch.edit_closing);
        assert!(patch.closing.is_none());
    }

    #[test]
    fn test_patch_accepts_numeric_liters() {
        let patch: TripPatch = serde_json::from_str(
            r#"{"closing": {"liters": 1600.5, "at": "2024-03-05T18:00:00"}, "edit_closing": true}"#,
        )
        .unwrap();
        assert_eq!(patch.closing.unwrap().liters, Liters::new(16005, 1));
        assert!(patch.edit_closing);
    }
}
