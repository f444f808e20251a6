//! Day-level readings: dispenser, odometer, day log and meter snapshots.
//!
//! The dispenser day is a view over the truck's trips: opening the day
//! creates trip 1, closing it closes the latest trip. Odometer readings and
//! log notes are stored per truck+date and carry no ledger invariants.

use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{info, instrument};

use fuelops_core::readings::{
    DayLogEntry, DayLogNote, DispenserDay, NewDayLogNote, OdometerDay, OdometerPatch, day_log,
};
use fuelops_core::stock::{MeterSnapshot, NewMeterSnapshot};
use fuelops_core::trip::{MeterReading, next_trip_no, resolve_trip};
use fuelops_core::{DriverId, LedgerError, Liters, UnitId};

use super::registry::lock_unit;
use super::{ServiceError, ensure_truck, found, local_now, read_snapshot};
use crate::db::{drivers, lots, readings, snapshots, transfers, trips, units};

/// Day opening through the dispenser view.
#[derive(Debug, Clone, Deserialize)]
pub struct DispenserOpening {
    pub truck_id: UnitId,
    /// Defaults to the date of `at`.
    pub date: Option<NaiveDate>,
    pub liters: Liters,
    pub at: chrono::NaiveDateTime,
    pub driver_id: Option<DriverId>,
}

/// Day closing through the dispenser view.
#[derive(Debug, Clone, Deserialize)]
pub struct DispenserClosing {
    pub truck_id: UnitId,
    /// Defaults to the date of `at`.
    pub date: Option<NaiveDate>,
    pub liters: Liters,
    pub at: chrono::NaiveDateTime,
    /// Required to replace an existing closing reading.
    #[serde(default)]
    pub edit: bool,
}

/// Odometer readings for a truck+date.
#[derive(Debug, Clone, Deserialize)]
pub struct OdometerInput {
    pub truck_id: UnitId,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub patch: OdometerPatch,
}

/// Service for day-level readings.
pub struct ReadingsService<'a> {
    pool: &'a PgPool,
}

impl<'a> ReadingsService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the unit does not exist.
    pub async fn dispenser(&self, truck_id: UnitId, date: NaiveDate) -> Result<DispenserDay, ServiceError> {
        let mut tx = read_snapshot(self.pool).await?;
        found(units::get(&mut *tx, truck_id).await?, "unit", truck_id)?;
        let day = trips::list_for_day(&mut *tx, truck_id, date).await?;
        tx.commit().await?;
        Ok(DispenserDay::from_trips(truck_id, date, &day))
    }

    /// Open the day: create trip 1 and record its opening.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the day already has trips
    /// - `Validation` if the unit is not an active truck, or for a negative reading
    /// - `NotFound` if the unit or driver does not exist
    #[instrument(skip(self, input), fields(truck_id = %input.truck_id))]
    pub async fn open_dispenser(&self, input: DispenserOpening) -> Result<DispenserDay, ServiceError> {
        let date = input.date.unwrap_or_else(|| input.at.date());
        let mut tx = self.pool.begin().await?;

        let truck = lock_unit(&mut tx, input.truck_id).await?;
        ensure_truck(&truck)?;
        truck.ensure_active()?;
        if let Some(driver_id) = input.driver_id
            && !drivers::is_active(&mut *tx, driver_id).await?
        {
            return Err(LedgerError::not_found("driver", driver_id).into());
        }

        let day = trips::list_for_day(&mut *tx, truck.id, date).await?;
        if !day.is_empty() {
            return Err(LedgerError::conflict(format!(
                "{} already has {} trip(s) on {date}; record readings on the trip",
                truck.unit_code,
                day.len()
            ))
            .into());
        }
        let trip_no = next_trip_no(&day)?;
        let mut trip = trips::insert(&mut tx, truck.id, date, trip_no).await?;
        trip.record_opening(
            MeterReading {
                liters: input.liters,
                at: input.at,
            },
            input.driver_id,
            false,
        )?;
        let trip = trips::update_readings(&mut tx, &trip).await?;

        tx.commit().await?;

        info!(trip_id = %trip.id, opening = %input.liters, "Dispenser day opened");
        Ok(DispenserDay::from_trips(truck.id, date, &[trip]))
    }

    /// Close the day on its latest trip.
    ///
    /// # Errors
    ///
    /// - `TripRequired` if the day has no trips
    /// - `Conflict` if the latest trip has no opening, or is closed and
    ///   `edit` is false
    /// - `Validation` if the closing is below the opening
    #[instrument(skip(self, input), fields(truck_id = %input.truck_id))]
    pub async fn close_dispenser(&self, input: DispenserClosing) -> Result<DispenserDay, ServiceError> {
        let date = input.date.unwrap_or_else(|| input.at.date());
        let mut tx = self.pool.begin().await?;

        let truck = lock_unit(&mut tx, input.truck_id).await?;
        ensure_truck(&truck)?;
        let day = trips::list_for_day(&mut *tx, truck.id, date).await?;
        let latest = resolve_trip(&day, None, &truck.unit_code, date)?.id;

        let mut trip = trips::lock(&mut tx, latest).await?;
        trip.record_closing(
            MeterReading {
                liters: input.liters,
                at: input.at,
            },
            input.edit,
        )?;
        trips::update_readings(&mut tx, &trip).await?;
        let day = trips::list_for_day(&mut *tx, truck.id, date).await?;

        tx.commit().await?;

        info!(trip_no = trip.trip_no, closing = %input.liters, "Dispenser day closed");
        Ok(DispenserDay::from_trips(truck.id, date, &day))
    }

    /// # Errors
    ///
    /// Returns `NotFound` if no readings exist for the truck+date.
    pub async fn odometer(&self, truck_id: UnitId, date: NaiveDate) -> Result<OdometerDay, ServiceError> {
        let day = readings::get_odometer(self.pool, truck_id, date).await?;
        found(day, "odometer reading", format!("{truck_id}/{date}"))
    }

    /// Record the first odometer readings of a truck+date.
    ///
    /// # Errors
    ///
    /// - `Conflict` if readings already exist for the truck+date
    /// - `Validation` for negative readings or a closing below the opening
    #[instrument(skip(self, input), fields(truck_id = %input.truck_id, date = %input.date))]
    pub async fn record_odometer(&self, input: OdometerInput) -> Result<OdometerDay, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let truck = lock_unit(&mut tx, input.truck_id).await?;
        ensure_truck(&truck)?;
        if readings::lock_odometer(&mut tx, truck.id, input.date).await?.is_some() {
            return Err(LedgerError::conflict(format!(
                "odometer readings for {} on {} already exist; patch them instead",
                truck.unit_code, input.date
            ))
            .into());
        }
        let (opening, closing) = input.patch.merge(None)?;
        let day = readings::upsert_odometer(&mut tx, truck.id, input.date, opening, closing).await?;

        tx.commit().await?;
        info!(opening_km = ?day.opening_km, closing_km = ?day.closing_km, "Odometer recorded");
        Ok(day)
    }

    /// Patch existing odometer readings.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no readings exist for the truck+date
    /// - `Validation` for negative readings or a closing below the opening
    #[instrument(skip(self, input), fields(truck_id = %input.truck_id, date = %input.date))]
    pub async fn patch_odometer(&self, input: OdometerInput) -> Result<OdometerDay, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let truck = lock_unit(&mut tx, input.truck_id).await?;
        let current = found(
            readings::lock_odometer(&mut tx, truck.id, input.date).await?,
            "odometer reading",
            format!("{}/{}", truck.id, input.date),
        )?;
        let (opening, closing) = input
            .patch
            .merge(Some((current.opening_km, current.closing_km)))?;
        let day = readings::upsert_odometer(&mut tx, truck.id, input.date, opening, closing).await?;

        tx.commit().await?;
        info!(opening_km = ?day.opening_km, closing_km = ?day.closing_km, "Odometer patched");
        Ok(day)
    }

    /// Chronological log of a unit's day.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the unit does not exist.
    pub async fn day_log(&self, unit_id: UnitId, date: NaiveDate) -> Result<Vec<DayLogEntry>, ServiceError> {
        let mut tx = read_snapshot(self.pool).await?;

        found(units::get(&mut *tx, unit_id).await?, "unit", unit_id)?;
        let day_trips = trips::list_for_day(&mut *tx, unit_id, date).await?;
        let day_lots = lots::list_for_day(&mut tx, unit_id, date).await?;
        let records = transfers::list_for_unit(&mut tx, unit_id, date, date).await?;
        let notes = readings::list_notes(&mut tx, unit_id, date).await?;
        tx.commit().await?;

        Ok(day_log(unit_id, date, &day_trips, &day_lots, &records, &notes))
    }

    /// Append an operator note to a unit's day log.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank or overlong note
    /// - `NotFound` if the unit does not exist
    #[instrument(skip(self, input), fields(unit_id = %input.unit_id))]
    pub async fn add_note(&self, input: NewDayLogNote) -> Result<DayLogNote, ServiceError> {
        let input = input.validate()?;
        found(units::get(self.pool, input.unit_id).await?, "unit", input.unit_id)?;
        let note = readings::insert_note(self.pool, &input).await?;
        info!(note_id = %note.id, "Day log note added");
        Ok(note)
    }

    /// Store an operator-reported meter reading.
    ///
    /// # Errors
    ///
    /// - `Validation` for a negative reading, or a unit that is not a truck
    /// - `NotFound` if the unit does not exist
    #[instrument(skip(self, input), fields(truck_id = %input.truck_id))]
    pub async fn record_snapshot(&self, input: NewMeterSnapshot) -> Result<MeterSnapshot, ServiceError> {
        let (truck_id, reading, at) = input.validate(local_now())?;
        let mut tx = self.pool.begin().await?;

        let truck = found(units::get(&mut *tx, truck_id).await?, "unit", truck_id)?;
        ensure_truck(&truck)?;
        let snapshot = snapshots::insert(&mut tx, truck_id, reading, at).await?;

        tx.commit().await?;
        info!(snapshot_id = %snapshot.id, reading = %reading, "Meter snapshot recorded");
        Ok(snapshot)
    }
}
