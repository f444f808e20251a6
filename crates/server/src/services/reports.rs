//! Read-side projections: reconciliation, stock summary and operations views.
//!
//! Nothing here writes. Each call reads inside one `REPEATABLE READ`
//! snapshot, so the figures of a report always agree with each other even
//! while writers commit.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use tracing::{debug, instrument};

use fuelops_core::lot::Lot;
use fuelops_core::ops::OperationsView;
use fuelops_core::reconcile::{
    ReconciliationResult, reconcile_day, reconcile_range, reconcile_trip, validate_range,
    validate_tolerance,
};
use fuelops_core::stock::{StockSummary, summarize};
use fuelops_core::transfer::TransferRecord;
use fuelops_core::{Liters, TripId, UnitId};

use super::{ServiceError, found, local_now, read_snapshot};
use crate::db::lots::{self, LotFilter};
use crate::db::{snapshots, transfers, trips, units};

/// Service for reports.
pub struct ReportService<'a> {
    pool: &'a PgPool,
    default_tolerance: Liters,
}

impl<'a> ReportService<'a> {
    /// `default_tolerance` applies when a request names none.
    #[must_use]
    pub const fn new(pool: &'a PgPool, default_tolerance: Liters) -> Self {
        Self {
            pool,
            default_tolerance,
        }
    }

    fn tolerance(&self, requested: Option<Liters>) -> Result<Liters, ServiceError> {
        Ok(validate_tolerance(requested.unwrap_or(self.default_tolerance))?)
    }

    /// Reconcile a truck's day.
    ///
    /// # Errors
    ///
    /// - `Validation` for a negative tolerance
    /// - `NotFound` if the unit does not exist
    #[instrument(skip(self), fields(truck_id = %truck_id, date = %date))]
    pub async fn reconcile_daily(
        &self,
        truck_id: UnitId,
        date: NaiveDate,
        tolerance: Option<Liters>,
    ) -> Result<ReconciliationResult, ServiceError> {
        let tolerance = self.tolerance(tolerance)?;
        let mut tx = read_snapshot(self.pool).await?;

        found(units::get(&mut *tx, truck_id).await?, "unit", truck_id)?;
        let day = trips::list_for_day(&mut *tx, truck_id, date).await?;
        let records = transfers::list_for_unit(&mut tx, truck_id, date, date).await?;
        tx.commit().await?;

        let result = reconcile_day(truck_id, date, &day, &records, tolerance)?;
        debug!(status = ?result.status, difference = ?result.delta_difference, "Day reconciled");
        Ok(result)
    }

    /// Reconcile every day of `from..=to`.
    ///
    /// # Errors
    ///
    /// - `Validation` for an inverted or overlong range, or a negative tolerance
    /// - `NotFound` if the unit does not exist
    #[instrument(skip(self), fields(truck_id = %truck_id, from = %from, to = %to))]
    pub async fn reconcile_range(
        &self,
        truck_id: UnitId,
        from: NaiveDate,
        to: NaiveDate,
        tolerance: Option<Liters>,
    ) -> Result<Vec<ReconciliationResult>, ServiceError> {
        let tolerance = self.tolerance(tolerance)?;
        validate_range(from, to)?;
        let mut tx = read_snapshot(self.pool).await?;

        found(units::get(&mut *tx, truck_id).await?, "unit", truck_id)?;
        let range_trips = trips::list_for_range(&mut tx, truck_id, from, to).await?;
        let records = transfers::list_for_unit(&mut tx, truck_id, from, to).await?;
        tx.commit().await?;

        let results = reconcile_range(truck_id, from, to, &range_trips, &records, tolerance)?;
        debug!(
            days = results.len(),
            flagged = results.iter().filter(|r| r.off_hours_flagged).count(),
            "Range reconciled"
        );
        Ok(results)
    }

    /// Reconcile one trip against the records attached to it.
    ///
    /// # Errors
    ///
    /// - `Validation` for a negative tolerance
    /// - `NotFound` if the trip does not exist
    #[instrument(skip(self), fields(trip_id = %trip_id))]
    pub async fn reconcile_trip(
        &self,
        trip_id: TripId,
        tolerance: Option<Liters>,
    ) -> Result<ReconciliationResult, ServiceError> {
        let tolerance = self.tolerance(tolerance)?;
        let mut tx = read_snapshot(self.pool).await?;

        let trip = found(trips::get(&mut *tx, trip_id).await?, "trip", trip_id)?;
        let records = transfers::list_for_trip(&mut tx, trip_id).await?;
        tx.commit().await?;

        Ok(reconcile_trip(&trip, &records, tolerance)?)
    }

    /// Live figures for every active unit.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if a query fails.
    #[instrument(skip(self))]
    pub async fn stock_summary(&self) -> Result<Vec<StockSummary>, ServiceError> {
        let today = local_now().date();
        let start_of_day = today.and_time(NaiveTime::MIN);
        let mut tx = read_snapshot(self.pool).await?;

        let active = units::list_active(&mut tx).await?;
        let open = lots::list_open(&mut tx).await?;
        let latest = snapshots::list_latest(&mut tx).await?;

        let windows: Vec<_> = active
            .iter()
            .map(|unit| {
                let snapshot = latest.iter().find(|s| s.truck_id == unit.id);
                let since = snapshot.map_or(start_of_day, |s| s.reading_at.min(start_of_day));
                (unit.id, since)
            })
            .collect();
        let mut records: HashMap<UnitId, Vec<TransferRecord>> = HashMap::new();
        for (unit_id, record) in transfers::list_for_units_since(&mut tx, &windows).await? {
            records.entry(unit_id).or_default().push(record);
        }

        let summaries: Vec<_> = active
            .iter()
            .map(|unit| {
                let snapshot = latest.iter().find(|s| s.truck_id == unit.id);
                let unit_records = records.get(&unit.id).map_or(&[][..], Vec::as_slice);
                summarize(unit, &open, snapshot, unit_records, today)
            })
            .collect();
        tx.commit().await?;

        debug!(units = summaries.len(), "Stock summary computed");
        Ok(summaries)
    }

    /// Operations view of a unit's day.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the unit does not exist.
    #[instrument(skip(self), fields(unit_id = %unit_id, date = %date))]
    pub async fn ops_day(&self, unit_id: UnitId, date: NaiveDate) -> Result<OperationsView, ServiceError> {
        let mut tx = read_snapshot(self.pool).await?;

        found(units::get(&mut *tx, unit_id).await?, "unit", unit_id)?;
        let remaining = lots::available(&mut tx, unit_id).await?;
        let day_lots = lots::list_for_day(&mut tx, unit_id, date).await?;
        let records = transfers::list_for_unit(&mut tx, unit_id, date, date).await?;
        tx.commit().await?;

        Ok(OperationsView::for_day(
            unit_id, date, remaining, &day_lots, &records,
        ))
    }

    /// Operations view of one trip.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the trip does not exist.
    #[instrument(skip(self), fields(trip_id = %trip_id))]
    pub async fn ops_trip(&self, trip_id: TripId) -> Result<OperationsView, ServiceError> {
        let mut tx = read_snapshot(self.pool).await?;

        let trip = found(trips::get(&mut *tx, trip_id).await?, "trip", trip_id)?;
        let remaining = lots::available(&mut tx, trip.truck_id).await?;
        let window_end = trip.closing_at.map_or(trip.trip_date, |at| at.date());
        let filter = LotFilter {
            unit_id: Some(trip.truck_id),
            from: Some(trip.trip_date),
            to: Some(window_end.max(trip.trip_date)),
            load_type: None,
        };
        let window_lots: Vec<Lot> = lots::list(&mut *tx, &filter)
            .await?
            .into_iter()
            .map(|listing| listing.lot)
            .collect();
        let records = transfers::list_for_trip(&mut tx, trip_id).await?;
        tx.commit().await?;

        Ok(OperationsView::for_trip(
            &trip,
            remaining,
            &window_lots,
            &records,
        ))
    }
}
