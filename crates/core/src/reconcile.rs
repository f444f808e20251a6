//! Meter-vs-ledger reconciliation.
//!
//! The meter side comes from trip readings; the ledger side from the
//! non-voided transfer records in the same window. Missing readings make
//! the result `UNKNOWN` instead of failing.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::LedgerError;
use crate::transfer::{ActivityTotals, TransferRecord};
use crate::trip::Trip;
use crate::types::{Liters, ReconciliationStatus, UnitId};

/// Longest range a single range reconciliation may cover.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Outcome of reconciling one day or one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub truck_id: UnitId,
    pub date: NaiveDate,
    /// Set when the result covers a single trip.
    pub trip_no: Option<i32>,
    pub trip_count: usize,
    /// First opening reading of the window.
    pub opening_liters: Option<Liters>,
    /// Last closing reading of the window.
    pub closing_liters: Option<Liters>,
    pub delta_meter: Option<Liters>,
    pub sales_liters: Liters,
    pub transfers_out_liters: Liters,
    pub transfers_in_liters: Liters,
    pub testing_liters: Liters,
    pub delta_expected: Liters,
    /// `delta_meter - delta_expected`, signed.
    pub delta_difference: Option<Liters>,
    pub tolerance_liters: Liters,
    pub status: ReconciliationStatus,
    /// Meter movement between trips, where no trip was recording.
    pub off_hours_meter_delta: Option<Liters>,
    pub off_hours_flagged: bool,
}

/// Check a reconciliation tolerance.
///
/// # Errors
///
/// Returns `LedgerError::Validation` for a negative tolerance.
pub fn validate_tolerance(tolerance: Liters) -> Result<Liters, LedgerError> {
    if tolerance < Decimal::ZERO {
        Err(LedgerError::validation("tolerance cannot be negative"))
    } else {
        Ok(tolerance)
    }
}

/// Check a reconciliation date range.
///
/// # Errors
///
/// Returns `LedgerError::Validation` if `from` is after `to` or the range is
/// longer than [`MAX_RANGE_DAYS`].
pub fn validate_range(from: NaiveDate, to: NaiveDate) -> Result<(), LedgerError> {
    if from > to {
        return Err(LedgerError::validation("from must not be after to"));
    }
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(LedgerError::validation(format!(
            "range may cover at most {MAX_RANGE_DAYS} days"
        )));
    }
    Ok(())
}

/// Reconcile a truck's day.
///
/// `trips` and `records` may hold rows for other trucks or dates; only the
/// truck's rows for `date` are used.
///
/// # Errors
///
/// Returns `LedgerError::Validation` for a negative tolerance.
pub fn reconcile_day(
    truck_id: UnitId,
    date: NaiveDate,
    trips: &[Trip],
    records: &[TransferRecord],
    tolerance: Liters,
) -> Result<ReconciliationResult, LedgerError> {
    let tolerance = validate_tolerance(tolerance)?;
    let day_trips = trips_of_day(trips, truck_id, date);
    let totals = ActivityTotals::for_unit(
        truck_id,
        records.iter().filter(|r| r.transfer_date == date),
    );
    let mut result = build(truck_id, date, None, &day_trips, &totals, tolerance);
    apply_off_hours(&mut result, &day_trips, None);
    Ok(result)
}

/// Reconcile a single trip against the records attached to it.
///
/// # Errors
///
/// Returns `LedgerError::Validation` for a negative tolerance.
pub fn reconcile_trip(
    trip: &Trip,
    records: &[TransferRecord],
    tolerance: Liters,
) -> Result<ReconciliationResult, LedgerError> {
    let tolerance = validate_tolerance(tolerance)?;
    let totals = ActivityTotals::for_unit(
        trip.truck_id,
        records
            .iter()
            .filter(|r| r.is_attached_to(trip.truck_id, trip.id)),
    );
    Ok(build(
        trip.truck_id,
        trip.trip_date,
        Some(trip.trip_no),
        &[trip],
        &totals,
        tolerance,
    ))
}

/// Reconcile every day of `from..=to`.
///
/// Besides each day's own gaps, the off-hours delta of a day includes the
/// movement between the last closing recorded before that day and the
/// day's first opening. `trips` may include trips from before `from` to
/// provide that closing for the first day.
///
/// # Errors
///
/// Returns `LedgerError::Validation` if `from` is after `to`, the range is
/// longer than [`MAX_RANGE_DAYS`], or the tolerance is negative.
pub fn reconcile_range(
    truck_id: UnitId,
    from: NaiveDate,
    to: NaiveDate,
    trips: &[Trip],
    records: &[TransferRecord],
    tolerance: Liters,
) -> Result<Vec<ReconciliationResult>, LedgerError> {
    let tolerance = validate_tolerance(tolerance)?;
    validate_range(from, to)?;

    let mut previous = trips
        .iter()
        .filter(|t| t.truck_id == truck_id && t.trip_date < from)
        .max_by_key(|t| (t.trip_date, t.trip_no));

    let mut results = Vec::new();
    for date in from.iter_days().take_while(|d| *d <= to) {
        let day_trips = trips_of_day(trips, truck_id, date);
        let totals = ActivityTotals::for_unit(
            truck_id,
            records.iter().filter(|r| r.transfer_date == date),
        );
        let mut result = build(truck_id, date, None, &day_trips, &totals, tolerance);
        apply_off_hours(&mut result, &day_trips, previous);
        if let Some(last) = day_trips.last() {
            previous = Some(*last);
        }
        results.push(result);
    }
    Ok(results)
}

fn trips_of_day(trips: &[Trip], truck_id: UnitId, date: NaiveDate) -> Vec<&Trip> {
    let mut day: Vec<&Trip> = trips
        .iter()
        .filter(|t| t.truck_id == truck_id && t.trip_date == date)
        .collect();
    day.sort_by_key(|t| t.trip_no);
    day
}

fn build(
    truck_id: UnitId,
    date: NaiveDate,
    trip_no: Option<i32>,
    trips: &[&Trip],
    totals: &ActivityTotals,
    tolerance: Liters,
) -> ReconciliationResult {
    let delta_expected = totals.sales_liters + totals.transfers_out_liters + totals.testing_liters
        - totals.transfers_in_liters;

    let delta_meter = if trips.is_empty() {
        None
    } else {
        trips
            .iter()
            .map(|t| t.meter_delta())
            .sum::<Option<Liters>>()
    };
    let delta_difference = delta_meter.map(|meter| meter - delta_expected);
    let status = match delta_difference {
        None => ReconciliationStatus::Unknown,
        Some(diff) if diff.abs() <= tolerance => ReconciliationStatus::Balanced,
        Some(_) => ReconciliationStatus::Imbalanced,
    };

    ReconciliationResult {
        truck_id,
        date,
        trip_no,
        trip_count: trips.len(),
        opening_liters: trips.first().and_then(|t| t.opening_liters),
        closing_liters: trips.last().and_then(|t| t.closing_liters),
        delta_meter,
        sales_liters: totals.sales_liters,
        transfers_out_liters: totals.transfers_out_liters,
        transfers_in_liters: totals.transfers_in_liters,
        testing_liters: totals.testing_liters,
        delta_expected,
        delta_difference,
        tolerance_liters: tolerance,
        status,
        off_hours_meter_delta: None,
        off_hours_flagged: false,
    }
}

/// Sum the gaps between consecutive readings: each trip's opening minus the
/// closing before it. Pairs with a missing reading are skipped.
fn apply_off_hours(result: &mut ReconciliationResult, day_trips: &[&Trip], previous: Option<&Trip>) {
    if day_trips.is_empty() {
        return;
    }
    let readings: Vec<&Trip> = previous.into_iter().chain(day_trips.iter().copied()).collect();
    let gaps: Vec<Liters> = readings
        .windows(2)
        .filter_map(|pair| match pair {
            [before, after] => Some(after.opening_liters? - before.closing_liters?),
            _ => None,
        })
        .collect();
    let total: Liters = gaps.iter().sum();
    result.off_hours_flagged = total.abs() > result.tolerance_liters;
    result.off_hours_meter_delta = Some(total);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lot::tests::date;
    use crate::transfer::tests::record;
    use crate::trip::tests::{closed_trip, trip};
    use crate::types::{Activity, TripId};

    #[test]
    fn test_balanced_day() {
        let d = date(2024, 3, 5);
        let trips = vec![closed_trip(1, d, 100, 1600)];
        let records = vec![record(1, Activity::Sale, 1, None, 1500)];
        let r = reconcile_day(UnitId::new(1), d, &trips, &records, Decimal::ZERO).unwrap();
        assert_eq!(r.delta_meter, Some(Decimal::from(1500)));
        assert_eq!(r.delta_expected, Decimal::from(1500));
        assert_eq!(r.delta_difference, Some(Decimal::ZERO));
        assert_eq!(r.status, ReconciliationStatus::Balanced);
        assert_eq!(r.off_hours_meter_delta, Some(Decimal::ZERO));
    }

    #[test]
    fn test_imbalance_reports_signed_difference() {
        let d = date(2024, 3, 5);
        let trips = vec![closed_trip(1, d, 100, 1600)];
        let records = vec![
            record(1, Activity::Sale, 1, None, 1400),
            record(2, Activity::TankerToTanker, 2, Some(1), 200),
            record(3, Activity::Testing, 1, None, 20),
        ];
        let r = reconcile_day(UnitId::new(1), d, &trips, &records, Decimal::from(50)).unwrap();
        assert_eq!(r.delta_expected, Decimal::from(1220));
        assert_eq!(r.delta_difference, Some(Decimal::from(280)));
        assert_eq!(r.status, ReconciliationStatus::Imbalanced);
        assert_eq!(
            r.delta_difference.unwrap(),
            r.delta_meter.unwrap() - r.delta_expected
        );
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let d = date(2024, 3, 5);
        let trips = vec![closed_trip(1, d, 0, 1010)];
        let records = vec![record(1, Activity::Sale, 1, None, 1000)];
        let r = reconcile_day(UnitId::new(1), d, &trips, &records, Decimal::from(10)).unwrap();
        assert_eq!(r.status, ReconciliationStatus::Balanced);
    }

    #[test]
    fn test_missing_readings_are_unknown() {
        let d = date(2024, 3, 5);
        let r = reconcile_day(UnitId::new(1), d, &[], &[], Decimal::ZERO).unwrap();
        assert_eq!(r.status, ReconciliationStatus::Unknown);
        assert_eq!(r.delta_meter, None);
        assert_eq!(r.off_hours_meter_delta, None);

        let trips = vec![closed_trip(1, d, 0, 500), trip(2, d)];
        let r = reconcile_day(UnitId::new(1), d, &trips, &[], Decimal::ZERO).unwrap();
        assert_eq!(r.status, ReconciliationStatus::Unknown);
        assert_eq!(r.opening_liters, Some(Decimal::ZERO));
        assert_eq!(r.closing_liters, None);
    }

    #[test]
    fn test_negative_tolerance_is_rejected() {
        let d = date(2024, 3, 5);
        assert!(reconcile_day(UnitId::new(1), d, &[], &[], Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_multi_trip_day_sums_trip_deltas_and_gaps() {
        let d = date(2024, 3, 5);
        let trips = vec![closed_trip(1, d, 100, 600), closed_trip(2, d, 650, 900)];
        let records = vec![record(1, Activity::Sale, 1, None, 750)];
        let r = reconcile_day(UnitId::new(1), d, &trips, &records, Decimal::ZERO).unwrap();
        assert_eq!(r.delta_meter, Some(Decimal::from(750)));
        assert_eq!(r.status, ReconciliationStatus::Balanced);
        assert_eq!(r.off_hours_meter_delta, Some(Decimal::from(50)));
        assert!(r.off_hours_flagged);
    }

    #[test]
    fn test_trip_reconcile_uses_attached_records_only() {
        let d = date(2024, 3, 5);
        let t = closed_trip(1, d, 100, 600);
        let mut attached = record(1, Activity::Sale, 1, None, 500);
        attached.trip_id = Some(t.id);
        let mut other = record(2, Activity::Sale, 1, None, 300);
        other.trip_id = Some(TripId::new(99));
        let r = reconcile_trip(&t, &[attached, other], Decimal::ZERO).unwrap();
        assert_eq!(r.trip_no, Some(1));
        assert_eq!(r.sales_liters, Decimal::from(500));
        assert_eq!(r.status, ReconciliationStatus::Balanced);
    }

    #[test]
    fn test_range_flags_cross_day_movement() {
        let d1 = date(2024, 3, 5);
        let d2 = date(2024, 3, 6);
        let d3 = date(2024, 3, 7);
        let mut t2 = closed_trip(1, d2, 900, 1000);
        t2.id = TripId::new(2);
        let trips = vec![closed_trip(1, d1, 100, 600), t2];
        let results =
            reconcile_range(UnitId::new(1), d1, d3, &trips, &[], Decimal::from(5)).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].off_hours_meter_delta, Some(Decimal::from(300)));
        assert!(results[1].off_hours_flagged);
        assert_eq!(results[2].status, ReconciliationStatus::Unknown);
        assert_eq!(results[2].off_hours_meter_delta, None);
    }

    #[test]
    fn test_range_validation() {
        let d = date(2024, 3, 5);
        assert!(reconcile_range(UnitId::new(1), d, date(2024, 3, 4), &[], &[], Decimal::ZERO).is_err());
        assert!(reconcile_range(UnitId::new(1), d, date(2025, 3, 6), &[], &[], Decimal::ZERO).is_err());
    }
}
