//! Trip sessions: per-truck, per-date sequences bounded by meter readings.
//!
//! State machine: `CREATED → OPENED → CLOSED`. Trip numbers are 1-based and
//! contiguous per truck and date; only the latest trip may be deleted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::lot::validate_reading;
use crate::types::{DriverId, Liters, TripId, TripState, UnitId};

/// A bounded operational session for one truck on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub truck_id: UnitId,
    pub trip_no: i32,
    pub trip_date: NaiveDate,
    pub opening_liters: Option<Liters>,
    pub opening_at: Option<NaiveDateTime>,
    pub closing_liters: Option<Liters>,
    pub closing_at: Option<NaiveDateTime>,
    pub driver_id: Option<DriverId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A meter reading reported by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub liters: Liters,
    pub at: NaiveDateTime,
}

impl MeterReading {
    fn validate(self, field: &str) -> Result<Self, LedgerError> {
        validate_reading(self.liters, &format!("{field} reading"))?;
        Ok(self)
    }
}

impl Trip {
    /// Lifecycle state derived from the recorded readings.
    #[must_use]
    pub const fn state(&self) -> TripState {
        if self.closing_liters.is_some() {
            TripState::Closed
        } else if self.opening_liters.is_some() {
            TripState::Opened
        } else {
            TripState::Created
        }
    }

    /// Meter movement over the trip, once both readings exist.
    #[must_use]
    pub fn meter_delta(&self) -> Option<Liters> {
        Some(self.closing_liters? - self.opening_liters?)
    }

    /// Record the opening reading.
    ///
    /// The opening is set once; changing it later requires `edit = true`.
    ///
    /// # Errors
    ///
    /// - `LedgerError::Validation` for a negative or oversized reading
    /// - `LedgerError::Conflict` if the trip is closed, or already opened and
    ///   `edit` is false
    pub fn record_opening(
        &mut self,
        reading: MeterReading,
        driver_id: Option<DriverId>,
        edit: bool,
    ) -> Result<(), LedgerError> {
        let reading = reading.validate("opening")?;
        match self.state() {
            TripState::Closed => {
                return Err(LedgerError::conflict(format!(
                    "trip {} is already closed",
                    self.trip_no
                )));
            }
            TripState::Opened if !edit => {
                return Err(LedgerError::conflict(format!(
                    "trip {} already has an opening reading; submit it as an edit",
                    self.trip_no
                )));
            }
            TripState::Opened | TripState::Created => {}
        }
        self.opening_liters = Some(reading.liters);
        self.opening_at = Some(reading.at);
        if driver_id.is_some() {
            self.driver_id = driver_id;
        }
        Ok(())
    }

    /// Record the closing reading.
    ///
    /// # Errors
    ///
    /// - `LedgerError::Conflict` if the trip has no opening, or is already
    ///   closed and `edit` is false
    /// - `LedgerError::Validation` if the closing is below the opening or
    ///   earlier than the opening time
    pub fn record_closing(&mut self, reading: MeterReading, edit: bool) -> Result<(), LedgerError> {
        let reading = reading.validate("closing")?;
        let (Some(opening), Some(opening_at)) = (self.opening_liters, self.opening_at) else {
            return Err(LedgerError::conflict(format!(
                "trip {} has no opening reading",
                self.trip_no
            )));
        };
        if self.state() == TripState::Closed && !edit {
            return Err(LedgerError::conflict(format!(
                "trip {} already has a closing reading; submit it as an edit",
                self.trip_no
            )));
        }
        if reading.liters < opening {
            return Err(LedgerError::validation(format!(
                "closing reading {} is below opening reading {}",
                reading.liters.normalize(),
                opening.normalize()
            )));
        }
        if reading.at < opening_at {
            return Err(LedgerError::validation(
                "closing time is earlier than opening time",
            ));
        }
        self.closing_liters = Some(reading.liters);
        self.closing_at = Some(reading.at);
        Ok(())
    }
}

/// Number for the next trip of a truck+date, given the existing trips.
///
/// # Errors
///
/// - `LedgerError::Conflict` if an earlier trip is still open (not closed)
/// - `LedgerError::Conflict` if existing numbers are not exactly `1..=N`
pub fn next_trip_no(existing: &[Trip]) -> Result<i32, LedgerError> {
    let mut numbers: Vec<i32> = existing.iter().map(|t| t.trip_no).collect();
    numbers.sort_unstable();
    for (expected, actual) in (1..).zip(&numbers) {
        if expected != *actual {
            return Err(LedgerError::conflict(format!(
                "trip numbering is not contiguous: expected trip {expected}, found {actual}"
            )));
        }
    }
    if let Some(open) = existing.iter().find(|t| t.state() != TripState::Closed) {
        return Err(LedgerError::conflict(format!(
            "trip {} must be closed before a new trip is created",
            open.trip_no
        )));
    }
    let count = i32::try_from(numbers.len())
        .map_err(|_| LedgerError::conflict("too many trips for one day"))?;
    Ok(count + 1)
}

/// Check that `trip` is the latest of its day and may be deleted.
///
/// # Errors
///
/// Returns `LedgerError::Conflict` if a later trip exists.
pub fn ensure_deletable(trip: &Trip, day_trips: &[Trip]) -> Result<(), LedgerError> {
    let latest = day_trips.iter().map(|t| t.trip_no).max().unwrap_or(0);
    if trip.trip_no == latest {
        Ok(())
    } else {
        Err(LedgerError::conflict(format!(
            "only the latest trip ({latest}) can be deleted, not trip {}",
            trip.trip_no
        )))
    }
}

/// Resolve the trip an operation attaches to.
///
/// With `trip_no` the named trip is used; otherwise the latest trip of the day.
///
/// # Errors
///
/// - `LedgerError::TripRequired` if the day has no trips
/// - `LedgerError::NotFound` if the named trip does not exist
pub fn resolve_trip<'a>(
    day_trips: &'a [Trip],
    trip_no: Option<i32>,
    unit_code: &str,
    date: NaiveDate,
) -> Result<&'a Trip, LedgerError> {
    if day_trips.is_empty() {
        return Err(LedgerError::TripRequired {
            unit_code: unit_code.to_string(),
            date,
        });
    }
    match trip_no {
        Some(no) => day_trips
            .iter()
            .find(|t| t.trip_no == no)
            .ok_or_else(|| LedgerError::not_found("trip", format!("{unit_code}/{date}/#{no}"))),
        None => day_trips
            .iter()
            .max_by_key(|t| t.trip_no)
            .ok_or_else(|| LedgerError::TripRequired {
                unit_code: unit_code.to_string(),
                date,
            }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use chrono::NaiveTime;
    use rust_decimal::Decimal;

    use super::*;

    pub(crate) fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    pub(crate) fn trip(no: i32, date: NaiveDate) -> Trip {
        Trip {
            id: TripId::new(no),
            truck_id: UnitId::new(1),
            trip_no: no,
            trip_date: date,
            opening_liters: None,
            opening_at: None,
            closing_liters: None,
            closing_at: None,
            driver_id: None,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    pub(crate) fn closed_trip(no: i32, date: NaiveDate, opening: i64, closing: i64) -> Trip {
        let mut t = trip(no, date);
        t.opening_liters = Some(Decimal::from(opening));
        t.opening_at = Some(at(date, 6 + u32::try_from(no).unwrap() * 2, 0));
        t.closing_liters = Some(Decimal::from(closing));
        t.closing_at = Some(at(date, 7 + u32::try_from(no).unwrap() * 2, 0));
        t
    }

    fn d() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn reading(liters: i64, h: u32) -> MeterReading {
        MeterReading {
            liters: Decimal::from(liters),
            at: at(d(), h, 0),
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut t = trip(1, d());
        assert_eq!(t.state(), TripState::Created);

        t.record_opening(reading(100, 6), Some(DriverId::new(4)), false)
            .unwrap();
        assert_eq!(t.state(), TripState::Opened);
        assert_eq!(t.driver_id, Some(DriverId::new(4)));

        t.record_closing(reading(1600, 18), false).unwrap();
        assert_eq!(t.state(), TripState::Closed);
        assert_eq!(t.meter_delta(), Some(Decimal::from(1500)));
    }

    #[test]
    fn test_opening_is_not_silently_overwritten() {
        let mut t = trip(1, d());
        t.record_opening(reading(100, 6), None, false).unwrap();
        assert!(matches!(
            t.record_opening(reading(120, 6), None, false),
            Err(LedgerError::Conflict(_))
        ));
        t.record_opening(reading(120, 6), None, true).unwrap();
        assert_eq!(t.opening_liters, Some(Decimal::from(120)));
    }

    #[test]
    fn test_oversized_readings_are_rejected() {
        let mut t = trip(1, d());
        assert!(matches!(
            t.record_opening(reading(100_000_000_000, 6), None, false),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(t.state(), TripState::Created);

        t.record_opening(reading(100, 6), None, false).unwrap();
        assert!(matches!(
            t.record_closing(reading(100_000_000_000, 18), false),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(t.state(), TripState::Opened);
    }

    #[test]
    fn test_opening_rejected_after_close() {
        let mut t = closed_trip(1, d(), 100, 200);
        assert!(matches!(
            t.record_opening(reading(50, 6), None, true),
            Err(LedgerError::Conflict(_))
        ));
    }

    #[test]
    fn test_closing_below_opening_is_validation_error() {
        let mut t = trip(1, d());
        t.record_opening(reading(100, 6), None, false).unwrap();
        let err = t.record_closing(reading(99, 18), false).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(t.state(), TripState::Opened);
    }

    #[test]
    fn test_closing_requires_opening() {
        let mut t = trip(1, d());
        assert!(matches!(
            t.record_closing(reading(100, 18), false),
            Err(LedgerError::Conflict(_))
        ));
    }

    #[test]
    fn test_closing_before_opening_time_rejected() {
        let mut t = trip(1, d());
        t.record_opening(reading(100, 10), None, false).unwrap();
        assert!(matches!(
            t.record_closing(reading(200, 9), false),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_negative_reading_rejected() {
        let mut t = trip(1, d());
        assert!(matches!(
            t.record_opening(reading(-1, 6), None, false),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_next_trip_no() {
        assert_eq!(next_trip_no(&[]).unwrap(), 1);
        let trips = vec![closed_trip(1, d(), 0, 10), closed_trip(2, d(), 10, 20)];
        assert_eq!(next_trip_no(&trips).unwrap(), 3);
    }

    #[test]
    fn test_next_trip_requires_previous_closed() {
        let mut open = trip(1, d());
        open.record_opening(reading(100, 6), None, false).unwrap();
        assert!(matches!(
            next_trip_no(&[open]),
            Err(LedgerError::Conflict(_))
        ));
        assert!(next_trip_no(&[trip(1, d())]).is_err());
    }

    #[test]
    fn test_next_trip_detects_gap() {
        let trips = vec![closed_trip(1, d(), 0, 10), closed_trip(3, d(), 10, 20)];
        assert!(next_trip_no(&trips).is_err());
    }

    #[test]
    fn test_only_latest_trip_deletable() {
        let trips = vec![closed_trip(1, d(), 0, 10), closed_trip(2, d(), 10, 20)];
        assert!(ensure_deletable(&trips[1], &trips).is_ok());
        assert!(ensure_deletable(&trips[0], &trips).is_err());
    }

    #[test]
    fn test_resolve_trip() {
        let err = resolve_trip(&[], None, "T1", d()).unwrap_err();
        assert!(matches!(err, LedgerError::TripRequired { .. }));

        let trips = vec![closed_trip(1, d(), 0, 10), trip(2, d())];
        assert_eq!(resolve_trip(&trips, None, "T1", d()).unwrap().trip_no, 2);
        assert_eq!(resolve_trip(&trips, Some(1), "T1", d()).unwrap().trip_no, 1);
        assert!(matches!(
            resolve_trip(&trips, Some(7), "T1", d()),
            Err(LedgerError::NotFound { .. })
        ));
    }
}
