//! Day-level reading views for trucks: dispenser, odometer and the day log.
//!
//! The dispenser day is derived from the day's trips and stores nothing of
//! its own. Odometer readings carry no ledger invariants.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::lot::Lot;
use crate::transfer::TransferRecord;
use crate::trip::Trip;
use crate::types::{Activity, DayLogId, Liters, TripState, UnitId};

const MAX_NOTE_LEN: usize = 500;

/// Dispenser readings for a truck+date, as seen through its trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispenserDay {
    pub truck_id: UnitId,
    pub date: NaiveDate,
    pub trip_count: usize,
    pub opening_liters: Option<Liters>,
    pub opening_at: Option<NaiveDateTime>,
    pub closing_liters: Option<Liters>,
    pub closing_at: Option<NaiveDateTime>,
    /// State of the latest trip.
    pub state: Option<TripState>,
}

impl DispenserDay {
    /// First trip's opening and last trip's closing.
    #[must_use]
    pub fn from_trips(truck_id: UnitId, date: NaiveDate, trips: &[Trip]) -> Self {
        let mut day: Vec<&Trip> = trips
            .iter()
            .filter(|t| t.truck_id == truck_id && t.trip_date == date)
            .collect();
        day.sort_by_key(|t| t.trip_no);
        let first = day.first();
        let last = day.last();
        Self {
            truck_id,
            date,
            trip_count: day.len(),
            opening_liters: first.and_then(|t| t.opening_liters),
            opening_at: first.and_then(|t| t.opening_at),
            closing_liters: last.and_then(|t| t.closing_liters),
            closing_at: last.and_then(|t| t.closing_at),
            state: last.map(|t| t.state()),
        }
    }
}

/// Odometer readings for a truck+date, in kilometres.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OdometerDay {
    pub truck_id: UnitId,
    pub reading_date: NaiveDate,
    pub opening_km: Option<Decimal>,
    pub closing_km: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl OdometerDay {
    /// Distance covered, once both readings exist.
    #[must_use]
    pub fn distance_km(&self) -> Option<Decimal> {
        Some(self.closing_km? - self.opening_km?)
    }
}

/// Odometer readings are stored as `NUMERIC(10,1)`.
const MAX_KM: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Odometer values to set. Absent fields keep their stored value.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OdometerPatch {
    pub opening_km: Option<Decimal>,
    pub closing_km: Option<Decimal>,
}

impl OdometerPatch {
    /// Merge the patch over `current` and validate the result.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for an empty patch, a negative or
    /// oversized reading, more than one decimal place, or a closing below
    /// the opening.
    pub fn merge(
        self,
        current: Option<(Option<Decimal>, Option<Decimal>)>,
    ) -> Result<(Option<Decimal>, Option<Decimal>), LedgerError> {
        if self.opening_km.is_none() && self.closing_km.is_none() {
            return Err(LedgerError::validation(
                "odometer patch must set opening_km or closing_km",
            ));
        }
        let (opening, closing) = current.unwrap_or_default();
        let opening = self.opening_km.or(opening);
        let closing = self.closing_km.or(closing);
        for km in [opening, closing].into_iter().flatten() {
            if km < Decimal::ZERO {
                return Err(LedgerError::validation("odometer reading cannot be negative"));
            }
            if km.normalize().scale() > 1 {
                return Err(LedgerError::validation(
                    "odometer readings support at most one decimal place",
                ));
            }
            if km >= MAX_KM {
                return Err(LedgerError::validation(format!(
                    "odometer reading must be below {MAX_KM} km"
                )));
            }
        }
        match (opening, closing) {
            (None, Some(_)) => Err(LedgerError::validation(
                "odometer closing requires an opening reading",
            )),
            (Some(open), Some(close)) if close < open => Err(LedgerError::validation(format!(
                "odometer closing {close} km is below opening {open} km"
            ))),
            _ => Ok((opening, closing)),
        }
    }
}

/// An operator note in the day log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayLogNote {
    pub id: DayLogId,
    pub unit_id: UnitId,
    pub log_date: NaiveDate,
    pub logged_at: NaiveDateTime,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a note.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDayLogNote {
    pub unit_id: UnitId,
    pub logged_at: NaiveDateTime,
    pub note: String,
}

impl NewDayLogNote {
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for a blank or over-long note.
    pub fn validate(mut self) -> Result<Self, LedgerError> {
        let note = self.note.trim().to_string();
        if note.is_empty() {
            return Err(LedgerError::validation("note is required"));
        }
        if note.chars().count() > MAX_NOTE_LEN {
            return Err(LedgerError::validation(format!(
                "note must be at most {MAX_NOTE_LEN} characters"
            )));
        }
        self.note = note;
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayLogKind {
    TripOpened,
    TripClosed,
    Load,
    Sale,
    TransferOut,
    TransferIn,
    Testing,
    Note,
}

/// One line of the derived day log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayLogEntry {
    pub at: NaiveDateTime,
    pub kind: DayLogKind,
    pub trip_no: Option<i32>,
    pub volume_liters: Option<Liters>,
    pub detail: String,
}

/// Build the chronological log of a unit's day.
///
/// Voided records are left out. Entries at the same instant keep the order
/// trips, loads, records, notes.
#[must_use]
pub fn day_log(
    unit_id: UnitId,
    date: NaiveDate,
    trips: &[Trip],
    lots: &[Lot],
    records: &[TransferRecord],
    notes: &[DayLogNote],
) -> Vec<DayLogEntry> {
    let mut entries = Vec::new();

    for trip in trips
        .iter()
        .filter(|t| t.truck_id == unit_id && t.trip_date == date)
    {
        if let (Some(liters), Some(at)) = (trip.opening_liters, trip.opening_at) {
            entries.push(DayLogEntry {
                at,
                kind: DayLogKind::TripOpened,
                trip_no: Some(trip.trip_no),
                volume_liters: Some(liters),
                detail: format!("trip {} opened at meter {}", trip.trip_no, liters.normalize()),
            });
        }
        if let (Some(liters), Some(at)) = (trip.closing_liters, trip.closing_at) {
            entries.push(DayLogEntry {
                at,
                kind: DayLogKind::TripClosed,
                trip_no: Some(trip.trip_no),
                volume_liters: Some(liters),
                detail: format!("trip {} closed at meter {}", trip.trip_no, liters.normalize()),
            });
        }
    }

    for lot in lots
        .iter()
        .filter(|l| l.unit_id == unit_id && l.load_date == date)
    {
        entries.push(DayLogEntry {
            at: lot.load_date.and_time(lot.load_time),
            kind: DayLogKind::Load,
            trip_no: None,
            volume_liters: Some(lot.loaded_liters),
            detail: format!("{} loaded ({})", lot.lot_code_initial, lot.load_type),
        });
    }

    for record in records
        .iter()
        .filter(|r| !r.is_voided() && r.transfer_date == date)
    {
        let outbound = record.from_unit_id == unit_id;
        let kind = match (record.activity, outbound) {
            (Activity::Sale, true) => DayLogKind::Sale,
            (Activity::Testing, true) => DayLogKind::Testing,
            (_, true) => DayLogKind::TransferOut,
            (Activity::Sale, false) => continue,
            (_, false) if record.to_unit_id == Some(unit_id) => DayLogKind::TransferIn,
            (_, false) => continue,
        };
        let counterpart = match kind {
            DayLogKind::Sale => record.to_vehicle.clone().unwrap_or_default(),
            DayLogKind::TransferIn => format!("from unit {}", record.from_unit_id),
            _ => record
                .to_unit_id
                .filter(|to| *to != unit_id)
                .map(|to| format!("to unit {to}"))
                .unwrap_or_default(),
        };
        entries.push(DayLogEntry {
            at: record.performed_at,
            kind,
            trip_no: if outbound { record.trip_no } else { None },
            volume_liters: Some(record.volume_liters),
            detail: format!("{} {counterpart}", record.activity).trim_end().to_string(),
        });
    }

    for note in notes
        .iter()
        .filter(|n| n.unit_id == unit_id && n.log_date == date)
    {
        entries.push(DayLogEntry {
            at: note.logged_at,
            kind: DayLogKind::Note,
            trip_no: None,
            volume_liters: None,
            detail: note.note.clone(),
        });
    }

    entries.sort_by_key(|e| e.at);
    entries
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lot::tests::{date, lot};
    use crate::transfer::tests::record;
    use crate::trip::tests::{at, closed_trip, trip};
    use crate::types::LoadType;

    #[test]
    fn test_dispenser_day_spans_trips() {
        let d = date(2024, 3, 5);
        let mut second = trip(2, d);
        second.opening_liters = Some(Decimal::from(700));
        second.opening_at = Some(at(d, 12, 0));
        let trips = vec![second, closed_trip(1, d, 100, 600)];
        let day = DispenserDay::from_trips(UnitId::new(1), d, &trips);
        assert_eq!(day.trip_count, 2);
        assert_eq!(day.opening_liters, Some(Decimal::from(100)));
        assert_eq!(day.closing_liters, None);
        assert_eq!(day.state, Some(TripState::Opened));
    }

    #[test]
    fn test_dispenser_day_without_trips() {
        let day = DispenserDay::from_trips(UnitId::new(1), date(2024, 3, 6), &[]);
        assert_eq!(day.trip_count, 0);
        assert_eq!(day.state, None);
    }

    #[test]
    fn test_odometer_merge() {
        let patch = OdometerPatch {
            opening_km: Some(Decimal::from(1200)),
            closing_km: None,
        };
        assert_eq!(
            patch.merge(None).unwrap(),
            (Some(Decimal::from(1200)), None)
        );

        let patch = OdometerPatch {
            opening_km: None,
            closing_km: Some(Decimal::from(1100)),
        };
        assert!(patch.merge(Some((Some(Decimal::from(1200)), None))).is_err());
        assert!(patch.merge(None).is_err());
        assert!(OdometerPatch::default().merge(None).is_err());
    }

    #[test]
    fn test_odometer_rejects_values_the_column_would_round() {
        let patch = OdometerPatch {
            opening_km: Some(Decimal::new(100_025, 2)),
            closing_km: Some(Decimal::new(100_026, 2)),
        };
        assert!(matches!(patch.merge(None), Err(LedgerError::Validation(_))));

        let patch = OdometerPatch {
            opening_km: Some(Decimal::new(10_002, 1)),
            closing_km: Some(Decimal::new(100_030, 2)),
        };
        assert_eq!(
            patch.merge(None).unwrap(),
            (Some(Decimal::new(10_002, 1)), Some(Decimal::new(100_030, 2)))
        );
    }

    #[test]
    fn test_odometer_rejects_oversized_values() {
        let patch = OdometerPatch {
            opening_km: Some(Decimal::from(100_000_000_000_i64)),
            closing_km: None,
        };
        assert!(matches!(patch.merge(None), Err(LedgerError::Validation(_))));

        let patch = OdometerPatch {
            opening_km: None,
            closing_km: Some(Decimal::from(1_000_000_000)),
        };
        assert!(matches!(
            patch.merge(Some((Some(Decimal::from(10)), None))),
            Err(LedgerError::Validation(_))
        ));

        let patch = OdometerPatch {
            opening_km: Some(Decimal::new(9_999_999_999, 1)),
            closing_km: None,
        };
        assert!(patch.merge(None).is_ok());
    }

    #[test]
    fn test_day_log_is_chronological() {
        let d = date(2024, 3, 5);
        let trips = vec![closed_trip(1, d, 100, 1600)];
        let lots = vec![lot(1, 1, 4000, 1500, LoadType::Purchase)];
        let mut sale = record(1, Activity::Sale, 1, None, 1500);
        sale.to_vehicle = Some("AP09AB1234".to_string());
        sale.performed_at = at(d, 8, 45);
        let mut voided = record(2, Activity::Sale, 1, None, 10);
        voided.voided_at = Some(DateTime::<Utc>::default());
        let notes = vec![DayLogNote {
            id: DayLogId::new(1),
            unit_id: UnitId::new(1),
            log_date: d,
            logged_at: at(d, 8, 30),
            note: "tyre check".to_string(),
            created_at: DateTime::<Utc>::default(),
        }];

        let log = day_log(UnitId::new(1), d, &trips, &lots, &[sale, voided], &notes);
        let kinds: Vec<DayLogKind> = log.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DayLogKind::Load,
                DayLogKind::TripOpened,
                DayLogKind::Note,
                DayLogKind::Sale,
                DayLogKind::TripClosed,
            ]
        );
        assert_eq!(log[3].detail, "SALE AP09AB1234");
    }

    #[test]
    fn test_note_validation() {
        let note = NewDayLogNote {
            unit_id: UnitId::new(1),
            logged_at: at(date(2024, 3, 5), 9, 0),
            note: "  ".to_string(),
        };
        assert!(note.validate().is_err());
    }
}
