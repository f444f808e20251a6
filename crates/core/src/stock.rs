//! Stock summary projection and meter snapshots.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::lot::{Lot, validate_reading};
use crate::transfer::{ActivityTotals, TransferRecord};
use crate::types::{Liters, MeterSnapshotId, UnitId, UnitType};
use crate::unit::Unit;

/// An operator-reported dispenser meter reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterSnapshot {
    pub id: MeterSnapshotId,
    pub truck_id: UnitId,
    pub reading_liters: Liters,
    pub reading_at: NaiveDateTime,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a meter snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMeterSnapshot {
    pub truck_id: UnitId,
    pub reading_liters: Liters,
    /// Defaults to the time the snapshot is received.
    pub reading_at: Option<NaiveDateTime>,
}

impl NewMeterSnapshot {
    /// Validate the reading, filling in `now` when no time was given.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` for a negative or oversized reading,
    /// or one with more than two decimal places.
    pub fn validate(self, now: NaiveDateTime) -> Result<(UnitId, Liters, NaiveDateTime), LedgerError> {
        let reading = validate_reading(self.reading_liters, "reading_liters")?;
        Ok((self.truck_id, reading, self.reading_at.unwrap_or(now)))
    }
}

/// Live figures for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockSummary {
    pub unit_id: UnitId,
    pub unit_code: String,
    pub unit_type: UnitType,
    pub capacity_liters: i32,
    /// Physical stock: remaining volume across all lots.
    pub instock_liters: Liters,
    /// Stock available for sale once testing volume is held back.
    pub sale_only_liters: Liters,
    /// Projected meter position, `None` without a snapshot.
    pub meter_reading_liters: Option<Liters>,
    pub snapshot_at: Option<NaiveDateTime>,
    pub active_lot_code: Option<String>,
}

/// Project a unit's live figures.
///
/// `records` are the records touching the unit since at least the earlier
/// of the snapshot time and the start of `today`; older rows are ignored.
#[must_use]
pub fn summarize(
    unit: &Unit,
    lots: &[Lot],
    snapshot: Option<&MeterSnapshot>,
    records: &[TransferRecord],
    today: NaiveDate,
) -> StockSummary {
    let unit_lots = || lots.iter().filter(|l| l.unit_id == unit.id);
    let instock: Liters = unit_lots().map(Lot::remaining).sum();
    let active_lot_code = unit_lots()
        .filter(|l| l.remaining() > Decimal::ZERO)
        .min_by_key(|l| (l.load_date, l.load_time, l.id))
        .map(Lot::lot_code_after);

    let reserve_since = snapshot.map_or_else(|| today.and_time(NaiveTime::MIN), |s| s.reading_at);
    let reserve = ActivityTotals::for_unit(
        unit.id,
        records.iter().filter(|r| r.performed_at >= reserve_since),
    )
    .testing_net_zero_liters;
    let sale_only = (instock - reserve).max(Decimal::ZERO);

    let meter_reading = snapshot.map(|s| {
        let since = ActivityTotals::for_unit(
            unit.id,
            records.iter().filter(|r| r.performed_at >= s.reading_at),
        );
        s.reading_liters + since.sales_liters + since.transfers_out_liters
            - since.transfers_in_liters
    });

    StockSummary {
        unit_id: unit.id,
        unit_code: unit.unit_code.clone(),
        unit_type: unit.unit_type,
        capacity_liters: unit.capacity_liters,
        instock_liters: instock,
        sale_only_liters: sale_only,
        meter_reading_liters: meter_reading,
        snapshot_at: snapshot.map(|s| s.reading_at),
        active_lot_code,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lot::tests::{date, lot, unit};
    use crate::transfer::tests::record;
    use crate::trip::tests::at;
    use crate::types::{Activity, LoadType};

    fn snapshot(liters: i64, h: u32) -> MeterSnapshot {
        MeterSnapshot {
            id: MeterSnapshotId::new(1),
            truck_id: UnitId::new(1),
            reading_liters: Decimal::from(liters),
            reading_at: at(date(2024, 3, 5), h, 0),
            created_at: DateTime::<Utc>::default(),
        }
    }

    #[test]
    fn test_summary_without_snapshot() {
        let u = unit(1, "T1", UnitType::Truck);
        let lots = vec![
            lot(1, 1, 4000, 1500, LoadType::Purchase),
            lot(2, 1, 500, 0, LoadType::TransferIn),
        ];
        let records = vec![record(1, Activity::Testing, 1, None, 20)];
        let s = summarize(&u, &lots, None, &records, date(2024, 3, 5));
        assert_eq!(s.instock_liters, Decimal::from(3000));
        assert_eq!(s.sale_only_liters, Decimal::from(2980));
        assert_eq!(s.meter_reading_liters, None);
        assert_eq!(s.active_lot_code.as_deref(), Some("LOT05MAR24T1A4000-1500"));
    }

    #[test]
    fn test_meter_projection_counts_since_snapshot() {
        let u = unit(1, "T1", UnitType::Truck);
        let lots = vec![lot(1, 1, 4000, 1800, LoadType::Purchase)];
        let mut before = record(1, Activity::Sale, 1, None, 300);
        before.performed_at = at(date(2024, 3, 5), 7, 0);
        let after = vec![
            before,
            record(2, Activity::Sale, 1, None, 1500),
            record(3, Activity::TankerToDatum, 1, Some(2), 200),
            record(4, Activity::TankerToTanker, 3, Some(1), 100),
        ];
        let s = summarize(&u, &lots, Some(&snapshot(10_000, 8)), &after, date(2024, 3, 5));
        assert_eq!(s.meter_reading_liters, Some(Decimal::from(11_600)));
        assert_eq!(s.snapshot_at, Some(at(date(2024, 3, 5), 8, 0)));
    }

    #[test]
    fn test_sale_only_never_negative() {
        let u = unit(1, "T1", UnitType::Truck);
        let lots = vec![lot(1, 1, 100, 90, LoadType::Purchase)];
        let records = vec![record(1, Activity::Testing, 1, None, 50)];
        let s = summarize(&u, &lots, None, &records, date(2024, 3, 5));
        assert_eq!(s.sale_only_liters, Decimal::ZERO);
    }

    #[test]
    fn test_summary_is_idempotent() {
        let u = unit(1, "T1", UnitType::Truck);
        let lots = vec![lot(1, 1, 4000, 1500, LoadType::Purchase)];
        let records = vec![record(1, Activity::Sale, 1, None, 1500)];
        let snap = snapshot(100, 6);
        let first = summarize(&u, &lots, Some(&snap), &records, date(2024, 3, 5));
        let second = summarize(&u, &lots, Some(&snap), &records, date(2024, 3, 5));
        assert_eq!(first, second);
    }

    #[test]
    fn test_snapshot_validation() {
        let now = at(date(2024, 3, 5), 12, 0);
        let input = NewMeterSnapshot {
            truck_id: UnitId::new(1),
            reading_liters: Decimal::from(-1),
            reading_at: None,
        };
        assert!(input.validate(now).is_err());

        let input = NewMeterSnapshot {
            truck_id: UnitId::new(1),
            reading_liters: Decimal::from(10),
            reading_at: None,
        };
        assert_eq!(input.validate(now).unwrap().2, now);

        let input = NewMeterSnapshot {
            truck_id: UnitId::new(1),
            reading_liters: Decimal::from(100_000_000_000_i64),
            reading_at: None,
        };
        assert!(matches!(input.validate(now), Err(LedgerError::Validation(_))));
    }
}
