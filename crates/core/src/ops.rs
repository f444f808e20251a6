//! Day and trip operations views: what moved through a unit, itemised.

use chrono::NaiveDate;
use serde::Serialize;

use crate::lot::Lot;
use crate::transfer::TransferRecord;
use crate::trip::Trip;
use crate::types::{Activity, Liters, LoadType, TripId, UnitId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpsTotals {
    pub sales: Liters,
    pub transfers_out: Liters,
    pub transfers_in: Liters,
    pub loads: Liters,
    pub testing: Liters,
}

/// Aggregated view of a unit's day or of one trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationsView {
    pub unit_id: UnitId,
    pub date: NaiveDate,
    pub trip_id: Option<TripId>,
    pub trip_no: Option<i32>,
    /// The unit's total available volume now, not at the end of the window.
    pub remaining_liters: Liters,
    pub totals: OpsTotals,
    pub sales: Vec<TransferRecord>,
    pub transfers_out: Vec<TransferRecord>,
    pub transfers_in: Vec<TransferRecord>,
    pub loads: Vec<Lot>,
    pub testing: Vec<TransferRecord>,
}

impl OperationsView {
    /// View of a unit's day.
    #[must_use]
    pub fn for_day(
        unit_id: UnitId,
        date: NaiveDate,
        remaining: Liters,
        lots: &[Lot],
        records: &[TransferRecord],
    ) -> Self {
        let loads = lots
            .iter()
            .filter(|l| {
                l.unit_id == unit_id && l.load_date == date && l.load_type == LoadType::Purchase
            })
            .cloned()
            .collect();
        let records = records.iter().filter(|r| r.transfer_date == date);
        Self::build(unit_id, date, None, remaining, loads, records)
    }

    /// View of one trip: records attached to it, and purchases loaded
    /// between its opening and closing.
    #[must_use]
    pub fn for_trip(
        trip: &Trip,
        remaining: Liters,
        lots: &[Lot],
        records: &[TransferRecord],
    ) -> Self {
        let loads = lots
            .iter()
            .filter(|l| {
                let loaded_at = l.load_date.and_time(l.load_time);
                l.unit_id == trip.truck_id
                    && l.load_type == LoadType::Purchase
                    && trip.opening_at.is_some_and(|open| loaded_at >= open)
                    && trip.closing_at.is_none_or(|close| loaded_at <= close)
            })
            .cloned()
            .collect();
        let records = records
            .iter()
            .filter(|r| r.is_attached_to(trip.truck_id, trip.id));
        Self::build(
            trip.truck_id,
            trip.trip_date,
            Some(trip),
            remaining,
            loads,
            records,
        )
    }

    fn build<'a>(
        unit_id: UnitId,
        date: NaiveDate,
        trip: Option<&Trip>,
        remaining: Liters,
        loads: Vec<Lot>,
        records: impl Iterator<Item = &'a TransferRecord>,
    ) -> Self {
        let mut view = Self {
            unit_id,
            date,
            trip_id: trip.map(|t| t.id),
            trip_no: trip.map(|t| t.trip_no),
            remaining_liters: remaining,
            totals: OpsTotals {
                loads: loads.iter().map(|l| l.loaded_liters).sum(),
                ..OpsTotals::default()
            },
            sales: Vec::new(),
            transfers_out: Vec::new(),
            transfers_in: Vec::new(),
            loads,
            testing: Vec::new(),
        };

        for record in records.filter(|r| !r.is_voided()) {
            let volume = record.volume_liters;
            if record.from_unit_id == unit_id {
                let (total, list) = match record.activity {
                    Activity::Sale => (&mut view.totals.sales, &mut view.sales),
                    Activity::TankerToTanker | Activity::TankerToDatum => {
                        (&mut view.totals.transfers_out, &mut view.transfers_out)
                    }
                    Activity::Testing => (&mut view.totals.testing, &mut view.testing),
                };
                *total += volume;
                list.push(record.clone());
            } else if record.to_unit_id == Some(unit_id) && record.activity != Activity::Sale {
                view.totals.transfers_in += volume;
                view.transfers_in.push(record.clone());
            }
        }

        for list in [
            &mut view.sales,
            &mut view.transfers_out,
            &mut view.transfers_in,
            &mut view.testing,
        ] {
            list.sort_by_key(|r| (r.performed_at, r.id));
        }
        view.loads.sort_by_key(|l| (l.load_time, l.id));
        view
    }

    /// Net volume that left the unit in the window.
    #[must_use]
    pub fn net_outflow(&self) -> Liters {
        let returned: Liters = self
            .testing
            .iter()
            .filter(|r| r.is_net_zero())
            .map(|r| r.volume_liters)
            .sum();
        self.totals.sales + self.totals.transfers_out + self.totals.testing
            - returned
            - self.totals.transfers_in
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::lot::tests::{date, lot};
    use crate::transfer::tests::record;
    use crate::trip::tests::closed_trip;

    #[test]
    fn test_day_view_itemises_activity() {
        let d = date(2024, 3, 5);
        let lots = vec![
            lot(1, 1, 4000, 1500, LoadType::Purchase),
            lot(2, 1, 300, 0, LoadType::TransferIn),
        ];
        let records = vec![
            record(1, Activity::Sale, 1, None, 1500),
            record(2, Activity::TankerToDatum, 1, Some(2), 200),
            record(3, Activity::TankerToTanker, 3, Some(1), 300),
            record(4, Activity::Testing, 1, None, 20),
        ];
        let view = OperationsView::for_day(UnitId::new(1), d, Decimal::from(2800), &lots, &records);
        assert_eq!(view.totals.loads, Decimal::from(4000));
        assert_eq!(view.totals.sales, Decimal::from(1500));
        assert_eq!(view.totals.transfers_out, Decimal::from(200));
        assert_eq!(view.totals.transfers_in, Decimal::from(300));
        assert_eq!(view.totals.testing, Decimal::from(20));
        assert_eq!(view.loads.len(), 1);
        assert_eq!(view.net_outflow(), Decimal::from(1400));
        assert_eq!(view.trip_no, None);
    }

    #[test]
    fn test_trip_view_filters_to_attached_records() {
        let d = date(2024, 3, 5);
        let trip = closed_trip(1, d, 100, 1600);
        let mut attached = record(1, Activity::Sale, 1, None, 1500);
        attached.trip_id = Some(trip.id);
        let unattached = record(2, Activity::Sale, 1, None, 100);
        let lots = vec![lot(1, 1, 4000, 1500, LoadType::Purchase)];

        let view = OperationsView::for_trip(&trip, Decimal::from(2500), &lots, &[attached, unattached]);
        assert_eq!(view.trip_no, Some(1));
        assert_eq!(view.sales.len(), 1);
        assert_eq!(view.totals.sales, Decimal::from(1500));
        // Lot loaded at 06:00, before the trip opened at 08:00.
        assert!(view.loads.is_empty());
    }
}
