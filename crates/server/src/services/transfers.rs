//! Sales, internal transfers and testing draws.
//!
//! Recording a transfer runs as:
//!
//! 1. Lock the source unit and, for internal transfers, the destination
//! 2. Resolve the trip each TRUCK side attaches to (`TripRequired` without one)
//! 3. Lock the source's open lots and debit the active lot
//! 4. Insert the transfer row
//! 5. For internal transfers, insert the destination's `TRANSFER_IN` lot and
//!    link it to the transfer
//!
//! Edits and voids reverse the record's own effect first and then apply the
//! new one, under the same locks. Every edit and void appends an audit row.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};

use fuelops_core::lot::{Lot, LotBook, lot_code};
use fuelops_core::transfer::{
    TransferAudit, TransferPatch, TransferRecord, TransferRequest, apply_outbound,
};
use fuelops_core::trip::resolve_trip;
use fuelops_core::unit::Unit;
use fuelops_core::{
    Activity, AuditAction, LedgerError, Liters, LoadType, StockStatus, TransferId, UnitId,
    UnitType,
};

use super::{LockedUnits, ServiceError, found, not_found};
use crate::db::lots::{self, InsertLot};
use crate::db::transfers::{self, InsertAudit, InsertTransfer};
use crate::db::{RepositoryError, drivers, trips};

/// A posted transfer with the effect it had on the source lot.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedTransfer {
    #[serde(flatten)]
    pub record: TransferRecord,
    /// Status of the debited source lot, absent for net-zero testing.
    pub stock_status: Option<StockStatus>,
    /// Code of the destination's new `TRANSFER_IN` lot.
    pub credit_lot_code: Option<String>,
}

/// Service for transfer records.
pub struct TransferService<'a> {
    pool: &'a PgPool,
}

impl<'a> TransferService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Post a sale, internal transfer or testing draw.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed request, an inactive unit, a
    ///   destination of the wrong type, or a credit exceeding capacity
    /// - `TripRequired` if a TRUCK side has no trip for the date
    /// - `Overdraw` / `InsufficientStock` if the source cannot supply the volume
    /// - `NotFound` for an unknown unit, driver or trip number
    #[instrument(
        skip(self, request),
        fields(activity = %request.activity, from_unit_id = %request.from_unit_id, volume = %request.volume_liters)
    )]
    pub async fn record(&self, request: TransferRequest) -> Result<RecordedTransfer, ServiceError> {
        let (request, kind) = request.validate()?;
        let date = request.transfer_date();
        let mut tx = self.pool.begin().await?;

        let mut ids = vec![request.from_unit_id];
        ids.extend(request.to_unit_id);
        let locked = LockedUnits::lock(&mut tx, &ids).await?;

        let source = locked.get(request.from_unit_id)?;
        source.ensure_active()?;
        let destination = request.to_unit_id.map(|id| locked.get(id)).transpose()?;
        if let Some(dest) = destination {
            dest.ensure_active()?;
            ensure_destination_type(request.activity, dest)?;
        }
        if let Some(driver_id) = request.driver_id
            && !drivers::is_active(&mut *tx, driver_id).await?
        {
            return Err(LedgerError::not_found("driver", driver_id).into());
        }

        let (trip_id, trip_no) = if source.unit_type.is_trip_scoped() {
            let day = trips::list_for_day(&mut *tx, source.id, date).await?;
            let trip = resolve_trip(&day, request.trip_no, &source.unit_code, date)?;
            (Some(trip.id), Some(trip.trip_no))
        } else if request.trip_no.is_some() {
            return Err(LedgerError::validation(format!(
                "{} is not a truck and has no trips",
                source.unit_code
            ))
            .into());
        } else {
            (None, None)
        };
        let to_trip_id = match destination {
            Some(dest) if dest.unit_type.is_trip_scoped() => {
                let day = trips::list_for_day(&mut *tx, dest.id, date).await?;
                Some(resolve_trip(&day, None, &dest.unit_code, date)?.id)
            }
            _ => None,
        };

        let open = lots::lock_for_unit(&mut tx, source.id, &[]).await?;
        let mut book = LotBook::new(source, open);
        let outbound = apply_outbound(kind, &mut book, request.volume_liters)?;
        if let Some(debit) = &outbound.debit {
            lots::set_used(&mut tx, debit.lot_id, debit.used_liters).await?;
        }

        let record = transfers::insert(
            &mut tx,
            &InsertTransfer {
                activity: request.activity,
                from_unit_id: source.id,
                to_unit_id: request.to_unit_id,
                to_vehicle: request.to_vehicle.as_deref(),
                volume_liters: request.volume_liters,
                performed_at: request.performed_at,
                trip_id,
                trip_no,
                to_trip_id,
                driver_id: request.driver_id,
                source_lot_id: outbound.debit.as_ref().map(|d| d.lot_id),
                lot_code_after: &outbound.lot_code_after,
                note: request.note.as_deref(),
            },
        )
        .await?;

        let (record, credit_lot) = match (destination, outbound.credit_liters) {
            (Some(dest), Some(volume)) => {
                let lot = credit_destination(&mut tx, dest, &record, volume).await?;
                let record = transfers::set_credit_lot(&mut tx, record.id, lot.id).await?;
                (record, Some(lot))
            }
            _ => (record, None),
        };

        tx.commit().await?;

        info!(
            transfer_id = %record.id,
            trip_no = ?record.trip_no,
            lot_code_after = %record.lot_code_after,
            "Transfer recorded"
        );
        Ok(RecordedTransfer {
            stock_status: outbound.debit.map(|d| d.stock_status),
            credit_lot_code: credit_lot.map(|l| l.lot_code_initial),
            record,
        })
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the transfer does not exist.
    pub async fn get(&self, id: TransferId) -> Result<TransferRecord, ServiceError> {
        let record = transfers::get(self.pool, id).await?;
        found(record, "transfer", id)
    }

    /// Change a record's volume or time of day.
    ///
    /// The record's prior debit is reversed before the new volume is
    /// checked, so shrinking a sale never fails and growing one only needs
    /// the extra volume.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty or malformed patch
    /// - `Overdraw` / `InsufficientStock` if the source cannot supply the new volume
    /// - `Conflict` if the record is voided, or the destination already used
    ///   more of the credit than the new volume
    /// - `NotFound` if the record does not exist
    #[instrument(skip(self, patch), fields(transfer_id = %id))]
    pub async fn edit(&self, id: TransferId, patch: TransferPatch) -> Result<TransferRecord, ServiceError> {
        let patch = patch.validate()?;
        let mut tx = self.pool.begin().await?;

        let record = read_record(&mut tx, id).await?;
        let locked = LockedUnits::lock(&mut tx, &unit_ids(&record)).await?;
        let record = transfers::lock(&mut tx, id).await.map_err(not_found("transfer", id))?;
        ensure_live(&record)?;

        let volume = patch.volume_liters.unwrap_or(record.volume_liters);
        let performed_at = patch.performed_at(&record);

        let lot_code_after = if volume == record.volume_liters {
            record.lot_code_after.clone()
        } else {
            let code = rebook_source(&mut tx, locked.get(record.from_unit_id)?, &record, volume).await?;
            if let (Some(lot_id), Some(to)) = (record.credit_lot_id, record.to_unit_id) {
                let dest = locked.get(to)?;
                let mut book = LotBook::new(dest, lots::lock_for_unit(&mut tx, to, &[lot_id]).await?);
                let growth = volume - record.volume_liters;
                if growth > Decimal::ZERO {
                    dest.ensure_capacity(book.available(), growth)?;
                }
                let lot = book.adjust_credit(lot_id, volume)?;
                lots::set_loaded(&mut tx, lot.id, lot.loaded_liters).await?;
            }
            code
        };

        let updated =
            transfers::update_volume(&mut tx, id, volume, performed_at, &lot_code_after).await?;
        transfers::insert_audit(
            &mut tx,
            &InsertAudit {
                transfer_id: id,
                action: AuditAction::Edit,
                old_volume_liters: record.volume_liters,
                new_volume_liters: Some(volume),
                old_performed_at: record.performed_at,
                new_performed_at: Some(performed_at),
                reason: patch.reason.as_deref(),
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            old_volume = %record.volume_liters,
            new_volume = %volume,
            "Transfer edited"
        );
        Ok(updated)
    }

    /// Void a record and reverse its effect on the ledger.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the record is already voided, or its destination
    ///   credit was partly used
    /// - `NotFound` if the record does not exist
    #[instrument(skip(self, reason), fields(transfer_id = %id))]
    pub async fn void(&self, id: TransferId, reason: Option<String>) -> Result<TransferRecord, ServiceError> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let mut tx = self.pool.begin().await?;

        let record = read_record(&mut tx, id).await?;
        let locked = LockedUnits::lock(&mut tx, &unit_ids(&record)).await?;
        let record = transfers::lock(&mut tx, id).await.map_err(not_found("transfer", id))?;
        ensure_live(&record)?;

        let voided = void_locked(&mut tx, &locked, &record, reason.as_deref()).await?;

        tx.commit().await?;

        info!(volume = %voided.volume_liters, "Transfer voided");
        Ok(voided)
    }

    /// Edit and void history of a record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    pub async fn audit(&self, id: TransferId) -> Result<Vec<TransferAudit>, ServiceError> {
        self.get(id).await?;
        Ok(transfers::list_audit(self.pool, id).await?)
    }
}

/// Reverse a locked, live record and mark it voided.
///
/// The caller must hold the locks of every unit the record touches.
pub(crate) async fn void_locked(
    conn: &mut PgConnection,
    locked: &LockedUnits,
    record: &TransferRecord,
    reason: Option<&str>,
) -> Result<TransferRecord, ServiceError> {
    if let Some(lot_id) = record.source_lot_id {
        let source = locked.get(record.from_unit_id)?;
        let mut book = LotBook::new(source, lots::lock_for_unit(conn, source.id, &[lot_id]).await?);
        let restored = book.reverse_debit(lot_id, record.volume_liters)?;
        lots::set_used(conn, lot_id, restored.used_liters).await?;
    }
    if let (Some(lot_id), Some(to)) = (record.credit_lot_id, record.to_unit_id) {
        let dest = locked.get(to)?;
        let mut book = LotBook::new(dest, lots::lock_for_unit(conn, to, &[lot_id]).await?);
        book.remove_credit(lot_id)?;
        lots::delete_credit(conn, lot_id).await?;
    }

    let voided = transfers::void(conn, record.id).await.map_err(|e| match e {
        RepositoryError::NotFound => {
            ServiceError::from(LedgerError::conflict(format!("transfer {} is already voided", record.id)))
        }
        other => other.into(),
    })?;
    transfers::insert_audit(
        conn,
        &InsertAudit {
            transfer_id: record.id,
            action: AuditAction::Void,
            old_volume_liters: record.volume_liters,
            new_volume_liters: None,
            old_performed_at: record.performed_at,
            new_performed_at: None,
            reason,
        },
    )
    .await?;
    Ok(voided)
}

/// Units a record touches.
pub(crate) fn unit_ids(record: &TransferRecord) -> Vec<UnitId> {
    let mut ids = vec![record.from_unit_id];
    ids.extend(record.to_unit_id);
    ids
}

/// Read a record to learn which units to lock. Re-read it under lock after.
async fn read_record(conn: &mut PgConnection, id: TransferId) -> Result<TransferRecord, ServiceError> {
    let record = transfers::get(&mut *conn, id).await?;
    found(record, "transfer", id)
}

fn ensure_live(record: &TransferRecord) -> Result<(), ServiceError> {
    if record.is_voided() {
        warn!(transfer_id = %record.id, "Rejected change to a voided transfer");
        return Err(LedgerError::conflict(format!("transfer {} is voided", record.id)).into());
    }
    Ok(())
}

/// `TANKER_TO_TANKER` goes to a truck; `TANKER_TO_DATUM` to fixed storage.
fn ensure_destination_type(activity: Activity, destination: &Unit) -> Result<(), LedgerError> {
    let fits = match activity {
        Activity::TankerToTanker => destination.unit_type == UnitType::Truck,
        Activity::TankerToDatum => destination.unit_type != UnitType::Truck,
        Activity::Sale | Activity::Testing => true,
    };
    if fits {
        Ok(())
    } else {
        Err(LedgerError::validation(format!(
            "{activity} cannot go to {} ({})",
            destination.unit_code, destination.unit_type
        )))
    }
}

/// Insert the destination's `TRANSFER_IN` lot for `record`.
async fn credit_destination(
    conn: &mut PgConnection,
    dest: &Unit,
    record: &TransferRecord,
    volume: Liters,
) -> Result<Lot, ServiceError> {
    let open = lots::lock_for_unit(conn, dest.id, &[]).await?;
    let mut book = LotBook::new(dest, open);
    dest.ensure_capacity(book.available(), volume)?;

    let date = record.transfer_date;
    let sequence_no = lots::next_sequence_no(conn, dest.id, date, LoadType::TransferIn).await?;
    let code = lot_code(LoadType::TransferIn, date, &dest.unit_code, sequence_no, volume)?;
    let lot = lots::insert(
        conn,
        &InsertLot {
            unit_id: dest.id,
            lot_code_initial: &code,
            load_type: LoadType::TransferIn,
            sequence_no,
            loaded_liters: volume,
            load_date: date,
            load_time: record.performed_at.time(),
            source_transfer_id: Some(record.id),
        },
    )
    .await?;
    book.credit(lot.clone())?;
    Ok(lot)
}

/// Reverse the record's debit and apply `volume` to the same lot.
///
/// Returns the new `lot_code_after`.
async fn rebook_source(
    conn: &mut PgConnection,
    source: &Unit,
    record: &TransferRecord,
    volume: Liters,
) -> Result<String, ServiceError> {
    let also: Vec<_> = record.source_lot_id.into_iter().collect();
    let mut book = LotBook::new(source, lots::lock_for_unit(conn, source.id, &also).await?);

    let Some(lot_id) = record.source_lot_id else {
        book.ensure_available(volume)?;
        return Ok(record.lot_code_after.clone());
    };
    book.reverse_debit(lot_id, record.volume_liters)?;
    book.ensure_available(volume)?;
    let debit = book.debit_lot(lot_id, volume)?;
    lots::set_used(conn, lot_id, debit.used_liters).await?;
    Ok(debit.lot_code_after)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use fuelops_core::{LotId, TripId};

    use super::*;

    fn unit(id: i32, unit_type: UnitType) -> Unit {
        Unit {
            id: UnitId::new(id),
            unit_code: format!("U{id}"),
            unit_type,
            vehicle_number: None,
            capacity_liters: 10_000,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn record(from: i32, to: Option<i32>) -> TransferRecord {
        let performed_at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        TransferRecord {
            id: TransferId::new(7),
            activity: Activity::TankerToTanker,
            from_unit_id: UnitId::new(from),
            to_unit_id: to.map(UnitId::new),
            to_vehicle: None,
            volume_liters: Decimal::from(500),
            transfer_date: performed_at.date(),
            performed_at,
            trip_id: Some(TripId::new(1)),
            trip_no: Some(1),
            to_trip_id: to.map(|_| TripId::new(2)),
            driver_id: None,
            source_lot_id: Some(LotId::new(3)),
            credit_lot_id: None,
            lot_code_after: "LOT05MAR24U1A4000-500".to_string(),
            note: None,
            voided_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_tanker_to_tanker_requires_truck_destination() {
        assert!(ensure_destination_type(Activity::TankerToTanker, &unit(2, UnitType::Truck)).is_ok());
        let err = ensure_destination_type(Activity::TankerToTanker, &unit(2, UnitType::Datum))
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_tanker_to_datum_rejects_truck_destination() {
        assert!(ensure_destination_type(Activity::TankerToDatum, &unit(2, UnitType::Storage)).is_ok());
        assert!(ensure_destination_type(Activity::TankerToDatum, &unit(2, UnitType::Truck)).is_err());
    }

    #[test]
    fn test_testing_may_go_anywhere() {
        for unit_type in [UnitType::Truck, UnitType::Datum, UnitType::Storage] {
            assert!(ensure_destination_type(Activity::Testing, &unit(2, unit_type)).is_ok());
        }
    }

    #[test]
    fn test_unit_ids_cover_both_sides() {
        assert_eq!(unit_ids(&record(1, Some(2))), vec![UnitId::new(1), UnitId::new(2)]);
        assert_eq!(unit_ids(&record(1, None)), vec![UnitId::new(1)]);
    }

    #[test]
    fn test_voided_record_is_not_live() {
        let mut r = record(1, None);
        assert!(ensure_live(&r).is_ok());
        r.voided_at = Some(Utc::now());
        assert!(ensure_live(&r).is_err());
    }
}
