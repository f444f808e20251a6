//! Database operations for transfer records and their audit trail.
//!
//! Transfer rows are never deleted. Voiding sets `voided_at`, and every read
//! used for ledger arithmetic skips voided rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{PgConnection, PgExecutor};

use fuelops_core::transfer::{TransferAudit, TransferRecord};
use fuelops_core::{
    Activity, AuditAction, DriverId, Liters, LotId, TransferAuditId, TransferId, TripId, UnitId,
};

use super::RepositoryError;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TransferRow {
    id: i32,
    activity: Activity,
    from_unit_id: i32,
    to_unit_id: Option<i32>,
    to_vehicle: Option<String>,
    volume_liters: Liters,
    transfer_date: NaiveDate,
    performed_at: NaiveDateTime,
    trip_id: Option<i32>,
    trip_no: Option<i32>,
    to_trip_id: Option<i32>,
    driver_id: Option<i32>,
    source_lot_id: Option<i32>,
    credit_lot_id: Option<i32>,
    lot_code_after: String,
    note: Option<String>,
    voided_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TransferRow> for TransferRecord {
    fn from(row: TransferRow) -> Self {
        Self {
            id: TransferId::new(row.id),
            activity: row.activity,
            from_unit_id: UnitId::new(row.from_unit_id),
            to_unit_id: row.to_unit_id.map(UnitId::new),
            to_vehicle: row.to_vehicle,
            volume_liters: row.volume_liters,
            transfer_date: row.transfer_date,
            performed_at: row.performed_at,
            trip_id: row.trip_id.map(TripId::new),
            trip_no: row.trip_no,
            to_trip_id: row.to_trip_id.map(TripId::new),
            driver_id: row.driver_id.map(DriverId::new),
            source_lot_id: row.source_lot_id.map(LotId::new),
            credit_lot_id: row.credit_lot_id.map(LotId::new),
            lot_code_after: row.lot_code_after,
            note: row.note,
            voided_at: row.voided_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WindowedTransferRow {
    window_unit_id: i32,
    #[sqlx(flatten)]
    transfer: TransferRow,
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: i32,
    transfer_id: i32,
    action: AuditAction,
    old_volume_liters: Liters,
    new_volume_liters: Option<Liters>,
    old_performed_at: NaiveDateTime,
    new_performed_at: Option<NaiveDateTime>,
    reason: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl From<AuditRow> for TransferAudit {
    fn from(row: AuditRow) -> Self {
        Self {
            id: TransferAuditId::new(row.id),
            transfer_id: TransferId::new(row.transfer_id),
            action: row.action,
            old_volume_liters: row.old_volume_liters,
            new_volume_liters: row.new_volume_liters,
            old_performed_at: row.old_performed_at,
            new_performed_at: row.new_performed_at,
            reason: row.reason,
            recorded_at: row.recorded_at,
        }
    }
}

const TRANSFER_COLUMNS: &str = "id, activity, from_unit_id, to_unit_id, to_vehicle, \
     volume_liters, transfer_date, performed_at, trip_id, trip_no, to_trip_id, driver_id, \
     source_lot_id, credit_lot_id, lot_code_after, note, voided_at, created_at, updated_at";

/// Values for a new transfer row.
#[derive(Debug)]
pub struct InsertTransfer<'a> {
    pub activity: Activity,
    pub from_unit_id: UnitId,
    pub to_unit_id: Option<UnitId>,
    pub to_vehicle: Option<&'a str>,
    pub volume_liters: Liters,
    pub performed_at: NaiveDateTime,
    pub trip_id: Option<TripId>,
    pub trip_no: Option<i32>,
    pub to_trip_id: Option<TripId>,
    pub driver_id: Option<DriverId>,
    pub source_lot_id: Option<LotId>,
    pub lot_code_after: &'a str,
    pub note: Option<&'a str>,
}

/// One audit entry to append.
#[derive(Debug)]
pub struct InsertAudit<'a> {
    pub transfer_id: TransferId,
    pub action: AuditAction,
    pub old_volume_liters: Liters,
    pub new_volume_liters: Option<Liters>,
    pub old_performed_at: NaiveDateTime,
    pub new_performed_at: Option<NaiveDateTime>,
    pub reason: Option<&'a str>,
}

// =============================================================================
// Reads
// =============================================================================

/// Get a transfer record by ID, voided or not.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get<'e>(
    executor: impl PgExecutor<'e>,
    id: TransferId,
) -> Result<Option<TransferRecord>, RepositoryError> {
    let row = sqlx::query_as::<_, TransferRow>(&format!(
        "SELECT {TRANSFER_COLUMNS} FROM fuelops.transfer WHERE id = $1"
    ))
    .bind(id.as_i32())
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// Lock a transfer row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the record does not exist.
pub async fn lock(conn: &mut PgConnection, id: TransferId) -> Result<TransferRecord, RepositoryError> {
    let row = sqlx::query_as::<_, TransferRow>(&format!(
        "SELECT {TRANSFER_COLUMNS} FROM fuelops.transfer WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_i32())
    .fetch_optional(conn)
    .await?;

    row.map(Into::into).ok_or(RepositoryError::NotFound)
}

/// Live records touching a unit, on either side, between two dates.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_unit(
    conn: &mut PgConnection,
    unit_id: UnitId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<TransferRecord>, RepositoryError> {
    let rows = sqlx::query_as::<_, TransferRow>(&format!(
        r"
        SELECT {TRANSFER_COLUMNS}
        FROM fuelops.transfer
        WHERE (from_unit_id = $1 OR to_unit_id = $1)
          AND transfer_date BETWEEN $2 AND $3
          AND voided_at IS NULL
        ORDER BY performed_at, id
        "
    ))
    .bind(unit_id.as_i32())
    .bind(from)
    .bind(to)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Live records for several units at once, each from its own start time.
///
/// Returns `(unit, record)` pairs; a record touching two of the units is
/// returned once for each.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_units_since(
    conn: &mut PgConnection,
    windows: &[(UnitId, NaiveDateTime)],
) -> Result<Vec<(UnitId, TransferRecord)>, RepositoryError> {
    let (unit_ids, since): (Vec<i32>, Vec<NaiveDateTime>) =
        windows.iter().map(|(id, at)| (id.as_i32(), *at)).unzip();
    let rows = sqlx::query_as::<_, WindowedTransferRow>(&format!(
        r"
        SELECT w.window_unit_id, {TRANSFER_COLUMNS}
        FROM unnest($1::int4[], $2::timestamp[]) AS w (window_unit_id, window_since)
        JOIN fuelops.transfer
          ON (from_unit_id = w.window_unit_id OR to_unit_id = w.window_unit_id)
         AND performed_at >= w.window_since
        WHERE voided_at IS NULL
        ORDER BY w.window_unit_id, performed_at, id
        "
    ))
    .bind(unit_ids)
    .bind(since)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (UnitId::new(row.window_unit_id), row.transfer.into()))
        .collect())
}

/// Live records attached to a trip on either side.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_trip(
    conn: &mut PgConnection,
    trip_id: TripId,
) -> Result<Vec<TransferRecord>, RepositoryError> {
    let rows = sqlx::query_as::<_, TransferRow>(&format!(
        r"
        SELECT {TRANSFER_COLUMNS}
        FROM fuelops.transfer
        WHERE (trip_id = $1 OR to_trip_id = $1)
          AND voided_at IS NULL
        ORDER BY id
        "
    ))
    .bind(trip_id.as_i32())
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Audit trail of a record, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_audit<'e>(
    executor: impl PgExecutor<'e>,
    transfer_id: TransferId,
) -> Result<Vec<TransferAudit>, RepositoryError> {
    let rows = sqlx::query_as::<_, AuditRow>(
        r"
        SELECT id, transfer_id, action, old_volume_liters, new_volume_liters,
               old_performed_at, new_performed_at, reason, recorded_at
        FROM fuelops.transfer_audit
        WHERE transfer_id = $1
        ORDER BY id
        ",
    )
    .bind(transfer_id.as_i32())
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

// =============================================================================
// Writes
// =============================================================================

/// Insert a transfer record.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert(
    conn: &mut PgConnection,
    record: &InsertTransfer<'_>,
) -> Result<TransferRecord, RepositoryError> {
    let row = sqlx::query_as::<_, TransferRow>(&format!(
        r"
        INSERT INTO fuelops.transfer (
            activity, from_unit_id, to_unit_id, to_vehicle, volume_liters,
            transfer_date, performed_at, trip_id, trip_no, to_trip_id,
            driver_id, source_lot_id, lot_code_after, note
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING {TRANSFER_COLUMNS}
        "
    ))
    .bind(record.activity)
    .bind(record.from_unit_id.as_i32())
    .bind(record.to_unit_id.map(|id| id.as_i32()))
    .bind(record.to_vehicle)
    .bind(record.volume_liters)
    .bind(record.performed_at.date())
    .bind(record.performed_at)
    .bind(record.trip_id.map(|id| id.as_i32()))
    .bind(record.trip_no)
    .bind(record.to_trip_id.map(|id| id.as_i32()))
    .bind(record.driver_id.map(|id| id.as_i32()))
    .bind(record.source_lot_id.map(|id| id.as_i32()))
    .bind(record.lot_code_after)
    .bind(record.note)
    .fetch_one(conn)
    .await?;

    Ok(row.into())
}

/// Link a record to the `TRANSFER_IN` lot that credits its destination.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the record does not exist.
pub async fn set_credit_lot(
    conn: &mut PgConnection,
    id: TransferId,
    lot_id: LotId,
) -> Result<TransferRecord, RepositoryError> {
    let row = sqlx::query_as::<_, TransferRow>(&format!(
        r"
        UPDATE fuelops.transfer
        SET credit_lot_id = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING {TRANSFER_COLUMNS}
        "
    ))
    .bind(id.as_i32())
    .bind(lot_id.as_i32())
    .fetch_optional(conn)
    .await?;

    row.map(Into::into).ok_or(RepositoryError::NotFound)
}

/// Persist an edited volume and time.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if no live record has this ID.
pub async fn update_volume(
    conn: &mut PgConnection,
    id: TransferId,
    volume_liters: Liters,
    performed_at: NaiveDateTime,
    lot_code_after: &str,
) -> Result<TransferRecord, RepositoryError> {
    let row = sqlx::query_as::<_, TransferRow>(&format!(
        r"
        UPDATE fuelops.transfer
        SET volume_liters = $2,
            performed_at = $3,
            lot_code_after = $4,
            updated_at = NOW()
        WHERE id = $1 AND voided_at IS NULL
        RETURNING {TRANSFER_COLUMNS}
        "
    ))
    .bind(id.as_i32())
    .bind(volume_liters)
    .bind(performed_at)
    .bind(lot_code_after)
    .fetch_optional(conn)
    .await?;

    row.map(Into::into).ok_or(RepositoryError::NotFound)
}

/// Mark a record voided.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if no live record has this ID.
pub async fn void(conn: &mut PgConnection, id: TransferId) -> Result<TransferRecord, RepositoryError> {
    let row = sqlx::query_as::<_, TransferRow>(&format!(
        r"
        UPDATE fuelops.transfer
        SET voided_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND voided_at IS NULL
        RETURNING {TRANSFER_COLUMNS}
        "
    ))
    .bind(id.as_i32())
    .fetch_optional(conn)
    .await?;

    row.map(Into::into).ok_or(RepositoryError::NotFound)
}

/// Append an audit entry.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_audit(
    conn: &mut PgConnection,
    audit: &InsertAudit<'_>,
) -> Result<TransferAudit, RepositoryError> {
    let row = sqlx::query_as::<_, AuditRow>(
        r"
        INSERT INTO fuelops.transfer_audit (
            transfer_id, action, old_volume_liters, new_volume_liters,
            old_performed_at, new_performed_at, reason
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, transfer_id, action, old_volume_liters, new_volume_liters,
                  old_performed_at, new_performed_at, reason, recorded_at
        ",
    )
    .bind(audit.transfer_id.as_i32())
    .bind(audit.action)
    .bind(audit.old_volume_liters)
    .bind(audit.new_volume_liters)
    .bind(audit.old_performed_at)
    .bind(audit.new_performed_at)
    .bind(audit.reason)
    .fetch_one(conn)
    .await?;

    Ok(row.into())
}
