//! Database operations for lots.
//!
//! `used_liters` is the only volume column writers advance on purchase lots;
//! `loaded_liters` changes only on `TRANSFER_IN` credits, as the compensating
//! side of a transfer edit.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};

use fuelops_core::lot::Lot;
use fuelops_core::{Liters, LoadType, LotId, StockStatus, TransferId, UnitId};

use super::{RepositoryError, map_constraint};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct LotRow {
    id: i32,
    unit_id: i32,
    lot_code_initial: String,
    load_type: LoadType,
    sequence_no: i32,
    loaded_liters: Liters,
    used_liters: Liters,
    load_date: NaiveDate,
    load_time: NaiveTime,
    source_transfer_id: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<LotRow> for Lot {
    fn from(row: LotRow) -> Self {
        Self {
            id: LotId::new(row.id),
            unit_id: UnitId::new(row.unit_id),
            lot_code_initial: row.lot_code_initial,
            load_type: row.load_type,
            sequence_no: row.sequence_no,
            loaded_liters: row.loaded_liters,
            used_liters: row.used_liters,
            load_date: row.load_date,
            load_time: row.load_time,
            source_transfer_id: row.source_transfer_id.map(TransferId::new),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LotListingRow {
    #[sqlx(flatten)]
    lot: LotRow,
    unit_code: String,
}

const LOT_COLUMNS: &str = "l.id, l.unit_id, l.lot_code_initial, l.load_type, l.sequence_no, \
     l.loaded_liters, l.used_liters, l.load_date, l.load_time, l.source_transfer_id, l.created_at";

// =============================================================================
// Public Types
// =============================================================================

/// Filter for lot listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotFilter {
    pub unit_id: Option<UnitId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub load_type: Option<LoadType>,
}

/// A lot with its unit code and derived figures.
#[derive(Debug, Clone, Serialize)]
pub struct LotListing {
    #[serde(flatten)]
    pub lot: Lot,
    pub unit_code: String,
    pub remaining_liters: Liters,
    pub stock_status: StockStatus,
    pub lot_code_after: String,
}

impl LotListing {
    #[must_use]
    pub fn new(lot: Lot, unit_code: String) -> Self {
        Self {
            remaining_liters: lot.remaining(),
            stock_status: lot.stock_status(),
            lot_code_after: lot.lot_code_after(),
            unit_code,
            lot,
        }
    }
}

impl From<LotListingRow> for LotListing {
    fn from(row: LotListingRow) -> Self {
        Self::new(row.lot.into(), row.unit_code)
    }
}

/// Values for a new lot row.
#[derive(Debug)]
pub struct InsertLot<'a> {
    pub unit_id: UnitId,
    pub lot_code_initial: &'a str,
    pub load_type: LoadType,
    pub sequence_no: i32,
    pub loaded_liters: Liters,
    pub load_date: NaiveDate,
    pub load_time: NaiveTime,
    pub source_transfer_id: Option<TransferId>,
}

// =============================================================================
// Reads
// =============================================================================

/// Get a lot by ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get<'e>(
    executor: impl PgExecutor<'e>,
    id: LotId,
) -> Result<Option<LotListing>, RepositoryError> {
    let row = sqlx::query_as::<_, LotListingRow>(&format!(
        r"
        SELECT {LOT_COLUMNS}, u.unit_code
        FROM fuelops.lot l
        JOIN fuelops.unit u ON u.id = l.unit_id
        WHERE l.id = $1
        "
    ))
    .bind(id.as_i32())
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// List lots matching a filter, oldest first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list<'e>(
    executor: impl PgExecutor<'e>,
    filter: &LotFilter,
) -> Result<Vec<LotListing>, RepositoryError> {
    let rows = sqlx::query_as::<_, LotListingRow>(&format!(
        r"
        SELECT {LOT_COLUMNS}, u.unit_code
        FROM fuelops.lot l
        JOIN fuelops.unit u ON u.id = l.unit_id
        WHERE ($1::int IS NULL OR l.unit_id = $1)
          AND ($2::date IS NULL OR l.load_date >= $2)
          AND ($3::date IS NULL OR l.load_date <= $3)
          AND ($4::fuelops.load_type IS NULL OR l.load_type = $4)
        ORDER BY l.load_date, l.load_time, l.id
        "
    ))
    .bind(filter.unit_id.map(|id| id.as_i32()))
    .bind(filter.from)
    .bind(filter.to)
    .bind(filter.load_type)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Lots of a unit loaded on `date`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_day(
    conn: &mut PgConnection,
    unit_id: UnitId,
    date: NaiveDate,
) -> Result<Vec<Lot>, RepositoryError> {
    let rows = sqlx::query_as::<_, LotRow>(&format!(
        r"
        SELECT {LOT_COLUMNS}
        FROM fuelops.lot l
        WHERE l.unit_id = $1 AND l.load_date = $2
        ORDER BY l.load_time, l.id
        "
    ))
    .bind(unit_id.as_i32())
    .bind(date)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Every lot that still holds volume, across all units.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_open(conn: &mut PgConnection) -> Result<Vec<Lot>, RepositoryError> {
    let rows = sqlx::query_as::<_, LotRow>(&format!(
        r"
        SELECT {LOT_COLUMNS}
        FROM fuelops.lot l
        WHERE l.used_liters < l.loaded_liters
        ORDER BY l.unit_id, l.load_date, l.load_time, l.id
        "
    ))
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Total remaining volume of a unit.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn available(conn: &mut PgConnection, unit_id: UnitId) -> Result<Liters, RepositoryError> {
    let total: Liters = sqlx::query_scalar(
        r"
        SELECT COALESCE(SUM(loaded_liters - used_liters), 0)
        FROM fuelops.lot
        WHERE unit_id = $1 AND used_liters < loaded_liters
        ",
    )
    .bind(unit_id.as_i32())
    .fetch_one(conn)
    .await?;

    Ok(total)
}

// =============================================================================
// Writes (call inside a transaction holding the unit lock)
// =============================================================================

/// Lock the lots a write on `unit_id` may touch: every open lot, plus the
/// listed lots even if sold (a reversal may reopen them).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_unit(
    conn: &mut PgConnection,
    unit_id: UnitId,
    also: &[LotId],
) -> Result<Vec<Lot>, RepositoryError> {
    let also: Vec<i32> = also.iter().map(LotId::as_i32).collect();
    let rows = sqlx::query_as::<_, LotRow>(&format!(
        r"
        SELECT {LOT_COLUMNS}
        FROM fuelops.lot l
        WHERE l.unit_id = $1
          AND (l.used_liters < l.loaded_liters OR l.id = ANY($2))
        ORDER BY l.id
        FOR UPDATE
        "
    ))
    .bind(unit_id.as_i32())
    .bind(also.as_slice())
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Next sequence number for a unit's loads of one type on one date.
///
/// Only correct while the caller holds the unit row lock; the unique
/// constraint backs it up if that is ever violated.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn next_sequence_no(
    conn: &mut PgConnection,
    unit_id: UnitId,
    load_date: NaiveDate,
    load_type: LoadType,
) -> Result<i32, RepositoryError> {
    let max: Option<i32> = sqlx::query_scalar(
        r"
        SELECT MAX(sequence_no)
        FROM fuelops.lot
        WHERE unit_id = $1 AND load_date = $2 AND load_type = $3
        ",
    )
    .bind(unit_id.as_i32())
    .bind(load_date)
    .bind(load_type)
    .fetch_one(conn)
    .await?;

    Ok(max.unwrap_or(0) + 1)
}

/// Insert a lot.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the sequence number or code is taken.
pub async fn insert(conn: &mut PgConnection, lot: &InsertLot<'_>) -> Result<Lot, RepositoryError> {
    let row = sqlx::query_as::<_, LotRow>(&format!(
        r"
        INSERT INTO fuelops.lot AS l (
            unit_id, lot_code_initial, load_type, sequence_no,
            loaded_liters, load_date, load_time, source_transfer_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {LOT_COLUMNS}
        "
    ))
    .bind(lot.unit_id.as_i32())
    .bind(lot.lot_code_initial)
    .bind(lot.load_type)
    .bind(lot.sequence_no)
    .bind(lot.loaded_liters)
    .bind(lot.load_date)
    .bind(lot.load_time)
    .bind(lot.source_transfer_id.map(|id| id.as_i32()))
    .fetch_one(conn)
    .await
    .map_err(|e| {
        let code = lot.lot_code_initial;
        match map_constraint(e, "lot_sequence_unique", || {
            format!("lot sequence for {code} was taken concurrently")
        }) {
            RepositoryError::Database(e) => map_constraint(e, "lot_code_unique", || {
                format!("lot code {code} already exists")
            }),
            other => other,
        }
    })?;

    Ok(row.into())
}

/// Persist a lot's usage.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the lot does not exist.
pub async fn set_used(
    conn: &mut PgConnection,
    id: LotId,
    used_liters: Liters,
) -> Result<(), RepositoryError> {
    let result = sqlx::query("UPDATE fuelops.lot SET used_liters = $2 WHERE id = $1")
        .bind(id.as_i32())
        .bind(used_liters)
        .execute(conn)
        .await
        .map_err(|e| {
            map_constraint(e, "lot_usage_within_loaded", || {
                format!("lot {id} usage out of range")
            })
        })?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Persist a transfer credit's loaded volume.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if no `TRANSFER_IN` lot has this ID.
pub async fn set_loaded(
    conn: &mut PgConnection,
    id: LotId,
    loaded_liters: Liters,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE fuelops.lot SET loaded_liters = $2 WHERE id = $1 AND load_type = 'TRANSFER_IN'",
    )
    .bind(id.as_i32())
    .bind(loaded_liters)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Delete an unconsumed transfer credit.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the lot has usage, and
/// `RepositoryError::NotFound` if no `TRANSFER_IN` lot has this ID.
pub async fn delete_credit(conn: &mut PgConnection, id: LotId) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        DELETE FROM fuelops.lot
        WHERE id = $1 AND load_type = 'TRANSFER_IN' AND used_liters = 0
        ",
    )
    .bind(id.as_i32())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "transfer lot {id} is missing or already in use"
        )));
    }
    Ok(())
}
