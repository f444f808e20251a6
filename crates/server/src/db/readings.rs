//! Database operations for day-level odometer readings and the day log.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};

use fuelops_core::readings::{DayLogNote, NewDayLogNote, OdometerDay};
use fuelops_core::{DayLogId, UnitId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct OdometerRow {
    truck_id: i32,
    reading_date: NaiveDate,
    opening_km: Option<Decimal>,
    closing_km: Option<Decimal>,
    updated_at: DateTime<Utc>,
}

impl From<OdometerRow> for OdometerDay {
    fn from(row: OdometerRow) -> Self {
        Self {
            truck_id: UnitId::new(row.truck_id),
            reading_date: row.reading_date,
            opening_km: row.opening_km,
            closing_km: row.closing_km,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DayLogRow {
    id: i32,
    unit_id: i32,
    log_date: NaiveDate,
    logged_at: NaiveDateTime,
    note: String,
    created_at: DateTime<Utc>,
}

impl From<DayLogRow> for DayLogNote {
    fn from(row: DayLogRow) -> Self {
        Self {
            id: DayLogId::new(row.id),
            unit_id: UnitId::new(row.unit_id),
            log_date: row.log_date,
            logged_at: row.logged_at,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Odometer
// =============================================================================

/// Odometer readings for a truck+date.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_odometer<'e>(
    executor: impl PgExecutor<'e>,
    truck_id: UnitId,
    date: NaiveDate,
) -> Result<Option<OdometerDay>, RepositoryError> {
    let row = sqlx::query_as::<_, OdometerRow>(
        r"
        SELECT truck_id, reading_date, opening_km, closing_km, updated_at
        FROM fuelops.day_odometer
        WHERE truck_id = $1 AND reading_date = $2
        ",
    )
    .bind(truck_id.as_i32())
    .bind(date)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// Lock the odometer row of a truck+date, if it exists.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_odometer(
    conn: &mut PgConnection,
    truck_id: UnitId,
    date: NaiveDate,
) -> Result<Option<OdometerDay>, RepositoryError> {
    let row = sqlx::query_as::<_, OdometerRow>(
        r"
        SELECT truck_id, reading_date, opening_km, closing_km, updated_at
        FROM fuelops.day_odometer
        WHERE truck_id = $1 AND reading_date = $2
        FOR UPDATE
        ",
    )
    .bind(truck_id.as_i32())
    .bind(date)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(Into::into))
}

/// Insert or replace the odometer readings of a truck+date.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn upsert_odometer(
    conn: &mut PgConnection,
    truck_id: UnitId,
    date: NaiveDate,
    opening_km: Option<Decimal>,
    closing_km: Option<Decimal>,
) -> Result<OdometerDay, RepositoryError> {
    let row = sqlx::query_as::<_, OdometerRow>(
        r"
        INSERT INTO fuelops.day_odometer (truck_id, reading_date, opening_km, closing_km)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (truck_id, reading_date) DO UPDATE
        SET opening_km = EXCLUDED.opening_km,
            closing_km = EXCLUDED.closing_km,
            updated_at = NOW()
        RETURNING truck_id, reading_date, opening_km, closing_km, updated_at
        ",
    )
    .bind(truck_id.as_i32())
    .bind(date)
    .bind(opening_km)
    .bind(closing_km)
    .fetch_one(conn)
    .await?;

    Ok(row.into())
}

// =============================================================================
// Day log
// =============================================================================

/// Operator notes of a unit for one date.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_notes(
    conn: &mut PgConnection,
    unit_id: UnitId,
    date: NaiveDate,
) -> Result<Vec<DayLogNote>, RepositoryError> {
    let rows = sqlx::query_as::<_, DayLogRow>(
        r"
        SELECT id, unit_id, log_date, logged_at, note, created_at
        FROM fuelops.day_log
        WHERE unit_id = $1 AND log_date = $2
        ORDER BY logged_at, id
        ",
    )
    .bind(unit_id.as_i32())
    .bind(date)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Append an operator note, filed under the date of `logged_at`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_note<'e>(
    executor: impl PgExecutor<'e>,
    note: &NewDayLogNote,
) -> Result<DayLogNote, RepositoryError> {
    let row = sqlx::query_as::<_, DayLogRow>(
        r"
        INSERT INTO fuelops.day_log (unit_id, log_date, logged_at, note)
        VALUES ($1, $2, $3, $4)
        RETURNING id, unit_id, log_date, logged_at, note, created_at
        ",
    )
    .bind(note.unit_id.as_i32())
    .bind(note.logged_at.date())
    .bind(note.logged_at)
    .bind(&note.note)
    .fetch_one(executor)
    .await?;

    Ok(row.into())
}
