//! Database operations for trip sessions.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{PgConnection, PgExecutor};

use fuelops_core::trip::Trip;
use fuelops_core::{DriverId, Liters, TripId, UnitId};

use super::{RepositoryError, map_constraint};

#[derive(Debug, sqlx::FromRow)]
struct TripRow {
    id: i32,
    truck_id: i32,
    trip_no: i32,
    trip_date: NaiveDate,
    opening_liters: Option<Liters>,
    opening_at: Option<NaiveDateTime>,
    closing_liters: Option<Liters>,
    closing_at: Option<NaiveDateTime>,
    driver_id: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Self {
            id: TripId::new(row.id),
            truck_id: UnitId::new(row.truck_id),
            trip_no: row.trip_no,
            trip_date: row.trip_date,
            opening_liters: row.opening_liters,
            opening_at: row.opening_at,
            closing_liters: row.closing_liters,
            closing_at: row.closing_at,
            driver_id: row.driver_id.map(DriverId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const TRIP_COLUMNS: &str = "id, truck_id, trip_no, trip_date, opening_liters, opening_at, \
     closing_liters, closing_at, driver_id, created_at, updated_at";

/// Get a trip by ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get<'e>(
    executor: impl PgExecutor<'e>,
    id: TripId,
) -> Result<Option<Trip>, RepositoryError> {
    let row = sqlx::query_as::<_, TripRow>(&format!(
        "SELECT {TRIP_COLUMNS} FROM fuelops.trip WHERE id = $1"
    ))
    .bind(id.as_i32())
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// Lock a trip row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the trip does not exist.
pub async fn lock(conn: &mut PgConnection, id: TripId) -> Result<Trip, RepositoryError> {
    let row = sqlx::query_as::<_, TripRow>(&format!(
        "SELECT {TRIP_COLUMNS} FROM fuelops.trip WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_i32())
    .fetch_optional(conn)
    .await?;

    row.map(Into::into).ok_or(RepositoryError::NotFound)
}

/// A truck's trips for one date, by trip number.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_day<'e>(
    executor: impl PgExecutor<'e>,
    truck_id: UnitId,
    date: NaiveDate,
) -> Result<Vec<Trip>, RepositoryError> {
    let rows = sqlx::query_as::<_, TripRow>(&format!(
        r"
        SELECT {TRIP_COLUMNS}
        FROM fuelops.trip
        WHERE truck_id = $1 AND trip_date = $2
        ORDER BY trip_no
        "
    ))
    .bind(truck_id.as_i32())
    .bind(date)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// A truck's trips from `from` to `to`, plus its last trip before `from`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_for_range(
    conn: &mut PgConnection,
    truck_id: UnitId,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Trip>, RepositoryError> {
    let rows = sqlx::query_as::<_, TripRow>(&format!(
        r"
        (
            SELECT {TRIP_COLUMNS}
            FROM fuelops.trip
            WHERE truck_id = $1 AND trip_date < $2
            ORDER BY trip_date DESC, trip_no DESC
            LIMIT 1
        )
        UNION ALL
        (
            SELECT {TRIP_COLUMNS}
            FROM fuelops.trip
            WHERE truck_id = $1 AND trip_date BETWEEN $2 AND $3
        )
        ORDER BY trip_date, trip_no
        "
    ))
    .bind(truck_id.as_i32())
    .bind(from)
    .bind(to)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Whether the truck has a trip that is opened but not closed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn has_unclosed_opening(
    conn: &mut PgConnection,
    truck_id: UnitId,
) -> Result<bool, RepositoryError> {
    let exists: bool = sqlx::query_scalar(
        r"
        SELECT EXISTS (
            SELECT 1 FROM fuelops.trip
            WHERE truck_id = $1 AND opening_liters IS NOT NULL AND closing_liters IS NULL
        )
        ",
    )
    .bind(truck_id.as_i32())
    .fetch_one(conn)
    .await?;

    Ok(exists)
}

/// Insert a trip.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the trip number was taken.
pub async fn insert(
    conn: &mut PgConnection,
    truck_id: UnitId,
    date: NaiveDate,
    trip_no: i32,
) -> Result<Trip, RepositoryError> {
    let row = sqlx::query_as::<_, TripRow>(&format!(
        r"
        INSERT INTO fuelops.trip (truck_id, trip_date, trip_no)
        VALUES ($1, $2, $3)
        RETURNING {TRIP_COLUMNS}
        "
    ))
    .bind(truck_id.as_i32())
    .bind(date)
    .bind(trip_no)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        map_constraint(e, "trip_number_unique", || {
            format!("trip {trip_no} for unit {truck_id} on {date} was created concurrently")
        })
    })?;

    Ok(row.into())
}

/// Persist a trip's readings and driver.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the trip does not exist.
pub async fn update_readings(conn: &mut PgConnection, trip: &Trip) -> Result<Trip, RepositoryError> {
    let row = sqlx::query_as::<_, TripRow>(&format!(
        r"
        UPDATE fuelops.trip
        SET opening_liters = $2,
            opening_at = $3,
            closing_liters = $4,
            closing_at = $5,
            driver_id = $6,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {TRIP_COLUMNS}
        "
    ))
    .bind(trip.id.as_i32())
    .bind(trip.opening_liters)
    .bind(trip.opening_at)
    .bind(trip.closing_liters)
    .bind(trip.closing_at)
    .bind(trip.driver_id.map(|id| id.as_i32()))
    .fetch_optional(conn)
    .await?;

    row.map(Into::into).ok_or(RepositoryError::NotFound)
}

/// Delete a trip row. Records attached to it keep their `trip_no`.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the trip does not exist.
pub async fn delete(conn: &mut PgConnection, id: TripId) -> Result<(), RepositoryError> {
    let result = sqlx::query("DELETE FROM fuelops.trip WHERE id = $1")
        .bind(id.as_i32())
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}
