//! Database operations for meter snapshots.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::PgConnection;

use fuelops_core::stock::MeterSnapshot;
use fuelops_core::{Liters, MeterSnapshotId, UnitId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    id: i32,
    truck_id: i32,
    reading_liters: Liters,
    reading_at: NaiveDateTime,
    created_at: DateTime<Utc>,
}

impl From<SnapshotRow> for MeterSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: MeterSnapshotId::new(row.id),
            truck_id: UnitId::new(row.truck_id),
            reading_liters: row.reading_liters,
            reading_at: row.reading_at,
            created_at: row.created_at,
        }
    }
}

/// Record a snapshot.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert(
    conn: &mut PgConnection,
    truck_id: UnitId,
    reading_liters: Liters,
    reading_at: NaiveDateTime,
) -> Result<MeterSnapshot, RepositoryError> {
    let row = sqlx::query_as::<_, SnapshotRow>(
        r"
        INSERT INTO fuelops.meter_snapshot (truck_id, reading_liters, reading_at)
        VALUES ($1, $2, $3)
        RETURNING id, truck_id, reading_liters, reading_at, created_at
        ",
    )
    .bind(truck_id.as_i32())
    .bind(reading_liters)
    .bind(reading_at)
    .fetch_one(conn)
    .await?;

    Ok(row.into())
}

/// The latest snapshot of every unit that has one.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_latest(conn: &mut PgConnection) -> Result<Vec<MeterSnapshot>, RepositoryError> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        r"
        SELECT DISTINCT ON (truck_id)
               id, truck_id, reading_liters, reading_at, created_at
        FROM fuelops.meter_snapshot
        ORDER BY truck_id, reading_at DESC, id DESC
        ",
    )
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}
