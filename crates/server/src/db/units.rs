//! Database operations for storage units.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};

use fuelops_core::unit::{NewUnit, Unit, UnitPatch};
use fuelops_core::{UnitId, UnitType};

use super::{RepositoryError, map_constraint};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UnitRow {
    id: i32,
    unit_code: String,
    unit_type: UnitType,
    vehicle_number: Option<String>,
    capacity_liters: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UnitRow> for Unit {
    fn from(row: UnitRow) -> Self {
        Self {
            id: UnitId::new(row.id),
            unit_code: row.unit_code,
            unit_type: row.unit_type,
            vehicle_number: row.vehicle_number,
            capacity_liters: row.capacity_liters,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const UNIT_COLUMNS: &str =
    "id, unit_code, unit_type, vehicle_number, capacity_liters, active, created_at, updated_at";

fn duplicate_code(code: &str) -> impl FnOnce() -> String + '_ {
    move || format!("unit code {code} already exists")
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for unit registry operations.
pub struct UnitRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UnitRepository<'a> {
    /// Create a new unit repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Register a unit.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the unit code already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, input: &NewUnit) -> Result<Unit, RepositoryError> {
        let row = sqlx::query_as::<_, UnitRow>(&format!(
            r"
            INSERT INTO fuelops.unit (unit_code, unit_type, capacity_liters, vehicle_number)
            VALUES ($1, $2, $3, $4)
            RETURNING {UNIT_COLUMNS}
            "
        ))
        .bind(&input.unit_code)
        .bind(input.unit_type)
        .bind(input.capacity_liters)
        .bind(&input.vehicle_number)
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_constraint(e, "unit_code_unique", duplicate_code(&input.unit_code)))?;

        Ok(row.into())
    }

    /// Get a unit by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: UnitId) -> Result<Option<Unit>, RepositoryError> {
        get(self.pool, id).await
    }

    /// List units, optionally filtered by type, ordered by code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, unit_type: Option<UnitType>) -> Result<Vec<Unit>, RepositoryError> {
        let rows = sqlx::query_as::<_, UnitRow>(&format!(
            r"
            SELECT {UNIT_COLUMNS}
            FROM fuelops.unit
            WHERE ($1::fuelops.unit_type IS NULL OR unit_type = $1)
            ORDER BY unit_code
            "
        ))
        .bind(unit_type)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Get a unit by ID with any executor.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get<'e>(
    executor: impl PgExecutor<'e>,
    id: UnitId,
) -> Result<Option<Unit>, RepositoryError> {
    let row = sqlx::query_as::<_, UnitRow>(&format!(
        "SELECT {UNIT_COLUMNS} FROM fuelops.unit WHERE id = $1"
    ))
    .bind(id.as_i32())
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// List active units ordered by code.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list_active(conn: &mut PgConnection) -> Result<Vec<Unit>, RepositoryError> {
    let rows = sqlx::query_as::<_, UnitRow>(&format!(
        "SELECT {UNIT_COLUMNS} FROM fuelops.unit WHERE active ORDER BY unit_code"
    ))
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Lock unit rows for the rest of the transaction, in ascending id order.
///
/// Every writer takes unit locks through this function, so two writers that
/// touch the same pair of units always lock them in the same order.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if any of the units does not exist.
pub async fn lock_units(
    conn: &mut PgConnection,
    ids: &[UnitId],
) -> Result<Vec<Unit>, RepositoryError> {
    let mut keys: Vec<i32> = ids.iter().map(UnitId::as_i32).collect();
    keys.sort_unstable();
    keys.dedup();

    let rows = sqlx::query_as::<_, UnitRow>(&format!(
        r"
        SELECT {UNIT_COLUMNS}
        FROM fuelops.unit
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "
    ))
    .bind(keys.as_slice())
    .fetch_all(&mut *conn)
    .await?;

    if rows.len() != keys.len() {
        return Err(RepositoryError::NotFound);
    }
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Set a unit's active flag.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the unit does not exist.
pub async fn set_active(
    conn: &mut PgConnection,
    id: UnitId,
    active: bool,
) -> Result<Unit, RepositoryError> {
    let row = sqlx::query_as::<_, UnitRow>(&format!(
        r"
        UPDATE fuelops.unit
        SET active = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING {UNIT_COLUMNS}
        "
    ))
    .bind(id.as_i32())
    .bind(active)
    .fetch_optional(conn)
    .await?;

    row.map(Into::into).ok_or(RepositoryError::NotFound)
}

/// Apply a validated patch. Absent fields keep their value.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the unit does not exist.
/// Returns `RepositoryError::Conflict` if the new code is taken.
pub async fn update(
    conn: &mut PgConnection,
    id: UnitId,
    patch: &UnitPatch,
) -> Result<Unit, RepositoryError> {
    let code = patch.unit_code.as_deref().unwrap_or_default();
    let row = sqlx::query_as::<_, UnitRow>(&format!(
        r"
        UPDATE fuelops.unit
        SET unit_code = COALESCE($2, unit_code),
            capacity_liters = COALESCE($3, capacity_liters),
            vehicle_number = COALESCE($4, vehicle_number),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {UNIT_COLUMNS}
        "
    ))
    .bind(id.as_i32())
    .bind(&patch.unit_code)
    .bind(patch.capacity_liters)
    .bind(&patch.vehicle_number)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_constraint(e, "unit_code_unique", duplicate_code(code)))?;

    row.map(Into::into).ok_or(RepositoryError::NotFound)
}
