//! Database operations for drivers.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use fuelops_core::DriverId;
use fuelops_core::driver::{Driver, DriverPatch, NewDriver};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct DriverRow {
    id: i32,
    name: String,
    phone: Option<String>,
    license_no: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DriverRow> for Driver {
    fn from(row: DriverRow) -> Self {
        Self {
            id: DriverId::new(row.id),
            name: row.name,
            phone: row.phone,
            license_no: row.license_no,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for driver records.
pub struct DriverRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DriverRepository<'a> {
    /// Create a new driver repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a driver.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(&self, input: &NewDriver) -> Result<Driver, RepositoryError> {
        let row = sqlx::query_as::<_, DriverRow>(
            r"
            INSERT INTO fuelops.driver (name, phone, license_no)
            VALUES ($1, $2, $3)
            RETURNING id, name, phone, license_no, active, created_at, updated_at
            ",
        )
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.license_no)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// List drivers ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, active_only: bool) -> Result<Vec<Driver>, RepositoryError> {
        let rows = sqlx::query_as::<_, DriverRow>(
            r"
            SELECT id, name, phone, license_no, active, created_at, updated_at
            FROM fuelops.driver
            WHERE active OR NOT $1
            ORDER BY name, id
            ",
        )
        .bind(active_only)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Apply a validated patch.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the driver does not exist.
    pub async fn update(&self, id: DriverId, patch: &DriverPatch) -> Result<Driver, RepositoryError> {
        let row = sqlx::query_as::<_, DriverRow>(
            r"
            UPDATE fuelops.driver
            SET name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                license_no = COALESCE($4, license_no),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, phone, license_no, active, created_at, updated_at
            ",
        )
        .bind(id.as_i32())
        .bind(&patch.name)
        .bind(&patch.phone)
        .bind(&patch.license_no)
        .fetch_optional(self.pool)
        .await?;

        row.map(Into::into).ok_or(RepositoryError::NotFound)
    }

    /// Deactivate a driver. Drivers are never deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the driver does not exist.
    pub async fn deactivate(&self, id: DriverId) -> Result<Driver, RepositoryError> {
        let row = sqlx::query_as::<_, DriverRow>(
            r"
            UPDATE fuelops.driver
            SET active = FALSE, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, phone, license_no, active, created_at, updated_at
            ",
        )
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(Into::into).ok_or(RepositoryError::NotFound)
    }
}

/// Whether an active driver with this ID exists.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn is_active<'e>(
    executor: impl PgExecutor<'e>,
    id: DriverId,
) -> Result<bool, RepositoryError> {
    let active: Option<bool> = sqlx::query_scalar("SELECT active FROM fuelops.driver WHERE id = $1")
        .bind(id.as_i32())
        .fetch_optional(executor)
        .await?;

    Ok(active.unwrap_or(false))
}
