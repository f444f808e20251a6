//! CLI subcommands.

pub mod migrate;
pub mod unit;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

/// Connections the CLI opens; one command runs at a time.
const CLI_MAX_CONNECTIONS: u32 = 2;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The ledger rejected the command.
    #[error("{0}")]
    Ledger(#[from] fuelops_server::services::ServiceError),
}

/// Connect to the ledger database named by `FUELOPS_DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("FUELOPS_DATABASE_URL")
        .map_err(|_| CommandError::MissingEnvVar("FUELOPS_DATABASE_URL"))?;

    tracing::info!("Connecting to ledger database...");
    Ok(fuelops_server::db::create_pool(&SecretString::from(database_url), CLI_MAX_CONNECTIONS).await?)
}
