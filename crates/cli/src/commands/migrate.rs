//! Database migration command.
//!
//! Migrations live in `crates/server/migrations/` and are embedded at build
//! time, so the binary applies the schema it was built against.

use super::{CommandError, connect};

/// Apply pending ledger migrations.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running ledger migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Ledger migrations complete!");
    Ok(())
}
