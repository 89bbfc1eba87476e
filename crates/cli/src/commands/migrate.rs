//! Database migration command.
//!
//! Applies the migrations embedded from `crates/server/migrations/`.
//!
//! # Environment Variables
//!
//! - `FUNNELKIT_DATABASE_URL` - `PostgreSQL` connection string (falls back
//!   to `DATABASE_URL`)

use funnelkit_server::db::create_pool;

use super::{CommandError, database_url};

/// Run all pending migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration
/// fails to apply.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url()?;

    tracing::info!("Connecting to database...");
    let pool = create_pool(&database_url).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete");
    Ok(())
}
