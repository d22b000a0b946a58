//! Database migration command.
//!
//! # Environment Variables
//!
//! - `LIKENESS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! `crates/identity/migrations/`

use likeness_identity::config::database_url_from_env;
use likeness_identity::db;

use super::CommandError;

/// Apply the identity schema migrations.
///
/// # Errors
///
/// Returns `CommandError` if the URL is missing, the connection fails, or a
/// migration fails.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to identity database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running identity migrations...");
    db::migrate(&pool).await?;

    tracing::info!("Identity migrations complete");
    Ok(())
}
