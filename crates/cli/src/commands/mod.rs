//! CLI command implementations.

pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use thiserror::Error;

/// Errors shared by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Repository error: {0}")]
    Repository(#[from] funnelkit_server::db::RepositoryError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Resolve the database URL from the environment.
pub(crate) fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();

    std::env::var("FUNNELKIT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("FUNNELKIT_DATABASE_URL"))
}
