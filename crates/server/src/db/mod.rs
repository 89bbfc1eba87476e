//! Database operations for the funnel store `PostgreSQL`.
//!
//! ## Tables
//!
//! - `funnel` - Merchant-configured upsell rules. A partial unique index on
//!   `(shop_domain, trigger_product_gid) WHERE active` keeps at most one
//!   active funnel per trigger product; violations surface as
//!   [`RepositoryError::Conflict`], not a crash.
//! - `shopify_session` - Offline Admin API credentials written by the OAuth
//!   surface (out of scope here); this service only reads the newest offline
//!   row per shop.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p funnelkit-cli -- migrate
//! ```

pub mod funnels;
pub mod sessions;

pub use funnels::{FunnelStore, PgFunnelStore};
pub use sessions::{CredentialStore, PgCredentialStore, ShopCredentials};

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors returned by the repository layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate active trigger).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Input failed validation before reaching the database.
    #[error("validation: {0}")]
    Validation(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
