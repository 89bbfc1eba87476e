//! Offline Admin API credential lookup.
//!
//! The OAuth install flow (out of scope here) persists one session row per
//! grant in `shopify_session`. Metadata enrichment only ever needs the
//! newest *offline* row for a shop: a long-lived Admin API token that is not
//! tied to a staff member's browser session.

use async_trait::async_trait;
use secrecy::SecretString;
use sqlx::PgPool;

use super::RepositoryError;

/// An authorization context for one shop's Admin API.
#[derive(Debug, Clone)]
pub struct ShopCredentials {
    /// Shop domain the token was issued for (also the API base host).
    pub shop: String,
    /// Offline Admin API access token.
    pub access_token: SecretString,
}

/// Lookup of offline Admin API credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The newest offline credentials for the shop, if any were ever issued.
    async fn offline_credentials(
        &self,
        shop: &str,
    ) -> Result<Option<ShopCredentials>, RepositoryError>;
}

/// `PostgreSQL`-backed credential lookup.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new credential store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an offline credential row (used by seeding tooling).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn insert_offline(
        &self,
        shop: &str,
        access_token: &str,
        scope: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO shopify_session (shop, access_token, is_online, scope) \
             VALUES ($1, $2, FALSE, $3)",
        )
        .bind(shop)
        .bind(access_token)
        .bind(scope)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn offline_credentials(
        &self,
        shop: &str,
    ) -> Result<Option<ShopCredentials>, RepositoryError> {
        let token = sqlx::query_scalar::<_, String>(
            "SELECT access_token FROM shopify_session \
             WHERE shop = $1 AND is_online = FALSE \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(shop)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token.map(|access_token| ShopCredentials {
            shop: shop.to_string(),
            access_token: SecretString::from(access_token),
        }))
    }
}
