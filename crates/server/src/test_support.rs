//! In-memory fakes and fixtures shared by the unit tests.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use uuid::Uuid;
use wiremock::MockServer;

use funnelkit_core::{Funnel, ProductGid};

use crate::config::AppConfig;
use crate::db::{CredentialStore, FunnelStore, RepositoryError, ShopCredentials};
use crate::shopify::ProductMetaClient;

/// A funnel fixture with both product ids given in any normalizable form.
pub fn funnel(shop: &str, trigger: &str, offer: &str, discount_pct: i32) -> Funnel {
    Funnel {
        id: Uuid::new_v4(),
        shop_domain: shop.to_string(),
        name: "Test funnel".to_string(),
        discount_pct,
        active: true,
        trigger_product: ProductGid::normalize(trigger).expect("valid trigger id"),
        offer_product: ProductGid::normalize(offer).expect("valid offer id"),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Config fixture pointing nowhere in particular.
pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: SecretString::from("postgres://localhost/test"),
        host: "127.0.0.1".parse().expect("valid ip"),
        port: 3000,
        app_url: "https://funnelkit.example".to_string(),
        api_version: "2024-07".to_string(),
        allowed_origins: vec![],
        sentry_dsn: None,
    }
}

/// Metadata client aimed at a wiremock server.
pub fn meta_client_for(server: &MockServer) -> ProductMetaClient {
    ProductMetaClient::with_base_override("2024-07", server.uri())
}

/// In-memory funnel store.
#[derive(Default)]
pub struct MemFunnelStore {
    funnels: Vec<Funnel>,
    error: Option<String>,
}

impl MemFunnelStore {
    pub fn with_funnels(funnels: Vec<Funnel>) -> Self {
        Self {
            funnels,
            error: None,
        }
    }

    /// A store whose every query fails with the given message.
    pub fn failing(message: &str) -> Self {
        Self {
            funnels: vec![],
            error: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl FunnelStore for MemFunnelStore {
    async fn active_funnels(&self, shop: &str) -> Result<Vec<Funnel>, RepositoryError> {
        if let Some(message) = &self.error {
            return Err(RepositoryError::DataCorruption(message.clone()));
        }
        let mut funnels: Vec<Funnel> = self
            .funnels
            .iter()
            .filter(|f| f.shop_domain == shop && f.active)
            .cloned()
            .collect();
        funnels.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(funnels)
    }
}

/// In-memory credential store.
pub struct MemCredentialStore {
    token: Option<String>,
}

impl MemCredentialStore {
    pub fn empty() -> Self {
        Self { token: None }
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }
}

#[async_trait]
impl CredentialStore for MemCredentialStore {
    async fn offline_credentials(
        &self,
        shop: &str,
    ) -> Result<Option<ShopCredentials>, RepositoryError> {
        Ok(self.token.as_ref().map(|token| ShopCredentials {
            shop: shop.to_string(),
            access_token: SecretString::from(token.clone()),
        }))
    }
}
