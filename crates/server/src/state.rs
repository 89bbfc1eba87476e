//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::{CredentialStore, FunnelStore, PgCredentialStore, PgFunnelStore};
use crate::shopify::{ProductMetaClient, SigningClient};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. The funnel and credential stores are held as
/// trait objects so the resolution pipeline can run against injected fakes.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    funnels: Arc<dyn FunnelStore>,
    credentials: Arc<dyn CredentialStore>,
    meta: ProductMetaClient,
    signer: SigningClient,
}

impl AppState {
    /// Create application state backed by `PostgreSQL` stores.
    #[must_use]
    pub fn new(config: AppConfig, pool: PgPool) -> Self {
        let funnels = Arc::new(PgFunnelStore::new(pool.clone()));
        let credentials = Arc::new(PgCredentialStore::new(pool));
        let meta = ProductMetaClient::new(&config);
        let signer = SigningClient::new(&config);
        Self::with_components(config, funnels, credentials, meta, signer)
    }

    /// Assemble state from explicit collaborators.
    #[must_use]
    pub fn with_components(
        config: AppConfig,
        funnels: Arc<dyn FunnelStore>,
        credentials: Arc<dyn CredentialStore>,
        meta: ProductMetaClient,
        signer: SigningClient,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                funnels,
                credentials,
                meta,
                signer,
            }),
        }
    }

    /// Get a reference to the application configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get the funnel store.
    #[must_use]
    pub fn funnels(&self) -> &dyn FunnelStore {
        self.inner.funnels.as_ref()
    }

    /// Get the credential store.
    #[must_use]
    pub fn credentials(&self) -> &dyn CredentialStore {
        self.inner.credentials.as_ref()
    }

    /// Get the product metadata client.
    #[must_use]
    pub fn meta(&self) -> &ProductMetaClient {
        &self.inner.meta
    }

    /// Get the change-set signing client.
    #[must_use]
    pub fn signer(&self) -> &SigningClient {
        &self.inner.signer
    }
}
