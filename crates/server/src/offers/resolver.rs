//! Matching a purchase against the shop's active funnels.

use std::collections::HashSet;

use tracing::warn;
use uuid::Uuid;

use funnelkit_core::{Funnel, ProductGid};

use crate::db::FunnelStore;

/// How the resolved funnel was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPath {
    /// A trigger product in the purchase matched the funnel.
    TriggerMatch,
    /// No trigger matched (or no purchase context was supplied); the shop's
    /// most recently updated active funnel was substituted. A deliberate
    /// degraded mode for previews, always distinguishable in the trace.
    FallbackLatest,
}

impl ResolutionPath {
    /// Stable label used in the response trace.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TriggerMatch => "trigger-match",
            Self::FallbackLatest => "fallback-latest",
        }
    }
}

/// The funnel the purchase resolved to.
#[derive(Debug, Clone)]
pub struct ResolvedOffer {
    pub funnel_id: Uuid,
    pub offer_product: ProductGid,
    pub discount_pct: i32,
    pub path: ResolutionPath,
}

/// Outcome of a resolution attempt. A store failure is reported here and
/// treated as "no funnel found" rather than aborting the request.
#[derive(Debug, Default)]
pub struct Resolution {
    pub offer: Option<ResolvedOffer>,
    pub store_error: Option<String>,
}

/// Find the single active funnel that applies to this purchase.
///
/// The purchase set is expected to be normalized (§`ProductGid`); stored
/// trigger ids are normalized on read, so matching is canonical-to-canonical
/// regardless of how the trigger was stored. When several active funnels
/// match, the most recently updated wins.
pub async fn resolve_offer(
    store: &dyn FunnelStore,
    shop: &str,
    purchased: &[ProductGid],
) -> Resolution {
    let funnels = match store.active_funnels(shop).await {
        Ok(funnels) => funnels,
        Err(e) => {
            warn!(shop = %shop, error = %e, "funnel store query failed");
            return Resolution {
                offer: None,
                store_error: Some(e.to_string()),
            };
        }
    };

    let purchased_set: HashSet<&ProductGid> = purchased.iter().collect();

    let matched = funnels
        .iter()
        .filter(|f| purchased_set.contains(&f.trigger_product))
        .max_by_key(|f| f.updated_at);

    let (funnel, path) = match matched {
        Some(funnel) => (Some(funnel), ResolutionPath::TriggerMatch),
        None => (
            funnels.iter().max_by_key(|f| f.updated_at),
            ResolutionPath::FallbackLatest,
        ),
    };

    Resolution {
        offer: funnel.map(|f| to_resolved(f, path)),
        store_error: None,
    }
}

fn to_resolved(funnel: &Funnel, path: ResolutionPath) -> ResolvedOffer {
    ResolvedOffer {
        funnel_id: funnel.id,
        offer_product: funnel.offer_product.clone(),
        discount_pct: funnel.discount_pct,
        path,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{MemFunnelStore, funnel};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_no_funnels_resolves_to_none() {
        let store = MemFunnelStore::default();
        let purchased = ProductGid::normalize_all(["1"]);

        let resolution = resolve_offer(&store, "demo.example", &purchased).await;

        assert!(resolution.offer.is_none());
        assert!(resolution.store_error.is_none());
    }

    #[tokio::test]
    async fn test_trigger_match_selects_most_recently_updated() {
        let now = Utc::now();
        let mut older = funnel("demo.example", "1", "2", 10);
        older.updated_at = now - Duration::hours(2);
        let mut newer = funnel("demo.example", "1", "3", 25);
        newer.updated_at = now;
        let newer_id = newer.id;

        let store = MemFunnelStore::with_funnels(vec![older, newer]);
        let purchased = ProductGid::normalize_all(["1"]);

        let resolution = resolve_offer(&store, "demo.example", &purchased).await;
        let offer = resolution.offer.unwrap();

        assert_eq!(offer.funnel_id, newer_id);
        assert_eq!(offer.discount_pct, 25);
        assert_eq!(offer.path, ResolutionPath::TriggerMatch);
        assert_eq!(offer.offer_product.as_str(), "gid://shopify/Product/3");
    }

    #[tokio::test]
    async fn test_no_trigger_match_falls_back_to_latest() {
        let store =
            MemFunnelStore::with_funnels(vec![funnel("demo.example", "1", "2", 20)]);
        let purchased = ProductGid::normalize_all(["99"]);

        let resolution = resolve_offer(&store, "demo.example", &purchased).await;
        let offer = resolution.offer.unwrap();

        assert_eq!(offer.path, ResolutionPath::FallbackLatest);
    }

    #[tokio::test]
    async fn test_empty_purchase_set_falls_back_to_latest() {
        let store =
            MemFunnelStore::with_funnels(vec![funnel("demo.example", "1", "2", 20)]);

        let resolution = resolve_offer(&store, "demo.example", &[]).await;

        assert_eq!(
            resolution.offer.unwrap().path,
            ResolutionPath::FallbackLatest
        );
    }

    #[tokio::test]
    async fn test_inactive_funnels_are_ignored() {
        let mut inactive = funnel("demo.example", "1", "2", 20);
        inactive.active = false;
        let store = MemFunnelStore::with_funnels(vec![inactive]);
        let purchased = ProductGid::normalize_all(["1"]);

        let resolution = resolve_offer(&store, "demo.example", &purchased).await;

        assert!(resolution.offer.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_is_absorbed() {
        let store = MemFunnelStore::failing("connection refused");
        let purchased = ProductGid::normalize_all(["1"]);

        let resolution = resolve_offer(&store, "demo.example", &purchased).await;

        assert!(resolution.offer.is_none());
        assert!(
            resolution
                .store_error
                .as_deref()
                .is_some_and(|e| e.contains("connection refused"))
        );
    }
}
