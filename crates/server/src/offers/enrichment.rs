//! Composing resolver, credentials, and metadata into a displayable offer.
//!
//! This is the request/response boundary exposed to the checkout extension.
//! Missing credentials or missing upstream metadata degrade the offer to its
//! stored identifier with null fields - the extension decides how to render
//! (or suppress) it. Nothing on this path raises past the handler.

use serde::Serialize;

use funnelkit_core::ProductGid;

use crate::db::{CredentialStore, FunnelStore};
use crate::offers::resolver::resolve_offer;
use crate::offers::trace::{MatchTrace, SessionTrace};
use crate::shopify::{ProductMeta, ProductMetaClient, VariantMeta};

/// The value returned to the buyer-facing extension for one offer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedOffer {
    pub id: ProductGid,
    pub title: Option<String>,
    pub image: Option<String>,
    pub images: Vec<String>,
    pub variant_id: Option<String>,
    pub variants: Vec<VariantMeta>,
    pub price: Option<String>,
    pub price_amount: Option<f64>,
    pub currency_code: Option<String>,
    pub discount_pct: i32,
}

/// Resolve and enrich the offer for one completed (or previewed) purchase.
///
/// Returns the offers to display (zero or one under the single-offer funnel
/// schema) plus the diagnostic trace for the response's `debug` payload.
pub async fn enrich(
    funnels: &dyn FunnelStore,
    credentials: &dyn CredentialStore,
    meta: &ProductMetaClient,
    shop: &str,
    raw_gids: &[String],
    via: &'static str,
) -> (Vec<EnrichedOffer>, MatchTrace) {
    let mut trace = MatchTrace {
        shop: Some(shop.to_string()),
        gids_raw: raw_gids.to_vec(),
        via: Some(via),
        ..MatchTrace::default()
    };

    let purchased = ProductGid::normalize_all(raw_gids.iter().map(String::as_str));
    trace.product_gids.clone_from(&purchased);

    let resolution = resolve_offer(funnels, shop, &purchased).await;
    trace.store_error = resolution.store_error;

    let Some(resolved) = resolution.offer else {
        trace.reason = Some("no-funnel");
        return (vec![], trace);
    };

    trace.funnel_id = Some(resolved.funnel_id);
    trace.resolution = Some(resolved.path.label());
    trace.offer_ids = vec![resolved.offer_product.clone()];

    // Credential lookup is best-effort: its absence degrades to "no
    // metadata available" rather than failing the call.
    let creds = match credentials.offline_credentials(shop).await {
        Ok(creds) => {
            trace.session = Some(SessionTrace {
                has_session: creds.is_some(),
                reason: creds.is_none().then(|| "no-offline-session".to_string()),
            });
            creds
        }
        Err(e) => {
            trace.session = Some(SessionTrace {
                has_session: false,
                reason: Some(e.to_string()),
            });
            None
        }
    };

    let offer_ids = [resolved.offer_product.clone()];
    let (by_id, fetch) = meta.fetch_meta(creds.as_ref(), &offer_ids).await;
    trace.fetched_keys = by_id.keys().cloned().collect();
    trace.fetch = Some(fetch);

    let meta = by_id.get(&resolved.offer_product);
    let offer = EnrichedOffer {
        id: resolved.offer_product.clone(),
        title: meta.map(|m| m.title.clone()),
        image: meta.and_then(|m| m.image.clone()),
        images: meta
            .and_then(|m| m.image.clone())
            .into_iter()
            .collect(),
        variant_id: meta.and_then(|m| m.variant_id.clone()),
        variants: meta.map(|m| m.variants.clone()).unwrap_or_default(),
        price: meta.and_then(ProductMeta::price_display),
        price_amount: meta.and_then(|m| m.price_amount),
        currency_code: meta.and_then(|m| m.currency_code.clone()),
        discount_pct: resolved.discount_pct,
    };

    (vec![offer], trace)
}
