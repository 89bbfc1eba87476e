//! Structured diagnostic trace for offer matching.
//!
//! Threaded explicitly through the resolver and enrichment pipeline as part
//! of their return values - never a global accumulator - so a response's
//! debug payload is reproducible from its inputs.

use serde::Serialize;
use uuid::Uuid;

use funnelkit_core::ProductGid;

use crate::shopify::FetchDiagnostic;

/// Diagnostic trail of one match request. Serialized as the `debug` field of
/// the match response; consumed by the extension for debugging only.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTrace {
    pub shop: Option<String>,
    /// Raw id inputs as received.
    pub gids_raw: Vec<String>,
    /// Normalized purchase set.
    pub product_gids: Vec<ProductGid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<&'static str>,
    /// Why no offer was produced, when none was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    /// `trigger-match` or `fallback-latest`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funnel_id: Option<Uuid>,
    pub offer_ids: Vec<ProductGid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchDiagnostic>,
    /// Ids for which metadata actually arrived.
    pub fetched_keys: Vec<ProductGid>,
}

/// What the credential lookup found.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTrace {
    pub has_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
