//! Shopify upstream clients.
//!
//! # Architecture
//!
//! Two independent clients, both built from the process-wide [`AppConfig`]
//! and both with bounded request timeouts:
//!
//! - [`meta::ProductMetaClient`] - read-only product metadata for offer
//!   enrichment. Admin GraphQL `nodes(ids:)` batch query first, REST product
//!   listing as a fallback. Failures degrade to empty metadata plus a
//!   diagnostic; they never fail the buyer-facing call.
//! - [`signing::SigningClient`] - obtains a buyer-authorized change-set
//!   token by probing an ordered list of checkout endpoints. Failures here
//!   are classified and surfaced; a failed signing must never silently drop
//!   the buyer's accepted offer.
//!
//! [`AppConfig`]: crate::config::AppConfig

pub mod meta;
pub mod signing;

pub use meta::{FetchDiagnostic, FetchKind, ProductMeta, ProductMetaClient, VariantMeta};
pub use signing::{RawChange, SignError, Signed, SigningClient, UpstreamReason};

use std::time::Duration;

/// Bound on every upstream request.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(12);
