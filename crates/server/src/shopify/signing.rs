//! Change-set signing against the platform checkout API.
//!
//! Obtains a platform-issued token authorizing a mutation to an already
//! placed order, on behalf of the buyer, using the short-lived buyer token
//! from the post-purchase extension (never the merchant's Admin credential).
//!
//! The correct endpoint shape is not knowable in advance: it varies by shop
//! plan, checkout generation, and rollout stage. The client therefore probes
//! an ordered, data-driven list of (origin, path, body-shape) candidates and
//! stops at the first definite answer. A 404 means "not here, try the next
//! one"; any other failure is terminal and classified. This is a discovery
//! probe, not a retry policy - nothing is ever retried.

use std::fmt;

use reqwest::StatusCode;
use reqwest::header::LOCATION;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use funnelkit_core::parse_trailing_id;

use crate::config::AppConfig;

use super::UPSTREAM_TIMEOUT;

/// Canonical checkout host presented upstream when the caller's origin is a
/// CDN host.
const CHECKOUT_HOST: &str = "checkout.shopify.com";

/// Payment subdomain, tried first.
const PAYMENT_HOST: &str = "pay.shopify.com";

/// Largest error-body fragment echoed back to the extension.
const RAW_BODY_LIMIT: usize = 400;

// =============================================================================
// Inputs
// =============================================================================

/// One change entry as received from the extension, before normalization.
/// Extensions are inconsistent about field casing and id shapes.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChange {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, alias = "variantId")]
    pub variant_id: Option<serde_json::Value>,
    #[serde(default)]
    pub quantity: Option<serde_json::Value>,
}

/// One buyer-approved mutation in the fixed wire shape the platform expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    pub variant_id: u64,
    pub quantity: u32,
}

/// Normalize raw change entries to the wire shape.
///
/// Variant references may be numeric or gid strings; quantity defaults to 1
/// and is clamped to at least 1.
fn normalize_changes(raw: &[RawChange]) -> Result<Vec<ChangeRequest>, SignError> {
    raw.iter()
        .map(|change| {
            if change.kind != "add_variant" {
                return Err(SignError::BadRequest(format!(
                    "unsupported change type: {}",
                    change.kind
                )));
            }
            let variant_id = change
                .variant_id
                .as_ref()
                .and_then(value_to_id)
                .ok_or_else(|| SignError::BadRequest("unparseable variant id".to_string()))?;
            let quantity = change
                .quantity
                .as_ref()
                .and_then(value_to_id)
                .map_or(1, |q| q.max(1));
            #[allow(clippy::cast_possible_truncation)]
            let quantity = quantity.min(u64::from(u32::MAX)) as u32;
            Ok(ChangeRequest {
                kind: "add_variant",
                variant_id,
                quantity,
            })
        })
        .collect()
}

fn value_to_id(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => parse_trailing_id(s),
        _ => None,
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Successful signing: the opaque change-set token plus the probe trail.
#[derive(Debug, Clone)]
pub struct Signed {
    pub changeset: String,
    /// Every URL attempted, in order, for diagnostics.
    pub tried: Vec<String>,
}

/// Classified reason for a terminal upstream rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamReason {
    UnauthorizedToken,
    Forbidden,
    PasswordRedirect,
    Unprocessable,
    ServerError,
    MissingToken,
    Other,
}

impl UpstreamReason {
    /// Stable identifier used in failure response bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnauthorizedToken => "unauthorized_buyer_token",
            Self::Forbidden => "forbidden",
            Self::PasswordRedirect => "password_redirect",
            Self::Unprocessable => "unprocessable",
            Self::ServerError => "upstream_error",
            Self::MissingToken => "no_changeset_token_in_response",
            Self::Other => "shopify_calculate_failed",
        }
    }
}

impl fmt::Display for UpstreamReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal signing failures. None of these are retried.
#[derive(Debug, Error)]
pub enum SignError {
    /// No buyer token was presented.
    #[error("missing bearer token")]
    MissingAuthorization,

    /// Shop, reference id, or changes failed validation.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller's origin is not on the allow-list.
    #[error("origin not allowed: {0}")]
    ForbiddenOrigin(String),

    /// The platform answered with a definite, non-404 failure.
    #[error("upstream rejected change-set: {reason}")]
    Upstream {
        reason: UpstreamReason,
        status: Option<u16>,
        data: Option<serde_json::Value>,
        tried: Vec<String>,
    },

    /// Every candidate endpoint answered 404.
    #[error("all signing endpoints returned not-found")]
    Exhausted { tried: Vec<String> },

    /// A network-level failure (timeout, DNS, connection reset).
    #[error("network failure during signing: {cause}")]
    Network { cause: String, tried: Vec<String> },
}

// =============================================================================
// Candidates
// =============================================================================

/// How the request body is shaped for a given path spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyShape {
    /// The reference id travels in the body (unstable path spellings).
    ReferenceInBody,
    /// The reference id is embedded in the path; the body carries changes
    /// only.
    ChangesOnly,
}

/// One endpoint shape to try.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SigningCandidate {
    url: String,
    body: BodyShape,
}

/// Build the ordered candidate list: payment subdomain, checkout subdomain,
/// the caller's (canonicalized) origin, and the shop's own domain as last
/// resort - each with every historical path spelling.
fn candidate_urls(
    shop: &str,
    reference_id: &str,
    checkout_origin: Option<&str>,
) -> Vec<SigningCandidate> {
    let mut origins = vec![
        format!("https://{PAYMENT_HOST}"),
        format!("https://{CHECKOUT_HOST}"),
    ];
    if let Some(origin) = checkout_origin {
        origins.push(origin.trim_end_matches('/').to_string());
    }
    origins.push(format!("https://{shop}"));
    dedup_preserving_order(&mut origins);

    let mut candidates = Vec::new();
    for origin in &origins {
        candidates.push(SigningCandidate {
            url: format!("{origin}/checkouts/unstable/changesets/calculate"),
            body: BodyShape::ReferenceInBody,
        });
        candidates.push(SigningCandidate {
            url: format!("{origin}/checkouts/unstable/changesets/calculate.json"),
            body: BodyShape::ReferenceInBody,
        });
        candidates.push(SigningCandidate {
            url: format!("{origin}/checkouts/{reference_id}/changesets/calculate.json"),
            body: BodyShape::ChangesOnly,
        });
        candidates.push(SigningCandidate {
            url: format!("{origin}/checkouts/{reference_id}/changesets/calculate"),
            body: BodyShape::ChangesOnly,
        });
    }
    candidates
}

fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

/// Canonicalize the caller-supplied checkout origin: CDN hosts are rewritten
/// to the platform's checkout host, everything else is reduced to
/// protocol + host.
fn canonicalize_checkout_origin(origin: &str) -> Option<String> {
    let url = Url::parse(origin).ok()?;
    let host = url.host_str()?;
    if host == "cdn.shopify.com" || host.ends_with(".shopifycdn.com") || host.starts_with("cdn.") {
        return Some(format!("https://{CHECKOUT_HOST}"));
    }
    match url.port() {
        Some(port) => Some(format!("{}://{host}:{port}", url.scheme())),
        None => Some(format!("{}://{host}", url.scheme())),
    }
}

// =============================================================================
// Attempt records
// =============================================================================

/// Internal record of one (origin, path) attempt, retained for diagnostics
/// and discarded after the request completes.
#[derive(Debug)]
struct SigningAttempt {
    url: String,
    status: Option<u16>,
    body_parsed: bool,
    outcome: &'static str,
}

// =============================================================================
// SigningClient
// =============================================================================

/// Client for the platform's checkout change-set endpoint.
#[derive(Clone)]
pub struct SigningClient {
    client: reqwest::Client,
    allowed_origins: Vec<String>,
    app_origin: Option<String>,
}

impl SigningClient {
    /// Create a new signing client.
    ///
    /// Redirects are disabled so a storefront password page shows up as a
    /// classifiable 3xx instead of an opaque HTML body.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(UPSTREAM_TIMEOUT)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_default(),
            allowed_origins: config.allowed_origins.clone(),
            app_origin: canonicalize_checkout_origin(&config.app_url),
        }
    }

    /// Whether a caller origin may invoke the signing endpoint: explicit
    /// allow-list entries, any platform subdomain, or the app's own origin.
    #[must_use]
    pub fn origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        if self.allowed_origins.iter().any(|o| o == origin) {
            return true;
        }
        if self.app_origin.as_deref() == Some(origin) {
            return true;
        }
        let Some(host) = Url::parse(origin).ok().and_then(|u| u.host_str().map(String::from))
        else {
            return false;
        };
        host.ends_with(".myshopify.com") || host.ends_with(".shopify.com") || host == "shopify.com"
    }

    /// Obtain a signed change-set token for the given order mutation.
    ///
    /// `origin` is the caller's `Origin` header (checked against the
    /// allow-list before any network traffic); `checkout_origin` is the
    /// checkout origin reported by the extension, used as one of the probe
    /// candidates.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SignError`]; the `tried` list of every URL
    /// attempted is carried on all upstream variants.
    #[instrument(skip_all, fields(shop = %shop, reference_id = %reference_id))]
    pub async fn sign(
        &self,
        shop: &str,
        reference_id: &str,
        buyer_token: Option<&str>,
        changes: &[RawChange],
        origin: Option<&str>,
        checkout_origin: Option<&str>,
    ) -> Result<Signed, SignError> {
        let token = buyer_token
            .filter(|t| !t.is_empty())
            .ok_or(SignError::MissingAuthorization)?;
        if shop.is_empty() || reference_id.is_empty() {
            return Err(SignError::BadRequest(
                "shop and referenceId are required".to_string(),
            ));
        }
        if changes.is_empty() {
            return Err(SignError::BadRequest(
                "changes must be a non-empty array".to_string(),
            ));
        }
        let changes = normalize_changes(changes)?;

        // Allow-list check happens before any upstream call. An absent
        // origin header is permitted through (server-to-server callers).
        if let Some(origin) = origin.filter(|o| !o.is_empty()) {
            if !self.origin_allowed(origin) {
                warn!(origin = %origin, "rejected signing request from disallowed origin");
                return Err(SignError::ForbiddenOrigin(origin.to_string()));
            }
        }

        let canonical_origin = checkout_origin
            .or(origin)
            .and_then(canonicalize_checkout_origin);
        let candidates = candidate_urls(shop, reference_id, canonical_origin.as_deref());

        let (result, attempts) = self.probe(&candidates, reference_id, token, &changes).await;
        debug!(attempts = ?attempts, "change-set signing finished");
        result
    }

    /// Walk the candidate list in order. Strictly sequential: an early
    /// success must short-circuit the remaining calls and a terminal failure
    /// must not be masked by later candidates.
    async fn probe(
        &self,
        candidates: &[SigningCandidate],
        reference_id: &str,
        token: &str,
        changes: &[ChangeRequest],
    ) -> (Result<Signed, SignError>, Vec<SigningAttempt>) {
        let mut tried = Vec::new();
        let mut attempts = Vec::new();

        for candidate in candidates {
            tried.push(candidate.url.clone());

            let body = match candidate.body {
                BodyShape::ReferenceInBody => serde_json::json!({
                    "referenceId": reference_id,
                    "changes": changes,
                }),
                BodyShape::ChangesOnly => serde_json::json!({ "changes": changes }),
            };

            let response = self
                .client
                .post(&candidate.url)
                .bearer_auth(token)
                .header("Accept", "application/json")
                .header("Cache-Control", "no-store")
                .header("Shopify-Checkout-Reference-Id", reference_id)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let cause = describe_network_error(&e);
                    attempts.push(SigningAttempt {
                        url: candidate.url.clone(),
                        status: None,
                        body_parsed: false,
                        outcome: "network-error",
                    });
                    return (Err(SignError::Network { cause, tried }), attempts);
                }
            };

            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                // This path/origin doesn't exist here; advance.
                attempts.push(SigningAttempt {
                    url: candidate.url.clone(),
                    status: Some(status.as_u16()),
                    body_parsed: false,
                    outcome: "not-found",
                });
                continue;
            }

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                let reason = if location.contains("password") {
                    UpstreamReason::PasswordRedirect
                } else {
                    UpstreamReason::Other
                };
                attempts.push(SigningAttempt {
                    url: candidate.url.clone(),
                    status: Some(status.as_u16()),
                    body_parsed: false,
                    outcome: reason.as_str(),
                });
                return (
                    Err(SignError::Upstream {
                        reason,
                        status: Some(status.as_u16()),
                        data: None,
                        tried,
                    }),
                    attempts,
                );
            }

            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    let cause = describe_network_error(&e);
                    attempts.push(SigningAttempt {
                        url: candidate.url.clone(),
                        status: Some(status.as_u16()),
                        body_parsed: false,
                        outcome: "network-error",
                    });
                    return (Err(SignError::Network { cause, tried }), attempts);
                }
            };
            let data: Option<serde_json::Value> = serde_json::from_str(&text).ok();

            if status.is_success() {
                let changeset = data
                    .as_ref()
                    .and_then(|d| d.get("token").or_else(|| d.get("changeset")))
                    .and_then(serde_json::Value::as_str);
                if let Some(changeset) = changeset {
                    attempts.push(SigningAttempt {
                        url: candidate.url.clone(),
                        status: Some(status.as_u16()),
                        body_parsed: true,
                        outcome: "success",
                    });
                    return (
                        Ok(Signed {
                            changeset: changeset.to_string(),
                            tried,
                        }),
                        attempts,
                    );
                }
                attempts.push(SigningAttempt {
                    url: candidate.url.clone(),
                    status: Some(status.as_u16()),
                    body_parsed: data.is_some(),
                    outcome: UpstreamReason::MissingToken.as_str(),
                });
                return (
                    Err(SignError::Upstream {
                        reason: UpstreamReason::MissingToken,
                        status: Some(status.as_u16()),
                        data,
                        tried,
                    }),
                    attempts,
                );
            }

            // Any other non-2xx answer is a definite failure from an
            // endpoint that exists; classify and stop.
            let reason = classify_status(status);
            attempts.push(SigningAttempt {
                url: candidate.url.clone(),
                status: Some(status.as_u16()),
                body_parsed: data.is_some(),
                outcome: reason.as_str(),
            });
            let data = data.or_else(|| {
                (!text.is_empty()).then(|| {
                    serde_json::json!({ "raw": text.chars().take(RAW_BODY_LIMIT).collect::<String>() })
                })
            });
            return (
                Err(SignError::Upstream {
                    reason,
                    status: Some(status.as_u16()),
                    data,
                    tried,
                }),
                attempts,
            );
        }

        (Err(SignError::Exhausted { tried }), attempts)
    }
}

fn classify_status(status: StatusCode) -> UpstreamReason {
    match status.as_u16() {
        401 => UpstreamReason::UnauthorizedToken,
        403 => UpstreamReason::Forbidden,
        422 => UpstreamReason::Unprocessable,
        500..=599 => UpstreamReason::ServerError,
        _ => UpstreamReason::Other,
    }
}

/// A short, redacted description of a transport failure: its classification
/// and message, never a stack.
fn describe_network_error(e: &reqwest::Error) -> String {
    let class = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_request() {
        "request"
    } else {
        "transport"
    };
    format!("{class}: {e}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> AppConfig {
        AppConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            app_url: "https://funnelkit.example".to_string(),
            api_version: "2024-07".to_string(),
            allowed_origins: vec!["https://partner.example".to_string()],
            sentry_dsn: None,
        }
    }

    fn add_variant(id: serde_json::Value, quantity: Option<serde_json::Value>) -> RawChange {
        RawChange {
            kind: "add_variant".to_string(),
            variant_id: Some(id),
            quantity,
        }
    }

    fn candidates_for(server: &MockServer, paths: &[&str]) -> Vec<SigningCandidate> {
        paths
            .iter()
            .map(|p| SigningCandidate {
                url: format!("{}{p}", server.uri()),
                body: BodyShape::ReferenceInBody,
            })
            .collect()
    }

    #[test]
    fn test_normalize_changes_parses_gid_variants() {
        let changes = normalize_changes(&[add_variant(
            serde_json::json!("gid://shopify/ProductVariant/555"),
            None,
        )])
        .unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].variant_id, 555);
        assert_eq!(changes[0].quantity, 1);

        // The wire shape the platform expects: bare integer variant_id.
        let wire = serde_json::to_value(&changes[0]).unwrap();
        assert_eq!(
            wire,
            serde_json::json!({ "type": "add_variant", "variant_id": 555, "quantity": 1 })
        );
    }

    #[test]
    fn test_normalize_changes_clamps_quantity() {
        let changes =
            normalize_changes(&[add_variant(serde_json::json!(555), Some(serde_json::json!(0)))])
                .unwrap();
        assert_eq!(changes[0].quantity, 1);
    }

    #[test]
    fn test_normalize_changes_rejects_unparseable_variant() {
        let result = normalize_changes(&[add_variant(serde_json::json!("no-digits"), None)]);
        assert!(matches!(result, Err(SignError::BadRequest(_))));
    }

    #[test]
    fn test_candidate_urls_order_and_dedup() {
        let candidates =
            candidate_urls("demo.myshopify.com", "ref-1", Some("https://checkout.shopify.com"));

        // Three distinct origins (the caller origin collapses into the
        // checkout host), four path spellings each.
        assert_eq!(candidates.len(), 12);
        assert!(
            candidates[0]
                .url
                .starts_with("https://pay.shopify.com/checkouts/unstable/")
        );
        assert!(candidates[4].url.starts_with("https://checkout.shopify.com/"));
        assert!(candidates[8].url.starts_with("https://demo.myshopify.com/"));
        assert!(candidates.iter().any(|c| c.url.contains("/checkouts/ref-1/")));
    }

    #[test]
    fn test_canonicalize_checkout_origin() {
        assert_eq!(
            canonicalize_checkout_origin("https://cdn.shopify.com").as_deref(),
            Some("https://checkout.shopify.com")
        );
        assert_eq!(
            canonicalize_checkout_origin("https://extensions.shopifycdn.com").as_deref(),
            Some("https://checkout.shopify.com")
        );
        assert_eq!(
            canonicalize_checkout_origin("https://demo.myshopify.com/checkout?step=1").as_deref(),
            Some("https://demo.myshopify.com")
        );
        assert!(canonicalize_checkout_origin("not a url").is_none());
    }

    #[test]
    fn test_origin_allowed() {
        let client = SigningClient::new(&config());

        assert!(client.origin_allowed("https://checkout.shopify.com"));
        assert!(client.origin_allowed("https://demo.myshopify.com"));
        assert!(client.origin_allowed("https://partner.example"));
        assert!(client.origin_allowed("https://funnelkit.example"));
        assert!(!client.origin_allowed("https://evil.example"));
        assert!(!client.origin_allowed("https://notshopify.com"));
    }

    #[tokio::test]
    async fn test_disallowed_origin_rejected_before_any_upstream_call() {
        let server = MockServer::start().await;
        let client = SigningClient::new(&config());

        let result = client
            .sign(
                "demo.myshopify.com",
                "ref-1",
                Some("buyer-token"),
                &[add_variant(serde_json::json!(555), None)],
                Some("https://evil.example"),
                Some(&server.uri()),
            )
            .await;

        assert!(matches!(result, Err(SignError::ForbiddenOrigin(_))));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_rejections() {
        let client = SigningClient::new(&config());
        let changes = [add_variant(serde_json::json!(555), None)];

        let missing_token = client
            .sign("demo.myshopify.com", "ref-1", None, &changes, None, None)
            .await;
        assert!(matches!(missing_token, Err(SignError::MissingAuthorization)));

        let missing_shop = client
            .sign("", "ref-1", Some("buyer-token"), &changes, None, None)
            .await;
        assert!(matches!(missing_shop, Err(SignError::BadRequest(_))));

        let empty_changes = client
            .sign("demo.myshopify.com", "ref-1", Some("t"), &[], None, None)
            .await;
        assert!(matches!(empty_changes, Err(SignError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_probe_continues_past_404_and_stops_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/c"))
            .and(body_partial_json(serde_json::json!({
                "changes": [{ "type": "add_variant", "variant_id": 555, "quantity": 1 }]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "abc" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/d"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = SigningClient::new(&config());
        let changes = normalize_changes(&[add_variant(serde_json::json!(555), None)]).unwrap();
        let candidates = candidates_for(&server, &["/a", "/b", "/c", "/d"]);

        let (result, attempts) = client.probe(&candidates, "ref-1", "buyer-token", &changes).await;

        let signed = result.unwrap();
        assert_eq!(signed.changeset, "abc");
        assert_eq!(signed.tried.len(), 3);
        assert_eq!(attempts.len(), 3);
    }

    #[tokio::test]
    async fn test_probe_stops_on_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "error": "invalid token" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = SigningClient::new(&config());
        let changes = normalize_changes(&[add_variant(serde_json::json!(555), None)]).unwrap();
        let candidates = candidates_for(&server, &["/a", "/b"]);

        let (result, _) = client.probe(&candidates, "ref-1", "expired", &changes).await;

        match result {
            Err(SignError::Upstream {
                reason,
                status,
                tried,
                ..
            }) => {
                assert_eq!(reason, UpstreamReason::UnauthorizedToken);
                assert_eq!(status, Some(401));
                assert_eq!(tried.len(), 1);
            }
            other => panic!("expected unauthorized upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_probe_exhausts_all_404s() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let client = SigningClient::new(&config());
        let changes = normalize_changes(&[add_variant(serde_json::json!(555), None)]).unwrap();
        let candidates = candidates_for(&server, &["/a", "/b"]);

        let (result, attempts) = client.probe(&candidates, "ref-1", "buyer-token", &changes).await;

        match result {
            Err(SignError::Exhausted { tried }) => assert_eq!(tried.len(), 2),
            other => panic!("expected exhausted error, got {other:?}"),
        }
        assert!(attempts.iter().all(|a| a.outcome == "not-found"));
    }

    #[tokio::test]
    async fn test_probe_success_without_token_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })),
            )
            .mount(&server)
            .await;

        let client = SigningClient::new(&config());
        let changes = normalize_changes(&[add_variant(serde_json::json!(555), None)]).unwrap();
        let candidates = candidates_for(&server, &["/a"]);

        let (result, _) = client.probe(&candidates, "ref-1", "buyer-token", &changes).await;

        assert!(matches!(
            result,
            Err(SignError::Upstream {
                reason: UpstreamReason::MissingToken,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_probe_network_failure_is_terminal_with_cause() {
        // Nothing listens on this port; connection is refused immediately.
        let client = SigningClient::new(&config());
        let changes = normalize_changes(&[add_variant(serde_json::json!(555), None)]).unwrap();
        let candidates = vec![SigningCandidate {
            url: "http://127.0.0.1:9/checkouts/unstable/changesets/calculate".to_string(),
            body: BodyShape::ReferenceInBody,
        }];

        let (result, _) = client.probe(&candidates, "ref-1", "buyer-token", &changes).await;

        match result {
            Err(SignError::Network { cause, tried }) => {
                assert!(!cause.is_empty());
                assert_eq!(tried.len(), 1);
            }
            other => panic!("expected network error, got {other:?}"),
        }
    }
}
