//! Batch product metadata fetching for offer enrichment.
//!
//! Resolves canonical product ids to title/image/variant/price snapshots
//! using the shop's offline Admin API credentials. The primary path is one
//! GraphQL `nodes(ids:)` batch query; when that yields nothing for a
//! non-empty id set (older shops, partial API availability), a REST product
//! listing is tried instead, with the shop's display currency resolved
//! concurrently since the listing payload does not carry currency per item.
//!
//! Every failure mode here degrades: the caller always gets a (possibly
//! empty) mapping plus a [`FetchDiagnostic`] describing what happened.

use std::collections::HashMap;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use funnelkit_core::{ProductGid, format_price, numeric_ids};

use crate::config::AppConfig;
use crate::db::ShopCredentials;

use super::UPSTREAM_TIMEOUT;

/// Placeholder title when upstream data has none.
const UNTITLED: &str = "Untitled product";

/// Variants requested per product in the batch query.
const VARIANT_COUNT: usize = 10;

const PRODUCTS_BY_ID_QUERY: &str = "\
query ProductsById($ids: [ID!]!, $variantCount: Int!) {
  nodes(ids: $ids) {
    ... on Product {
      id
      title
      featuredImage { url }
      variants(first: $variantCount) {
        nodes { id title price { amount currencyCode } }
      }
    }
  }
}";

/// Errors while talking to the metadata endpoints. Absorbed into
/// [`FetchDiagnostic::error`] before they reach the enrichment pipeline.
#[derive(Debug, Error)]
enum MetaFetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("graphql errors: {0}")]
    GraphQl(String),
}

/// A transient, per-request snapshot of a product's sellable details.
#[derive(Debug, Clone)]
pub struct ProductMeta {
    pub id: ProductGid,
    /// Always present; falls back to a placeholder when upstream has none.
    pub title: String,
    pub image: Option<String>,
    pub variants: Vec<VariantMeta>,
    /// Default variant (the first one upstream returned).
    pub variant_id: Option<String>,
    pub price_amount: Option<f64>,
    pub currency_code: Option<String>,
}

impl ProductMeta {
    /// Two-decimal display price, absent unless both amount and currency are
    /// known.
    #[must_use]
    pub fn price_display(&self) -> Option<String> {
        format_price(self.price_amount, self.currency_code.as_deref())
    }
}

/// One sellable variant of a product.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantMeta {
    pub id: String,
    pub title: String,
    pub price_amount: Option<f64>,
    pub currency_code: Option<String>,
}

/// Which fetch path produced (or failed to produce) the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchKind {
    #[serde(rename = "graphql-http")]
    GraphQl,
    #[serde(rename = "rest")]
    Rest,
    #[serde(rename = "skipped")]
    Skipped,
}

/// Diagnostic trail of one `fetch_meta` call, returned alongside the result
/// and ultimately surfaced in the match response's debug payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDiagnostic {
    pub kind: FetchKind,
    pub requested: Vec<ProductGid>,
    pub received: Vec<ProductGid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchDiagnostic {
    fn skipped(requested: &[ProductGid], note: &'static str) -> Self {
        Self {
            kind: FetchKind::Skipped,
            requested: requested.to_vec(),
            received: vec![],
            status: None,
            shop_currency: None,
            note: Some(note),
            error: None,
        }
    }
}

// =============================================================================
// GraphQL wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlErrorEntry>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
struct NodesData {
    nodes: Vec<Option<ProductNode>>,
}

/// A node from `nodes(ids:)`. Ids that resolve to deleted products come back
/// as `null`; ids of a different resource type come back as empty objects.
/// Every field is therefore optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProductNode {
    id: Option<String>,
    title: Option<String>,
    featured_image: Option<ImageNode>,
    variants: Option<VariantConnection>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageNode {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VariantConnection {
    nodes: Vec<VariantNode>,
}

#[derive(Debug, Default, Deserialize)]
struct VariantNode {
    id: Option<String>,
    title: Option<String>,
    price: Option<PriceNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PriceNode {
    amount: Option<String>,
    currency_code: Option<String>,
}

// =============================================================================
// REST wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    products: Vec<RestProduct>,
}

#[derive(Debug, Deserialize)]
struct RestProduct {
    id: u64,
    title: Option<String>,
    image: Option<RestImage>,
    #[serde(default)]
    variants: Vec<RestVariant>,
}

#[derive(Debug, Deserialize)]
struct RestImage {
    src: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestVariant {
    id: u64,
    title: Option<String>,
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShopEnvelope {
    shop: Option<ShopNode>,
}

#[derive(Debug, Deserialize)]
struct ShopNode {
    currency: Option<String>,
}

// =============================================================================
// ProductMetaClient
// =============================================================================

/// Client resolving canonical product ids to [`ProductMeta`].
#[derive(Clone)]
pub struct ProductMetaClient {
    client: reqwest::Client,
    api_version: String,
    base_override: Option<String>,
}

impl ProductMetaClient {
    /// Create a new metadata client.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(UPSTREAM_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_version: config.api_version.clone(),
            base_override: None,
        }
    }

    /// Point every request at a fixed base URL instead of the shop domain.
    #[cfg(test)]
    pub(crate) fn with_base_override(api_version: &str, base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_version: api_version.to_string(),
            base_override: Some(base),
        }
    }

    fn admin_base(&self, shop: &str) -> String {
        self.base_override
            .clone()
            .unwrap_or_else(|| format!("https://{shop}"))
    }

    /// Resolve a batch of product ids to metadata.
    ///
    /// Never fails the caller: an empty id set, missing credentials, or any
    /// upstream problem all yield an empty mapping plus a diagnostic.
    #[instrument(skip_all, fields(id_count = ids.len()))]
    pub async fn fetch_meta(
        &self,
        credentials: Option<&ShopCredentials>,
        ids: &[ProductGid],
    ) -> (HashMap<ProductGid, ProductMeta>, FetchDiagnostic) {
        let Some(creds) = credentials else {
            return (
                HashMap::new(),
                FetchDiagnostic::skipped(ids, "no-offline-session"),
            );
        };
        if ids.is_empty() {
            return (HashMap::new(), FetchDiagnostic::skipped(ids, "no-ids"));
        }

        let (by_id, diagnostic) = self.fetch_graphql(creds, ids).await;
        if !by_id.is_empty() {
            return (by_id, diagnostic);
        }

        // Primary came back empty for a non-empty id set; try the listing
        // protocol with bare integer ids.
        debug!("batch query empty, falling back to product listing");
        self.fetch_rest(creds, ids).await
    }

    async fn fetch_graphql(
        &self,
        creds: &ShopCredentials,
        ids: &[ProductGid],
    ) -> (HashMap<ProductGid, ProductMeta>, FetchDiagnostic) {
        let url = format!(
            "{}/admin/api/{}/graphql.json",
            self.admin_base(&creds.shop),
            self.api_version
        );
        let body = serde_json::json!({
            "query": PRODUCTS_BY_ID_QUERY,
            "variables": { "ids": ids, "variantCount": VARIANT_COUNT },
        });

        let mut diagnostic = FetchDiagnostic {
            kind: FetchKind::GraphQl,
            requested: ids.to_vec(),
            received: vec![],
            status: None,
            shop_currency: None,
            note: None,
            error: None,
        };

        let nodes = match self.post_graphql(creds, &url, &body).await {
            Ok((status, nodes)) => {
                diagnostic.status = Some(status);
                nodes
            }
            Err(e) => {
                debug!(error = %e, "batch query failed");
                diagnostic.error = Some(e.to_string());
                return (HashMap::new(), diagnostic);
            }
        };

        let mut by_id = HashMap::new();
        for node in nodes.into_iter().flatten() {
            // Only nodes matching the product shape carry an id; ids that
            // did not resolve are simply absent from the result.
            let Some(id) = node.id.as_deref().and_then(ProductGid::normalize) else {
                continue;
            };

            let variants: Vec<VariantMeta> = node
                .variants
                .map(|conn| conn.nodes)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| {
                    let variant_id = v.id?;
                    let price = v.price.unwrap_or_default();
                    Some(VariantMeta {
                        id: variant_id,
                        title: v.title.unwrap_or_else(|| "Option".to_string()),
                        price_amount: price.amount.and_then(|a| a.parse().ok()),
                        currency_code: price.currency_code,
                    })
                })
                .collect();

            let first = variants.first();
            let meta = ProductMeta {
                id: id.clone(),
                title: node.title.unwrap_or_else(|| UNTITLED.to_string()),
                image: node.featured_image.and_then(|img| img.url),
                variant_id: first.map(|v| v.id.clone()),
                price_amount: first.and_then(|v| v.price_amount),
                currency_code: first.and_then(|v| v.currency_code.clone()),
                variants,
            };

            diagnostic.received.push(id.clone());
            by_id.insert(id, meta);
        }

        (by_id, diagnostic)
    }

    async fn fetch_rest(
        &self,
        creds: &ShopCredentials,
        ids: &[ProductGid],
    ) -> (HashMap<ProductGid, ProductMeta>, FetchDiagnostic) {
        let mut diagnostic = FetchDiagnostic {
            kind: FetchKind::Rest,
            requested: ids.to_vec(),
            received: vec![],
            status: None,
            shop_currency: None,
            note: None,
            error: None,
        };

        let numeric = numeric_ids(ids);
        if numeric.is_empty() {
            diagnostic.note = Some("no numeric ids");
            return (HashMap::new(), diagnostic);
        }

        let joined = numeric
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/admin/api/{}/products.json?ids={joined}&fields=id,title,image,variants",
            self.admin_base(&creds.shop),
            self.api_version
        );

        // The listing payload has no per-item currency; resolve the shop's
        // display currency concurrently (independent reads).
        let (listing, shop_currency) = tokio::join!(
            self.get_json::<ListingResponse>(creds, &url),
            self.fetch_shop_currency(creds),
        );

        diagnostic.shop_currency = shop_currency.clone();

        let (status, listing) = match listing {
            Ok(ok) => ok,
            Err(e) => {
                debug!(error = %e, "product listing failed");
                diagnostic.error = Some(e.to_string());
                return (HashMap::new(), diagnostic);
            }
        };
        diagnostic.status = Some(status);

        let mut by_id = HashMap::new();
        for product in listing.products {
            let id = ProductGid::from_numeric(product.id);
            let variants: Vec<VariantMeta> = product
                .variants
                .iter()
                .map(|v| VariantMeta {
                    id: format!("gid://shopify/ProductVariant/{}", v.id),
                    title: v.title.clone().unwrap_or_else(|| "Option".to_string()),
                    price_amount: v.price.as_deref().and_then(|p| p.parse().ok()),
                    currency_code: shop_currency.clone(),
                })
                .collect();

            let first = variants.first();
            let meta = ProductMeta {
                id: id.clone(),
                title: product.title.unwrap_or_else(|| UNTITLED.to_string()),
                image: product.image.and_then(|img| img.src),
                variant_id: first.map(|v| v.id.clone()),
                price_amount: first.and_then(|v| v.price_amount),
                currency_code: first.and_then(|v| v.currency_code.clone()),
                variants,
            };

            diagnostic.received.push(id.clone());
            by_id.insert(id, meta);
        }

        (by_id, diagnostic)
    }

    /// The shop's display currency, or `None` when it cannot be resolved.
    async fn fetch_shop_currency(&self, creds: &ShopCredentials) -> Option<String> {
        let url = format!(
            "{}/admin/api/{}/shop.json?fields=currency",
            self.admin_base(&creds.shop),
            self.api_version
        );
        match self.get_json::<ShopEnvelope>(creds, &url).await {
            Ok((_, envelope)) => envelope.shop.and_then(|s| s.currency),
            Err(e) => {
                debug!(error = %e, "shop currency lookup failed");
                None
            }
        }
    }

    async fn post_graphql(
        &self,
        creds: &ShopCredentials,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<(u16, Vec<Option<ProductNode>>), MetaFetchError> {
        let response = self
            .client
            .post(url)
            .header("X-Shopify-Access-Token", creds.access_token.expose_secret())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetaFetchError::Status(status.as_u16()));
        }

        let envelope: GraphQlEnvelope<NodesData> = response.json().await?;
        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                let joined = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(MetaFetchError::GraphQl(joined));
            }
        }

        Ok((
            status.as_u16(),
            envelope.data.map(|d| d.nodes).unwrap_or_default(),
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        creds: &ShopCredentials,
        url: &str,
    ) -> Result<(u16, T), MetaFetchError> {
        let response = self
            .client
            .get(url)
            .header("X-Shopify-Access-Token", creds.access_token.expose_secret())
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetaFetchError::Status(status.as_u16()));
        }

        Ok((status.as_u16(), response.json().await?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> ShopCredentials {
        ShopCredentials {
            shop: "demo.myshopify.com".to_string(),
            access_token: SecretString::from("shpat_test_token"),
        }
    }

    fn client(server: &MockServer) -> ProductMetaClient {
        ProductMetaClient::with_base_override("2024-07", server.uri())
    }

    fn gids(ids: &[&str]) -> Vec<ProductGid> {
        ProductGid::normalize_all(ids.iter().copied())
    }

    #[tokio::test]
    async fn test_empty_ids_short_circuit() {
        let server = MockServer::start().await;
        let client = client(&server);

        let (by_id, diagnostic) = client.fetch_meta(Some(&creds()), &[]).await;

        assert!(by_id.is_empty());
        assert_eq!(diagnostic.kind, FetchKind::Skipped);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_short_circuit() {
        let server = MockServer::start().await;
        let client = client(&server);

        let (by_id, diagnostic) = client.fetch_meta(None, &gids(&["1"])).await;

        assert!(by_id.is_empty());
        assert_eq!(diagnostic.note, Some("no-offline-session"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_query_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/api/2024-07/graphql.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "nodes": [
                    {
                        "id": "gid://shopify/Product/2",
                        "title": "Travel mug",
                        "featuredImage": { "url": "https://cdn.example/mug.png" },
                        "variants": { "nodes": [
                            { "id": "gid://shopify/ProductVariant/555", "title": "Default",
                              "price": { "amount": "100.0", "currencyCode": "UAH" } }
                        ] }
                    },
                    null,
                    {}
                ] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let ids = gids(&["2", "3", "4"]);
        let (by_id, diagnostic) = client.fetch_meta(Some(&creds()), &ids).await;

        assert_eq!(by_id.len(), 1);
        let meta = by_id.get(&ids[0]).unwrap();
        assert_eq!(meta.title, "Travel mug");
        assert_eq!(meta.image.as_deref(), Some("https://cdn.example/mug.png"));
        assert_eq!(
            meta.variant_id.as_deref(),
            Some("gid://shopify/ProductVariant/555")
        );
        assert_eq!(meta.price_display().as_deref(), Some("100.00 UAH"));
        assert_eq!(diagnostic.kind, FetchKind::GraphQl);
        assert_eq!(diagnostic.received, vec![ids[0].clone()]);
    }

    #[tokio::test]
    async fn test_empty_batch_falls_back_to_listing_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/api/2024-07/graphql.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "data": { "nodes": [null] } })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-07/products.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "products": [{
                    "id": 2,
                    "title": "Travel mug",
                    "image": { "src": "https://cdn.example/mug.png" },
                    "variants": [{ "id": 555, "title": "Default", "price": "19.9" }]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-07/shop.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "shop": { "currency": "USD" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let ids = gids(&["2"]);
        let (by_id, diagnostic) = client.fetch_meta(Some(&creds()), &ids).await;

        assert_eq!(diagnostic.kind, FetchKind::Rest);
        assert_eq!(diagnostic.shop_currency.as_deref(), Some("USD"));
        let meta = by_id.get(&ids[0]).unwrap();
        // Currency merged from the dependent shop lookup
        assert_eq!(meta.currency_code.as_deref(), Some("USD"));
        assert_eq!(meta.price_display().as_deref(), Some("19.90 USD"));
        assert_eq!(
            meta.variant_id.as_deref(),
            Some("gid://shopify/ProductVariant/555")
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/api/2024-07/graphql.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-07/products.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2024-07/shop.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client(&server);
        let (by_id, diagnostic) = client.fetch_meta(Some(&creds()), &gids(&["2"])).await;

        assert!(by_id.is_empty());
        assert!(diagnostic.error.is_some());
    }
}
