//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health          - Service liveness
//!
//! # Offers (consumed by the checkout extension)
//! GET  /offers/match    - Match offers for a purchase; no `shop` = probe
//! POST /offers/match    - JSON-body equivalent
//! POST /offers/sign     - Obtain a signed change-set token (bearer = buyer token)
//! OPTIONS /offers/*     - 204 CORS preflight
//! ```

pub mod offers;

use axum::{
    Json, Router,
    middleware::from_fn,
    routing::{get, post},
};

use crate::middleware::{catch_panic_middleware, cors_middleware, request_id_middleware};
use crate::state::AppState;

/// Create the extension-facing offer routes.
///
/// The panic boundary sits inside the CORS layer so even a redacted 500
/// keeps its CORS headers and stays readable by the extension.
pub fn offer_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/offers/match",
            get(offers::match_offers).post(offers::match_offers_post),
        )
        .route("/offers/sign", post(offers::sign))
        .layer(from_fn(catch_panic_middleware))
        .layer(from_fn(cors_middleware))
}

/// Assemble the full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(offer_routes())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
