//! Offer matching and change-set signing endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use funnelkit_core::ProductGid;

use crate::middleware::RequestId;
use crate::offers::{EnrichedOffer, MatchTrace, enrich};
use crate::shopify::{RawChange, SignError};
use crate::state::AppState;

// =============================================================================
// Offer matching
// =============================================================================

#[derive(Debug, Serialize)]
struct MatchResponse {
    offers: Vec<EnrichedOffer>,
    debug: MatchTrace,
}

#[derive(Debug, Deserialize)]
pub struct MatchQuery {
    shop: Option<String>,
    gids: Option<String>,
}

/// `GET /offers/match?shop=<domain>&gids=<comma-separated refs>`
///
/// Without a `shop` parameter this is a liveness probe: `{ok: true}` without
/// touching the store. With a shop but no refs, resolution degrades to the
/// shop's most recent active funnel (preview mode).
pub async fn match_offers(
    State(state): State<AppState>,
    Query(query): Query<MatchQuery>,
) -> Response {
    let Some(shop) = query.shop.filter(|s| !s.is_empty()) else {
        return Json(serde_json::json!({ "ok": true })).into_response();
    };

    let raw: Vec<String> = query
        .gids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let (offers, debug) = enrich(
        state.funnels(),
        state.credentials(),
        state.meta(),
        &shop,
        &raw,
        "GET",
    )
    .await;

    Json(MatchResponse { offers, debug }).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchBody {
    shop: String,
    product_gids: Vec<serde_json::Value>,
}

/// `POST /offers/match` with JSON body `{shop, productGids: [...]}`.
pub async fn match_offers_post(
    State(state): State<AppState>,
    body: Result<Json<MatchBody>, JsonRejection>,
) -> Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    if body.shop.is_empty() {
        let debug = MatchTrace {
            via: Some("POST"),
            reason: Some("no-shop"),
            ..MatchTrace::default()
        };
        return Json(MatchResponse {
            offers: vec![],
            debug,
        })
        .into_response();
    }

    let raw: Vec<String> = body
        .product_gids
        .iter()
        .filter_map(ProductGid::from_value)
        .map(String::from)
        .collect();

    let (offers, debug) = enrich(
        state.funnels(),
        state.credentials(),
        state.meta(),
        &body.shop,
        &raw,
        "POST",
    )
    .await;

    Json(MatchResponse { offers, debug }).into_response()
}

// =============================================================================
// Change-set signing
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignBody {
    shop: String,
    reference_id: String,
    changes: Vec<RawChange>,
    checkout_origin: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignFailureBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    tried: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    request_id: String,
}

/// `POST /offers/sign` with `Authorization: Bearer <buyer token>`.
///
/// Success: `200 {changeset}`. Failures carry the classified reason, the
/// upstream status and body when available, and every URL attempted.
pub async fn sign(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Result<Json<SignBody>, JsonRejection>,
) -> Response {
    let request_id = request_id.0;

    let Ok(Json(body)) = body else {
        return failure(
            StatusCode::BAD_REQUEST,
            "bad_request",
            None,
            None,
            vec![],
            Some("malformed JSON body".to_string()),
            &request_id,
        );
    };

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());

    match state
        .signer()
        .sign(
            &body.shop,
            &body.reference_id,
            bearer,
            &body.changes,
            origin,
            body.checkout_origin.as_deref(),
        )
        .await
    {
        Ok(signed) => Json(serde_json::json!({ "changeset": signed.changeset })).into_response(),
        Err(error) => sign_failure_response(error, &request_id),
    }
}

fn sign_failure_response(error: SignError, request_id: &str) -> Response {
    match error {
        SignError::MissingAuthorization => failure(
            StatusCode::UNAUTHORIZED,
            "missing_bearer_token",
            None,
            None,
            vec![],
            None,
            request_id,
        ),
        SignError::BadRequest(detail) => failure(
            StatusCode::BAD_REQUEST,
            "bad_request",
            None,
            None,
            vec![],
            Some(detail),
            request_id,
        ),
        SignError::ForbiddenOrigin(origin) => failure(
            StatusCode::FORBIDDEN,
            "origin_not_allowed",
            None,
            None,
            vec![],
            Some(origin),
            request_id,
        ),
        SignError::Upstream {
            reason,
            status,
            data,
            tried,
        } => {
            // Surface the platform's own status when it is an error status;
            // a malformed success body still fails as a gateway error.
            let http = status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            failure(http, reason.as_str(), status, data, tried, None, request_id)
        }
        SignError::Exhausted { tried } => failure(
            StatusCode::BAD_GATEWAY,
            "upstream_exhausted",
            Some(404),
            None,
            tried,
            None,
            request_id,
        ),
        SignError::Network { cause, tried } => failure(
            StatusCode::BAD_GATEWAY,
            "upstream_unreachable",
            None,
            None,
            tried,
            Some(cause),
            request_id,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn failure(
    http_status: StatusCode,
    error: &'static str,
    upstream_status: Option<u16>,
    data: Option<serde_json::Value>,
    tried: Vec<String>,
    message: Option<String>,
    request_id: &str,
) -> Response {
    (
        http_status,
        Json(SignFailureBody {
            error,
            status: upstream_status,
            data,
            tried,
            message,
            request_id: request_id.to_string(),
        }),
    )
        .into_response()
}
