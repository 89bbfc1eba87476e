//! Outermost request boundary: convert panics into redacted 500s.
//!
//! A handler panic must never tear down the connection with nothing for the
//! extension to read. The request is driven on its own task so a panic
//! surfaces as a join error, which is reported as a redacted internal error.
//! Layered inside the CORS middleware so even these responses keep their
//! CORS headers.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;

/// Middleware that catches panics from the inner service.
pub async fn catch_panic_middleware(request: Request, next: Next) -> Response {
    match tokio::spawn(next.run(request)).await {
        Ok(response) => response,
        Err(e) => {
            let message = if e.is_panic() {
                match e.into_panic().downcast::<String>() {
                    Ok(s) => *s,
                    Err(payload) => payload
                        .downcast::<&'static str>()
                        .map_or_else(|_| "panic".to_string(), |s| (*s).to_string()),
                }
            } else {
                "request task cancelled".to_string()
            };
            AppError::Internal(message).into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request as HttpRequest, middleware::from_fn, routing::get};
    use tower::ServiceExt;

    async fn boom() -> String {
        panic!("kaboom: secret detail")
    }

    #[tokio::test]
    async fn test_panic_becomes_redacted_500() {
        let app: Router = Router::new()
            .route("/boom", get(boom))
            .layer(from_fn(catch_panic_middleware));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/boom")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        // The panic detail is captured server-side, never echoed to clients.
        assert!(!body.contains("kaboom"));
        assert!(body.contains("Internal server error"));
    }
}
