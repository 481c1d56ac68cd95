//! Bearer-token middleware.

use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use tracing::warn;

use super::state::AppState;

/// Constant-time token comparison; length inequality short-circuits,
/// content never does.
pub fn validate_auth_token(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Reject any request without a matching `Authorization: Bearer` header.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if validate_auth_token(token, &state.auth_token) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "rejected request with invalid or missing token");
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Invalid or missing auth token" })),
            )
                .into_response()
        }
    }
}
