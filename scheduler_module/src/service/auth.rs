use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::state::AppState;

/// Extract Bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

const TOKEN_DIGEST_KEY: &[u8] = b"content-service bearer token";

fn token_digest(token: &str) -> Option<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(TOKEN_DIGEST_KEY).ok()?;
    mac.update(token.as_bytes());
    Some(mac)
}

/// Compares fixed-length digests with `verify_slice`, so the time taken does
/// not depend on where the tokens first differ.
fn tokens_match(expected: &str, provided: &str) -> bool {
    match (token_digest(expected), token_digest(provided)) {
        (Some(expected), Some(provided)) => {
            let expected_tag = expected.finalize().into_bytes();
            provided.verify_slice(&expected_tag).is_ok()
        }
        _ => false,
    }
}

/// Rejects requests whose bearer token does not match `BASIC_AUTH_TOKEN`.
/// With no token configured every guarded request is rejected.
pub(super) async fn require_bearer(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let authorized = match (state.api_token.as_deref(), extract_bearer_token(&headers)) {
        (Some(expected), Some(provided)) => tokens_match(expected, provided),
        _ => false,
    };
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "invalid or missing bearer token"})),
        )
            .into_response();
    }
    next.run(request).await
}
