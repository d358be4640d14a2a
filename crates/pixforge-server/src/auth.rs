//! Shared-secret authentication

use crate::routes::AppError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests without the configured secret.
///
/// A no-op when no session key is configured.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.config.session_key.as_deref() {
        let presented = extract_api_key(request.headers());
        if !presented.is_some_and(|key| keys_match(key, expected)) {
            debug!("Rejected unauthenticated request to {}", request.uri().path());
            return Err(AppError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

/// Key from `x-api-key`, or a bearer token as a fallback
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.trim());
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.trim().strip_prefix("Bearer "))
        .map(str::trim)
}

fn keys_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_api_key() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc "));
        assert_eq!(extract_api_key(&headers), Some("abc"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static(" xyz"));
        assert_eq!(extract_api_key(&headers), Some("xyz"));
    }

    #[test]
    fn test_keys_match() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "secreT"));
        assert!(!keys_match("secre", "secret"));
        assert!(!keys_match("", "secret"));
    }
}
