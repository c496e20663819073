//! API token authentication middleware.
//!
//! When `API_TOKEN` is configured, protected routes require it via either:
//! - `Authorization: Bearer {token}` headers (recommended)
//! - `?token={token}` query string parameters (for `<img src>` and other
//!   clients that can't set headers)
//!
//! With no token configured the middleware lets every request through.
//! Tokens are compared by SHA-256 digest in constant time.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{error::Error, AppState};

/// Extract token from Authorization header or query string.
///
/// Priority:
/// 1. Authorization: Bearer {token} header
/// 2. ?token={token} query parameter
fn extract_token_from_request(req: &Request<Body>) -> Option<String> {
    // Try Authorization header first
    if let Some(auth_header) = req.headers().get(AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    // Fall back to query parameter
    if let Some(query) = req.uri().query() {
        for part in query.split('&') {
            if let Some(token) = part.strip_prefix("token=") {
                if let Ok(decoded) = urlencoding::decode(token) {
                    return Some(decoded.into_owned());
                }
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Middleware that requires the configured API token.
///
/// # Errors
///
/// Returns 401 Unauthorized if a token is configured and the request
/// carries no token or a different one.
///
/// # Example
///
/// ```rust,ignore
/// use axum::{Router, middleware};
/// use autolabel::middleware::require_token;
///
/// let app = Router::new()
///     .route("/projects", get(list_projects))
///     .layer(middleware::from_fn_with_state(state.clone(), require_token));
/// ```
pub async fn require_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let token = extract_token_from_request(&req).ok_or(Error::Unauthenticated)?;

    if !token_matches(&token, expected) {
        debug!(path = %req.uri().path(), "Rejected request with invalid API token");
        return Err(Error::Unauthenticated);
    }

    Ok(next.run(req).await)
}

fn token_matches(provided: &str, expected: &str) -> bool {
    let provided = hex::encode(Sha256::digest(provided.as_bytes()));
    let expected = hex::encode(Sha256::digest(expected.as_bytes()));
    constant_time_eq(&provided, &expected)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn request(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[rstest]
    #[case("/projects", Some("Bearer abc"), Some("abc"))]
    #[case("/projects?token=abc", None, Some("abc"))]
    #[case("/projects?x=1&token=a%2Bb", None, Some("a+b"))]
    #[case("/projects?token=query", Some("Bearer header"), Some("header"))]
    #[case("/projects", Some("Basic abc"), None)]
    #[case("/projects", None, None)]
    fn test_extract_token(
        #[case] uri: &str,
        #[case] auth: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            extract_token_from_request(&request(uri, auth)).as_deref(),
            expected
        );
    }

    #[test]
    fn test_token_matches() {
        assert!(token_matches("secret", "secret"));
        assert!(!token_matches("secret", "Secret"));
        assert!(!token_matches("", "secret"));
    }
}
