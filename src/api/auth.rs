//! Basic-auth middleware for the feed server.
//!
//! When enabled in configuration, every route requires an
//! `Authorization: Basic` header matching the configured credentials.
//! Anything else gets a 401 with a challenge, which makes podcast apps
//! prompt for a password.

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use tracing::warn;

use crate::config::FeedAuthConfig;

/// Challenge sent with every 401 so clients know to retry with credentials.
const CHALLENGE: &str = "Basic realm=\"audiobook podcasts\"";

/// Username/password pair the middleware checks against.
#[derive(Clone)]
pub struct BasicCredentials {
    /// Expected username.
    pub username: String,
    /// Expected password, always concrete after resolution.
    pub password: String,
}

/// Resolves the configured auth section into concrete credentials.
///
/// Returns `None` when auth is disabled. When auth is enabled but no
/// password is configured, a random one is generated and logged so the
/// operator can still get in; it changes on every start.
pub fn resolve_credentials(config: &FeedAuthConfig) -> Option<BasicCredentials> {
    if !config.enabled {
        return None;
    }
    let password = match &config.password {
        Some(password) => password.clone(),
        None => {
            let generated = super::random_token(8);
            warn!(
                password = %generated,
                "no feed password configured, generated one for this run"
            );
            generated
        }
    };
    Some(BasicCredentials {
        username: config.username.clone(),
        password,
    })
}

/// Authentication middleware that checks `Authorization: Basic` headers
/// against the resolved credentials.
///
/// Requests pass straight through when no credentials are configured.
/// A missing, malformed, or mismatching header gets a 401 with a
/// `WWW-Authenticate` challenge.
pub async fn require_basic_auth(
    State(credentials): State<Option<BasicCredentials>>,
    request: Request,
    next: Next,
) -> Response {
    // If no credentials are configured, allow all requests through
    let Some(expected) = credentials else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic);

    match provided {
        Some((username, password)) => {
            // Uses constant-time comparison to prevent timing side-channel
            // attacks; both halves are always compared.
            let user_ok = constant_time_eq(username.as_bytes(), expected.username.as_bytes());
            let pass_ok = constant_time_eq(password.as_bytes(), expected.password.as_bytes());
            if user_ok & pass_ok {
                next.run(request).await
            } else {
                unauthorized_response()
            }
        }
        None => unauthorized_response(),
    }
}

/// Splits an `Authorization: Basic` header value into its credential pair.
///
/// The scheme is matched case-insensitively. Returns `None` for any other
/// scheme, undecodable base64, or a payload without a `:` separator.
fn decode_basic(header_value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header_value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
/// Always compares all bytes regardless of where the first mismatch occurs.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Helper function to create a 401 response carrying the auth challenge.
fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, CHALLENGE)],
        "unauthorized",
    )
        .into_response()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt; // for oneshot

    // Simple test handler that returns 200 OK
    async fn test_handler() -> impl IntoResponse {
        (StatusCode::OK, "Success")
    }

    fn protected_app(username: &str, password: &str) -> Router {
        let credentials = Some(BasicCredentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        Router::new()
            .route("/test", get(test_handler))
            .layer(middleware::from_fn_with_state(
                credentials,
                require_basic_auth,
            ))
    }

    fn basic_header(credentials: &str) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    #[tokio::test]
    async fn no_credentials_configured_allows_all() {
        let app = Router::new()
            .route("/test", get(test_handler))
            .layer(middleware::from_fn_with_state(
                None::<BasicCredentials>,
                require_basic_auth,
            ));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_credentials_pass() {
        let app = protected_app("user", "secret");

        let request = Request::builder()
            .uri("/test")
            .header("authorization", basic_header("user:secret"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_gets_challenge() {
        let app = protected_app("user", "secret");

        let request = Request::builder()
            .uri("/test")
            .header("authorization", basic_header("user:wrong"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok()),
            Some(CHALLENGE)
        );
    }

    #[tokio::test]
    async fn missing_header_gets_challenge() {
        let app = protected_app("user", "secret");

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("www-authenticate"));
    }

    #[tokio::test]
    async fn garbage_base64_is_rejected() {
        let app = protected_app("user", "secret");

        let request = Request::builder()
            .uri("/test")
            .header("authorization", "Basic not!!valid@@base64")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn scheme_is_case_insensitive() {
        let app = protected_app("user", "secret");

        let request = Request::builder()
            .uri("/test")
            .header(
                "authorization",
                basic_header("user:secret").replace("Basic", "bAsIc"),
            )
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn constant_time_eq_semantics() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"sama"));
        assert!(!constant_time_eq(b"short", b"longer"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn disabled_auth_resolves_to_none() {
        let config = FeedAuthConfig {
            enabled: false,
            username: "user".to_string(),
            password: Some("secret".to_string()),
        };
        assert!(resolve_credentials(&config).is_none());
    }

    #[test]
    fn missing_password_is_generated() {
        let config = FeedAuthConfig {
            enabled: true,
            username: "user".to_string(),
            password: None,
        };
        let credentials = resolve_credentials(&config).unwrap();
        assert_eq!(credentials.username, "user");
        assert_eq!(credentials.password.len(), 8);
        assert!(credentials.password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
