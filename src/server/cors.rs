//! Cross-origin policy enforcement.
//!
//! The allow-lists are runtime configuration, so this is a small middleware
//! over a [`CorsPolicy`] rather than a fixed `tower_http` layer. Development
//! mode can swap in `CorsLayer::very_permissive()` instead (see
//! [`crate::server::routes`]).
//!
//! # Behavior
//!
//! ```text
//! Origin allow-listed     -> echo origin, Allow-Headers, Allow-Credentials
//!   + preflight           -> Allow-Methods if the requested method is listed;
//!                            answered here with an empty 200
//! Origin absent/unlisted  -> no CORS headers, request proceeds unmodified
//! every response          -> Vary: Origin
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use tracing::debug;

/// Runtime cross-origin allow-lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    /// Exact origins allowed to make credentialed cross-origin requests
    pub origins: Vec<String>,

    /// Methods advertised to preflights
    pub methods: Vec<Method>,

    /// Request headers advertised to allowed origins
    pub headers: Vec<HeaderName>,

    /// Whether to send `Access-Control-Allow-Credentials: true`
    pub allow_credentials: bool,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            origins: vec!["http://localhost:5173".to_string()],
            methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            headers: vec![header::AUTHORIZATION, header::CONTENT_TYPE],
            allow_credentials: true,
        }
    }
}

impl CorsPolicy {
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.origins.iter().any(|allowed| allowed == origin)
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.iter().any(|allowed| allowed.as_str() == method)
    }

    /// Whether the request is a preflight: `OPTIONS` with both `Origin` and
    /// `Access-Control-Request-Method`.
    pub fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
        method == Method::OPTIONS
            && headers.contains_key(header::ORIGIN)
            && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    /// CORS headers to add to the response for a request with `method` and
    /// `headers`. Empty when the origin is absent or not allow-listed.
    pub fn response_headers(&self, method: &Method, headers: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::new();

        let Some(origin) = headers.get(header::ORIGIN) else {
            return out;
        };
        let allowed = origin
            .to_str()
            .map(|origin| self.allows_origin(origin))
            .unwrap_or(false);
        if !allowed {
            debug!(origin = ?origin, "Origin not allow-listed");
            return out;
        }

        out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        if let Some(value) = join_header(self.headers.iter().map(HeaderName::as_str)) {
            out.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        }
        if self.allow_credentials {
            out.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }

        if Self::is_preflight(method, headers) {
            let requested = headers
                .get(header::ACCESS_CONTROL_REQUEST_METHOD)
                .and_then(|value| value.to_str().ok())
                .map(str::trim);
            match requested {
                Some(requested) if self.allows_method(requested) => {
                    if let Some(value) = join_header(self.methods.iter().map(Method::as_str)) {
                        out.insert(header::ACCESS_CONTROL_ALLOW_METHODS, value);
                    }
                }
                _ => debug!(requested = ?requested, "Preflight method not allow-listed"),
            }
        }

        out
    }
}

fn join_header<'a>(items: impl Iterator<Item = &'a str>) -> Option<HeaderValue> {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        return None;
    }
    HeaderValue::from_str(&joined).ok()
}

/// Axum middleware applying a [`CorsPolicy`].
///
/// Preflights from allow-listed origins are answered directly with an empty
/// 200; everything else is passed on and decorated on the way out.
pub async fn enforce_cors(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let cors_headers = policy.response_headers(request.method(), request.headers());

    let mut response = if !cors_headers.is_empty()
        && CorsPolicy::is_preflight(request.method(), request.headers())
    {
        let mut preflight = Response::new(Body::empty());
        *preflight.status_mut() = StatusCode::OK;
        preflight
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.extend(cors_headers);
    headers.append(header::VARY, HeaderValue::from_static("origin"));
    response
}

// =============================================================================
// Tests
// =============================================================================
