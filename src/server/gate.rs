//! Authorization gates.
//!
//! Two interchangeable strategies, each an Axum middleware bound to a route
//! group with `route_layer`:
//!
//! - [`basic_auth_gate`]: verifies `Authorization: Basic ...` credentials on
//!   every request. Stateless; no session is created.
//! - [`session_gate`]: verifies the `session_token` cookie against the
//!   [`SessionRegistry`].
//!
//! On success both attach an [`AuthenticatedUser`] to the request, which
//! handlers receive through the extractor of the same name.
//!
//! # Session Gate Outcomes
//!
//! ```text
//! no cookie            -> 401, empty body
//! unreadable cookie    -> 400, empty body
//! unknown/expired      -> 401, empty body, cookie cleared
//! live session         -> handler runs, no renewed cookie
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::run_blocking;
use crate::auth::{CredentialStore, Session, SessionRegistry};
use crate::error::AuthError;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session_token";

/// Challenge sent with basic-auth 401 responses.
pub const BASIC_CHALLENGE: &str = r#"Basic realm="api""#;

// =============================================================================
// Authenticated Identity
// =============================================================================

/// How the caller proved who they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Basic credentials on this request
    Basic { user_id: i64 },

    /// A live session cookie
    Session(Session),
}

/// The identity established by an authorization gate.
///
/// Extracting this in a handler that is not behind a gate is a wiring bug and
/// is reported as an internal fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub name: String,
    pub method: AuthMethod,
}

impl AuthenticatedUser {
    /// The session behind this identity, if it came from the session gate.
    pub fn session(&self) -> Option<&Session> {
        match &self.method {
            AuthMethod::Session(session) => Some(session),
            AuthMethod::Basic { .. } => None,
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| {
                AuthError::InternalFault(format!(
                    "no authorization gate in front of {}",
                    parts.uri.path()
                ))
            })
    }
}

// =============================================================================
// Basic-Credential Gate
// =============================================================================

/// State for [`basic_auth_gate`].
#[derive(Debug, Clone)]
pub struct BasicAuthGate {
    credentials: CredentialStore,
}

impl BasicAuthGate {
    pub fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }
}

/// Axum middleware admitting requests that carry valid basic credentials.
///
/// # Example
///
/// ```ignore
/// let gate = BasicAuthGate::new(credentials);
/// let app = Router::new()
///     .route("/register", post(register_handler))
///     .route_layer(middleware::from_fn_with_state(gate, basic_auth_gate));
/// ```
pub async fn basic_auth_gate(
    State(gate): State<BasicAuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some((name, password)) = parse_basic_credentials(request.headers()) else {
        debug!("Basic auth rejected: missing or unparseable credentials");
        return challenge();
    };

    let credentials = gate.credentials.clone();
    let verified = match run_blocking(move || credentials.verify_credentials(&name, &password))
        .await
    {
        Ok(verified) => verified,
        Err(err) => return err.into_response(),
    };

    match verified {
        Some(user) => {
            request.extensions_mut().insert(AuthenticatedUser {
                name: user.name,
                method: AuthMethod::Basic { user_id: user.id },
            });
            next.run(request).await
        }
        None => {
            warn!("Basic auth rejected: invalid credentials");
            challenge()
        }
    }
}

fn challenge() -> Response {
    (
        [(header::WWW_AUTHENTICATE, BASIC_CHALLENGE)],
        AuthError::InvalidCredentials,
    )
        .into_response()
}

/// Decode `Authorization: Basic base64(name:password)`.
///
/// The scheme name is case-insensitive; the password may itself contain `:`.
pub fn parse_basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, password) = decoded.split_once(':')?;
    Some((name.to_string(), password.to_string()))
}

// =============================================================================
// Session-Cookie Gate
// =============================================================================

/// State for [`session_gate`].
#[derive(Debug, Clone)]
pub struct SessionGate {
    sessions: Arc<SessionRegistry>,
    same_site: SameSite,
}

impl SessionGate {
    /// `same_site` must match the attribute used when the cookie was issued so
    /// that the clearing cookie replaces it.
    pub fn new(sessions: Arc<SessionRegistry>, same_site: SameSite) -> Self {
        Self {
            sessions,
            same_site,
        }
    }
}

/// Axum middleware admitting requests that carry a live session cookie.
pub async fn session_gate(
    State(gate): State<SessionGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match session_token(request.headers()) {
        Ok(Some(token)) => token,
        Ok(None) => {
            debug!("Session gate rejected: no session cookie");
            return AuthError::MissingSession.into_response();
        }
        Err(err) => {
            debug!("Session gate rejected: {}", err);
            return err.into_response();
        }
    };

    match gate.sessions.lookup(&token) {
        Some(session) => {
            request.extensions_mut().insert(AuthenticatedUser {
                name: session.username.clone(),
                method: AuthMethod::Session(session),
            });
            next.run(request).await
        }
        None => {
            debug!("Session gate rejected: unknown or expired session");
            let jar = CookieJar::new().add(clear_session_cookie(gate.same_site));
            (jar, AuthError::ExpiredSession).into_response()
        }
    }
}

/// Find the session token among the request's cookies.
///
/// Returns `Ok(None)` when no `session_token` cookie is present and
/// `MalformedSession` when the `session_token` pair is not valid text or
/// cannot be parsed. Other cookies are never decoded, so a foreign cookie
/// with non-UTF-8 bytes does not affect the outcome.
pub fn session_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    for value in headers.get_all(header::COOKIE) {
        for pair in value.as_bytes().split(|b| *b == b';') {
            let pair = pair.trim_ascii();
            let name = match pair.iter().position(|b| *b == b'=') {
                Some(eq) => &pair[..eq],
                None => pair,
            };
            if name.trim_ascii() != SESSION_COOKIE.as_bytes() {
                continue;
            }

            let pair = std::str::from_utf8(pair).map_err(|_| AuthError::MalformedSession)?;
            let cookie = Cookie::parse(pair).map_err(|_| AuthError::MalformedSession)?;
            return Ok(Some(cookie.value().to_string()));
        }
    }

    Ok(None)
}

// =============================================================================
// Cookies
// =============================================================================

/// The cookie carrying a freshly issued session.
///
/// Fails when the expiry cannot be expressed as a cookie date, rather than
/// issuing a cookie that is already expired.
pub fn session_cookie(
    session: &Session,
    same_site: SameSite,
) -> Result<Cookie<'static>, AuthError> {
    let expires = to_offset(session.expires_at)?;
    Ok(build_cookie(session.token.clone(), expires, same_site))
}

/// A cookie that replaces the session cookie with an empty, already-expired one.
pub fn clear_session_cookie(same_site: SameSite) -> Cookie<'static> {
    build_cookie(String::new(), OffsetDateTime::UNIX_EPOCH, same_site)
}

fn build_cookie(value: String, expires: OffsetDateTime, same_site: SameSite) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .expires(expires)
        .same_site(same_site)
        .secure(true)
        .path("/")
        .build()
}

fn to_offset(at: DateTime<Utc>) -> Result<OffsetDateTime, AuthError> {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).map_err(|e| {
        AuthError::InternalFault(format!("session expiry {} out of cookie range: {}", at, e))
    })
}

// =============================================================================
// Tests
// =============================================================================
