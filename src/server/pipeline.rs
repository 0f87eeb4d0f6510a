//! Request pipeline stages wrapped around every route.
//!
//! Outermost first:
//!
//! ```text
//! log_requests ─▶ CORS ─▶ resolve_client_ip ─▶ panic isolation ─▶ routes
//! ```
//!
//! The logging stage sits outside client-IP resolution, so the resolved
//! address travels back to it in the response extensions and is also recorded
//! on the request span for anything logged further in.

use std::any::Any;
use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, field, info, info_span, Instrument, Span};

use super::handlers::{ErrorResponse, INTERNAL_FAULT_MESSAGE};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// The address a request is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl std::fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Request Logging
// =============================================================================

/// Log one line per request with method, path, client address, status and
/// elapsed time.
///
/// Everything downstream runs inside a `request` span carrying the same
/// fields, so handler and panic logs can be correlated.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let peer = peer_addr(&request);

    let span = info_span!(
        "request",
        %method,
        %path,
        remote_addr = field::Empty,
    );

    let response = next.run(request).instrument(span.clone()).await;

    let client = response
        .extensions()
        .get::<ClientAddr>()
        .map(ToString::to_string)
        .unwrap_or(peer);
    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    span.in_scope(|| {
        info!(
            remote_addr = %client,
            status,
            elapsed_ms,
            "Request completed"
        );
    });

    response
}

fn peer_addr(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// =============================================================================
// Client Address Resolution
// =============================================================================

/// Settings for [`resolve_client_ip`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIpConfig {
    /// Take the client address from `X-Forwarded-For`. Only safe behind a
    /// proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

/// Axum middleware attributing the request to a [`ClientAddr`].
///
/// The address is inserted into the request extensions for handlers and into
/// the response extensions for the logging stage.
pub async fn resolve_client_ip(
    State(config): State<ClientIpConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let forwarded = if config.trust_forwarded_for {
        forwarded_for(request.headers())
    } else {
        None
    };
    let client = ClientAddr(forwarded.unwrap_or_else(|| peer_addr(&request)));

    Span::current().record("remote_addr", field::display(&client));
    request.extensions_mut().insert(client.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(client);
    response
}

/// First entry of `X-Forwarded-For`, if present and non-empty.
pub fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

// =============================================================================
// Panic Isolation
// =============================================================================

/// Response for a handler that panicked, for use with
/// `tower_http::catch_panic::CatchPanicLayer::custom`.
///
/// The payload is logged in full; the client only sees the generic apology.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "non-string panic payload".to_string()
    };

    error!(panic = %detail, "Request handler panicked");
    internal_fault_response()
}

/// 500 with the generic apology body.
pub fn internal_fault_response() -> Response {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    (
        status,
        Json(ErrorResponse::with_status(
            "internal_error",
            INTERNAL_FAULT_MESSAGE,
            status,
        )),
    )
        .into_response()
}

// =============================================================================
// Tests
// =============================================================================
