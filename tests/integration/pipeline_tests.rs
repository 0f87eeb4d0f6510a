//! Request pipeline integration tests.
//!
//! Tests verify:
//! - A panicking handler becomes a generic 500 and the router keeps serving
//! - Client address resolution with and without forwarded-for trust
//! - The completion log line records the final status and client address
//! - Unmatched routes and oversized bodies

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Method, Request, StatusCode};
use axum::routing::post;
use axum::{middleware, routing::get, Extension, Router};
use axum_extra::extract::cookie::SameSite;
use tower::ServiceExt;

use taskgate::server::{
    session_gate, with_pipeline, ClientAddr, SessionGate, INTERNAL_FAULT_MESSAGE, MAX_BODY_BYTES,
};
use taskgate::{ErrorResponse, RouterConfig, SessionRegistry};

use super::test_utils::{body_bytes, body_string, get as get_request, LogCapture, TestApp};

async fn explode() -> &'static str {
    panic!("handler exploded with secret detail")
}

async fn whoami(Extension(client): Extension<ClientAddr>) -> String {
    client.0
}

fn test_router(config: &RouterConfig) -> Router {
    let routes = Router::new()
        .route("/boom", get(explode))
        .route("/whoami", get(whoami))
        .route("/fine", get(|| async { "fine" }));

    with_pipeline(routes, config).layer(MockConnectInfo(SocketAddr::from((
        [10, 0, 0, 7],
        40000,
    ))))
}

fn forwarded(uri: &str, value: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", value)
        .body(Body::empty())
        .unwrap()
}

// =============================================================================
// Panic Isolation
// =============================================================================

#[tokio::test]
async fn test_panic_becomes_generic_500() {
    let router = test_router(&RouterConfig::new());

    let response = router.clone().oneshot(get_request("/boom")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_bytes(response).await;
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.message, INTERNAL_FAULT_MESSAGE);
    assert!(!String::from_utf8_lossy(&body).contains("secret detail"));

    // The service is still up
    let response = router.oneshot(get_request("/fine")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "fine");
}

#[tokio::test]
async fn test_panic_response_still_gets_cors_headers() {
    let router = test_router(&RouterConfig::new());

    let request = Request::builder()
        .uri("/boom")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
}

// =============================================================================
// Client Address
// =============================================================================

#[tokio::test]
async fn test_peer_address_used_by_default() {
    let router = test_router(&RouterConfig::new());

    let response = router
        .oneshot(forwarded("/whoami", "203.0.113.9"))
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "10.0.0.7:40000");
}

#[tokio::test]
async fn test_forwarded_for_used_when_trusted() {
    let router = test_router(&RouterConfig::new().with_trust_forwarded_for(true));

    let response = router
        .clone()
        .oneshot(forwarded("/whoami", "203.0.113.9, 10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "203.0.113.9");

    // Without the header the peer address still applies
    let response = router.oneshot(get_request("/whoami")).await.unwrap();
    assert_eq!(body_string(response).await, "10.0.0.7:40000");
}

#[tokio::test]
async fn test_resolved_address_is_visible_to_outer_layers() {
    let router = test_router(&RouterConfig::new().with_trust_forwarded_for(true));

    let response = router
        .oneshot(forwarded("/fine", "198.51.100.4"))
        .await
        .unwrap();
    assert_eq!(
        response.extensions().get::<ClientAddr>(),
        Some(&ClientAddr("198.51.100.4".to_string()))
    );
}

// =============================================================================
// Completion Log
// =============================================================================

fn guarded_router(config: &RouterConfig) -> Router {
    let guarded = Router::new()
        .route("/guarded", post(|| async { "in" }))
        .route_layer(middleware::from_fn_with_state(
            SessionGate::new(Arc::new(SessionRegistry::new()), SameSite::Strict),
            session_gate,
        ));
    let routes = Router::new()
        .route("/boom", get(explode))
        .merge(guarded);

    with_pipeline(routes, config).layer(MockConnectInfo(SocketAddr::from((
        [10, 0, 0, 7],
        40000,
    ))))
}

#[tokio::test]
async fn test_completion_log_records_gate_rejection() {
    let logs = LogCapture::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let router = guarded_router(&RouterConfig::new());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/guarded")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let lines = logs.lines_with("Request completed");
    assert_eq!(lines.len(), 1, "{}", logs.contents());
    let line = &lines[0];
    assert!(line.contains("status=401"), "{}", line);
    assert!(line.contains("remote_addr=10.0.0.7:40000"), "{}", line);
    assert!(line.contains("method=POST"), "{}", line);
    assert!(line.contains("path=/guarded"), "{}", line);
}

#[tokio::test]
async fn test_completion_log_records_panic_as_500() {
    let logs = LogCapture::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let router = guarded_router(&RouterConfig::new().with_trust_forwarded_for(true));
    let response = router
        .oneshot(forwarded("/boom", "203.0.113.9"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let lines = logs.lines_with("Request completed");
    assert_eq!(lines.len(), 1, "{}", logs.contents());
    assert!(lines[0].contains("status=500"), "{}", lines[0]);
    assert!(lines[0].contains("remote_addr=203.0.113.9"), "{}", lines[0]);

    // The panic detail is logged inside the request span
    let panics = logs.lines_with("Request handler panicked");
    assert_eq!(panics.len(), 1, "{}", logs.contents());
    assert!(panics[0].contains("path=/boom"), "{}", panics[0]);
    assert!(panics[0].contains("handler exploded with secret detail"));
}

// =============================================================================
// Routing Edges
// =============================================================================

#[tokio::test]
async fn test_unknown_route_is_404_not_401() {
    let app = TestApp::new();

    let response = app.send(get_request("/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let app = TestApp::new().with_user("alice", "s3cret");

    let padding = "x".repeat(MAX_BODY_BYTES + 1);
    let body = serde_json::json!({ "name": "alice", "pass": padding }).to_string();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.sessions.is_empty());
}
