//! CORS integration tests.
//!
//! Tests verify:
//! - Allow-listed origins are echoed exactly, never as a wildcard
//! - Other origins get no CORS headers but the request still proceeds
//! - Preflights advertise methods only for allow-listed request methods
//! - The permissive development policy

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};

use taskgate::{Environment, RouterConfig};

use super::test_utils::{body_bytes, TestApp, ALLOWED_ORIGIN};

fn from_origin(method: Method, uri: &str, origin: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::ORIGIN, origin)
        .body(Body::empty())
        .unwrap()
}

fn preflight(uri: &str, origin: &str, requested: &str) -> Request<Body> {
    Request::builder()
        .method(Method::OPTIONS)
        .uri(uri)
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, requested)
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap()
}

// =============================================================================
// Simple Requests
// =============================================================================

#[tokio::test]
async fn test_allowed_origin_is_echoed() {
    let app = TestApp::new();

    let response = app.send(from_origin(Method::GET, "/task", ALLOWED_ORIGIN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        ALLOWED_ORIGIN
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
    assert!(headers
        .get_all(header::VARY)
        .iter()
        .any(|v| v.to_str().unwrap().eq_ignore_ascii_case("origin")));
}

#[tokio::test]
async fn test_foreign_origin_gets_no_cors_headers() {
    let app = TestApp::new();

    let response = app
        .send(from_origin(Method::GET, "/task", "http://evil.example"))
        .await;

    // The request itself is not blocked
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(!headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert!(!headers.contains_key(header::ACCESS_CONTROL_ALLOW_CREDENTIALS));
    assert!(headers.contains_key(header::VARY));
}

#[tokio::test]
async fn test_same_origin_request_gets_no_cors_headers() {
    let app = TestApp::new();

    let response = app.send(super::test_utils::get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_configured_origins_replace_default() {
    let config = RouterConfig::new().with_cors_origins(vec!["https://tasks.example".to_string()]);
    let app = TestApp::with_config(config);

    let response = app
        .send(from_origin(Method::GET, "/task", "https://tasks.example"))
        .await;
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "https://tasks.example"
    );

    let response = app.send(from_origin(Method::GET, "/task", ALLOWED_ORIGIN)).await;
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

// =============================================================================
// Preflight
// =============================================================================

#[tokio::test]
async fn test_preflight_for_listed_method() {
    let app = TestApp::new();

    let response = app.send(preflight("/task/1", ALLOWED_ORIGIN, "DELETE")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let methods = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(methods.contains("DELETE"));
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        ALLOWED_ORIGIN
    );

    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_preflight_for_unlisted_method() {
    let app = TestApp::new();

    let response = app.send(preflight("/task/1", ALLOWED_ORIGIN, "PATCH")).await;
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_preflight_is_not_gated() {
    let app = TestApp::new();

    // No cookie, yet the preflight for a session-gated route succeeds
    let response = app.send(preflight("/task", ALLOWED_ORIGIN, "POST")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_preflight_from_foreign_origin() {
    let app = TestApp::new();

    let response = app
        .send(preflight("/task", "http://evil.example", "DELETE"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    assert!(body_bytes(response).await.is_empty());
}

// =============================================================================
// Development Mode
// =============================================================================

#[tokio::test]
async fn test_open_cors_in_development() {
    let config = RouterConfig::new()
        .with_environment(Environment::Development)
        .with_cors_open(true);
    let app = TestApp::with_config(config);

    let response = app
        .send(from_origin(Method::GET, "/task", "http://192.168.1.20:5173"))
        .await;
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://192.168.1.20:5173"
    );
}

#[tokio::test]
async fn test_open_cors_ignored_in_production() {
    let config = RouterConfig::new().with_cors_open(true);
    let app = TestApp::with_config(config);

    let response = app
        .send(from_origin(Method::GET, "/task", "http://192.168.1.20:5173"))
        .await;
    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
