//! Credential and login integration tests.
//!
//! Tests verify:
//! - The basic gate on `/register` (challenge, wrong password, success)
//! - Registration rules (empty password, duplicate name)
//! - `/login` issuing a session cookie with the right attributes

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum_extra::extract::cookie::SameSite;

use taskgate::{Environment, RouterConfig};

use super::test_utils::{
    basic_auth, body_json, body_string, json_request, session_cookie, TestApp,
};

fn register_request(auth: Option<String>, name: &str, pass: &str) -> Request<Body> {
    let mut request = json_request(
        Method::POST,
        "/register",
        serde_json::json!({ "name": name, "pass": pass }),
    );
    if let Some(auth) = auth {
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, auth.parse().unwrap());
    }
    request
}

// =============================================================================
// Basic Gate
// =============================================================================

#[tokio::test]
async fn test_register_without_credentials_is_challenged() {
    let app = TestApp::new().with_user("admin", "root-pw");

    let response = app.send(register_request(None, "bob", "pw")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        r#"Basic realm="api""#
    );

    assert!(app.credentials.verify_credentials("bob", "pw").is_none());
}

#[tokio::test]
async fn test_register_with_wrong_password_is_challenged() {
    let app = TestApp::new().with_user("admin", "root-pw");

    let response = app
        .send(register_request(
            Some(basic_auth("admin", "not-it")),
            "bob",
            "pw",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    assert_eq!(app.credentials.user_count().unwrap(), 1);
}

#[tokio::test]
async fn test_register_with_unknown_user_is_challenged() {
    let app = TestApp::new();

    let response = app
        .send(register_request(Some(basic_auth("ghost", "pw")), "bob", "pw"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_with_valid_credentials() {
    let app = TestApp::new().with_user("admin", "root-pw");

    let response = app
        .send(register_request(
            Some(basic_auth("admin", "root-pw")),
            "bob",
            "bob-pw",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let user = body_json(response).await;
    assert_eq!(user["name"], "bob");

    assert!(app.credentials.verify_credentials("bob", "bob-pw").is_some());
    // Basic auth never creates a session
    assert!(app.sessions.is_empty());
}

#[tokio::test]
async fn test_register_empty_password_rejected() {
    let app = TestApp::new().with_user("admin", "root-pw");

    let response = app
        .send(register_request(
            Some(basic_auth("admin", "root-pw")),
            "bob",
            "",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.credentials.user_count().unwrap(), 1);
}

#[tokio::test]
async fn test_register_duplicate_name_rejected() {
    let app = TestApp::new()
        .with_user("admin", "root-pw")
        .with_user("bob", "first");

    let response = app
        .send(register_request(
            Some(basic_auth("admin", "root-pw")),
            "bob",
            "second",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error = body_json(response).await;
    assert_eq!(error["error"], "duplicate_name");

    assert_eq!(app.credentials.user_count().unwrap(), 2);
    assert!(app.credentials.verify_credentials("bob", "first").is_some());
}

#[tokio::test]
async fn test_register_requires_json_content_type() {
    let app = TestApp::new().with_user("admin", "root-pw");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/register")
        .header(header::AUTHORIZATION, basic_auth("admin", "root-pw"))
        .body(Body::from(r#"{"name":"bob","pass":"pw"}"#))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_issues_session_cookie() {
    let app = TestApp::new().with_user("alice", "s3cret");

    let response = app
        .send(json_request(
            Method::POST,
            "/login",
            serde_json::json!({ "name": "alice", "pass": "s3cret" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = session_cookie(&response).unwrap();
    assert_eq!(cookie.value().len(), 64);
    assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.path(), Some("/"));

    let session = app.sessions.lookup(cookie.value()).unwrap();
    assert_eq!(session.username, "alice");
    assert_eq!(
        cookie.expires_datetime().map(|t| t.unix_timestamp()),
        Some(session.expires_at.timestamp())
    );

    assert_eq!(body_string(response).await, "alice");
}

#[tokio::test]
async fn test_login_in_development_uses_samesite_none() {
    let config = RouterConfig::new().with_environment(Environment::Development);
    let app = TestApp::with_config(config).with_user("alice", "s3cret");

    let response = app
        .send(json_request(
            Method::POST,
            "/login",
            serde_json::json!({ "name": "alice", "pass": "s3cret" }),
        ))
        .await;

    let cookie = session_cookie(&response).unwrap();
    assert_eq!(cookie.same_site(), Some(SameSite::None));
    assert_eq!(cookie.secure(), Some(true));
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = TestApp::new().with_user("alice", "s3cret");

    let response = app
        .send(json_request(
            Method::POST,
            "/login",
            serde_json::json!({ "name": "alice", "pass": "guess" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&response).is_none());
    // No browser credential prompt for the login form
    assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
    assert!(app.sessions.is_empty());
}

#[tokio::test]
async fn test_each_login_gets_a_distinct_session() {
    let app = TestApp::new().with_user("alice", "s3cret");

    let first = app.login("alice", "s3cret").await;
    let second = app.login("alice", "s3cret").await;

    assert_ne!(first, second);
    assert_eq!(app.sessions.len(), 2);
}

#[tokio::test]
async fn test_login_rejects_unknown_fields() {
    let app = TestApp::new().with_user("alice", "s3cret");

    let response = app
        .send(json_request(
            Method::POST,
            "/login",
            serde_json::json!({ "name": "alice", "pass": "s3cret", "admin": true }),
        ))
        .await;
    assert!(response.status().is_client_error());
    assert!(app.sessions.is_empty());
}
