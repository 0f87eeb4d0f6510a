//! Router configuration for taskgate.
//!
//! This module defines the HTTP routes, binds each route group to its
//! authorization gate and wraps everything in the request pipeline.
//!
//! # Route Structure
//!
//! ```text
//! /health                      GET            public
//! /task                        GET, OPTIONS   public
//! /task                        POST           session gate
//! /task/{id}                   OPTIONS        public
//! /task/{id}                   PUT, DELETE    session gate
//! /todo, /done                 GET            public
//! /tag/{tag}                   GET            public
//! /due/{year}/{month}/{day}    GET            public
//! /login                       POST           public
//! /logout                      POST           session gate
//! /register                    POST           basic gate
//! ```
//!
//! # Example
//!
//! ```ignore
//! use taskgate::server::{create_router, AppState, RouterConfig};
//!
//! let state = AppState::new(credentials, sessions, tasks);
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://tasks.example.com".to_string()]);
//!
//! let router = create_router(state, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(
//!     listener,
//!     router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await?;
//! ```

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, options, post, put},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

use super::cors::{enforce_cors, CorsPolicy};
use super::gate::{basic_auth_gate, session_gate, BasicAuthGate, SessionGate};
use super::handlers::{
    create_task_handler, delete_task_handler, done_tasks_handler, due_tasks_handler,
    health_handler, list_tasks_handler, login_handler, logout_handler, preflight_handler,
    register_handler, tag_tasks_handler, todo_tasks_handler, update_task_handler, AppState,
};
use super::pipeline::{handle_panic, log_requests, resolve_client_ip, ClientIpConfig};
use crate::config::Environment;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1_000_000;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Selects cookie `SameSite` and whether `cors_open` is honored
    pub environment: Environment,

    /// Cross-origin allow-lists
    pub cors: CorsPolicy,

    /// Replace the CORS policy with a fully permissive one (development only)
    pub cors_open: bool,

    /// Attribute requests to the first `X-Forwarded-For` entry
    pub trust_forwarded_for: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Production defaults:
    /// - `SameSite=Strict` cookies
    /// - CORS allows `http://localhost:5173` only
    /// - forwarded-for headers are ignored
    pub fn new() -> Self {
        Self {
            environment: Environment::Production,
            cors: CorsPolicy::default(),
            cors_open: false,
            trust_forwarded_for: false,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_cors_policy(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    /// Set the allowed CORS origins, keeping the other allow-lists.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors.origins = origins;
        self
    }

    pub fn with_cors_open(mut self, open: bool) -> Self {
        self.cors_open = open;
        self
    }

    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// Whether the permissive CORS layer replaces the policy.
    pub fn permissive_cors(&self) -> bool {
        self.cors_open && self.environment == Environment::Development
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Each route group sits behind its gate; the whole router is then wrapped
/// by [`with_pipeline`].
pub fn create_router(state: AppState, config: RouterConfig) -> Router {
    let same_site = config.environment.same_site();
    let state = state.with_same_site(same_site);

    let basic_gate = BasicAuthGate::new(state.credentials.clone());
    let cookie_gate = SessionGate::new(Arc::clone(&state.sessions), same_site);

    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/task", get(list_tasks_handler).options(preflight_handler))
        .route("/task/{id}", options(preflight_handler))
        .route("/todo", get(todo_tasks_handler))
        .route("/done", get(done_tasks_handler))
        .route("/tag/{tag}", get(tag_tasks_handler))
        .route("/due/{year}/{month}/{day}", get(due_tasks_handler))
        .route("/login", post(login_handler));

    // route_layer so unmatched paths stay 404 instead of 401
    let session_routes = Router::new()
        .route("/task", post(create_task_handler))
        .route(
            "/task/{id}",
            put(update_task_handler).delete(delete_task_handler),
        )
        .route("/logout", post(logout_handler))
        .route_layer(middleware::from_fn_with_state(cookie_gate, session_gate));

    let basic_routes = Router::new()
        .route("/register", post(register_handler))
        .route_layer(middleware::from_fn_with_state(basic_gate, basic_auth_gate));

    let routes = Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(basic_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    with_pipeline(routes, &config)
}

/// Wrap `routes` in the request pipeline.
///
/// ```text
/// log_requests ─▶ CORS ─▶ resolve_client_ip ─▶ CatchPanicLayer ─▶ routes
/// ```
pub fn with_pipeline(routes: Router, config: &RouterConfig) -> Router {
    let router = routes
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(
            ClientIpConfig {
                trust_forwarded_for: config.trust_forwarded_for,
            },
            resolve_client_ip,
        ));

    let router = if config.permissive_cors() {
        router.layer(CorsLayer::very_permissive())
    } else {
        router.layer(middleware::from_fn_with_state(
            Arc::new(config.cors.clone()),
            enforce_cors,
        ))
    };

    router.layer(middleware::from_fn(log_requests))
}

// =============================================================================
// Tests
// =============================================================================
