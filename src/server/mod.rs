//! HTTP server layer for taskgate.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  pipeline: log_requests ─▶ cors ─▶ resolve_client_ip ─▶ panic   │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │    gate     │  │  handlers   │  │        routes           │  │
//! │  │ basic/cookie│  │ (tasks,auth)│  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cors;
pub mod gate;
pub mod handlers;
pub mod pipeline;
pub mod routes;

pub use cors::{enforce_cors, CorsPolicy};
pub use gate::{
    basic_auth_gate, session_gate, AuthMethod, AuthenticatedUser, BasicAuthGate, SessionGate,
    BASIC_CHALLENGE, SESSION_COOKIE,
};
pub use handlers::{ApiError, AppState, CredentialsRequest, ErrorResponse, INTERNAL_FAULT_MESSAGE};
pub use pipeline::{handle_panic, log_requests, resolve_client_ip, ClientAddr, ClientIpConfig};
pub use routes::{create_router, with_pipeline, RouterConfig, MAX_BODY_BYTES};

use crate::error::AuthError;

/// Run blocking work (Argon2, SQLite) off the async workers.
///
/// A panic in `f` is resumed on the calling task so that panic isolation sees
/// it like any other handler panic.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Ok(value),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(AuthError::InternalFault(format!(
            "blocking task cancelled: {}",
            err
        ))),
    }
}
