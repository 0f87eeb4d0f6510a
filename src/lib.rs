//! # taskgate
//!
//! A multi-user task-list service with an authorization layer in front of it.
//!
//! ## Features
//!
//! - **Credential store**: users with Argon2id password verifiers in SQLite
//! - **Sessions**: in-memory registry of random 256-bit tokens with a fixed TTL
//! - **Two gates**: HTTP basic credentials or a `session_token` cookie, chosen per route group
//! - **CORS**: runtime allow-lists, exact origin echo, never a wildcard
//! - **Pipeline**: request logging, client address resolution and panic isolation
//!
//! ## Architecture
//!
//! - [`auth`] - Credential store and session registry
//! - [`storage`] - Pooled SQLite access
//! - [`tasks`] - Task repository
//! - [`server`] - Axum gates, CORS, pipeline, handlers and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskgate::{create_router, AppState, CredentialStore, Database, RouterConfig, SessionRegistry, TaskStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::open("./db.sq3")?;
//!     let state = AppState::new(
//!         CredentialStore::new(db.clone())?,
//!         Arc::new(SessionRegistry::new()),
//!         TaskStore::new(db)?,
//!     );
//!
//!     let router = create_router(state, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("localhost:8080").await?;
//!     axum::serve(
//!         listener,
//!         router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod storage;
pub mod tasks;

// Re-export commonly used types
pub use auth::{Clock, CredentialStore, ManualClock, Session, SessionRegistry, SystemClock, User};
pub use config::{AddUserConfig, Cli, Command, Environment, ServeConfig};
pub use error::{AuthError, StorageError, TaskError};
pub use server::{
    basic_auth_gate, create_router, session_gate, AppState, AuthenticatedUser, CorsPolicy,
    ErrorResponse, RouterConfig,
};
pub use storage::{Database, WriteOutcome};
pub use tasks::{Task, TaskInput, TaskStore};
