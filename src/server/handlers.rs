//! HTTP request handlers for the task API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /task`, `/todo`, `/done`, `/tag/{tag}`, `/due/{y}/{m}/{d}` - Listings
//! - `POST /task`, `PUT|DELETE /task/{id}` - Mutations (session gate)
//! - `POST /register` - Create a user (basic gate)
//! - `POST /login`, `POST /logout` - Session lifecycle

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::gate::{clear_session_cookie, session_cookie, AuthenticatedUser};
use super::pipeline::internal_fault_response;
use super::run_blocking;
use crate::auth::{CredentialStore, SessionRegistry, User};
use crate::error::{AuthError, TaskError};
use crate::tasks::{Task, TaskInput, TaskStore};

/// Body sent with every 500; details stay in the server log.
pub const INTERNAL_FAULT_MESSAGE: &str =
    "Oops! We made a mistake and are working on fixing it ASAP!";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state, passed to handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub credentials: CredentialStore,

    pub sessions: Arc<SessionRegistry>,

    pub tasks: TaskStore,

    /// `SameSite` attribute for session cookies (Strict in production)
    pub same_site: SameSite,
}

impl AppState {
    pub fn new(credentials: CredentialStore, sessions: Arc<SessionRegistry>, tasks: TaskStore) -> Self {
        Self {
            credentials,
            sessions,
            tasks,
            same_site: SameSite::Strict,
        }
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }
}

// =============================================================================
// Request / Response Types
// =============================================================================

/// Name and password, as posted to `/register` and `/login`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsRequest {
    pub name: String,
    pub pass: String,
}

/// JSON error response returned for all error conditions except session
/// gate rejections, which have empty bodies.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert AuthError to HTTP response.
///
/// Session failures carry no body. Internal faults are logged with their
/// detail and rendered as the generic apology.
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AuthError::MissingSession | AuthError::ExpiredSession => {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            AuthError::MalformedSession => return StatusCode::BAD_REQUEST.into_response(),
            AuthError::InternalFault(detail) => {
                error!(error_type = "internal_error", "Server error: {}", detail);
                return internal_fault_response();
            }
            AuthError::DuplicateName => (StatusCode::BAD_REQUEST, "duplicate_name"),
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
        };

        let message = self.to_string();
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

/// Convert TaskError to HTTP response.
impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TaskError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            TaskError::InvalidDate { .. } => (StatusCode::BAD_REQUEST, "invalid_date"),
            TaskError::Storage(err) => {
                error!(error_type = "storage_error", "Server error: {}", err);
                return internal_fault_response();
            }
        };

        let message = self.to_string();
        if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Task(TaskError),
    /// Request was well-formed JSON but semantically unacceptable
    BadRequest(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(err) => err.into_response(),
            ApiError::Task(err) => err.into_response(),
            ApiError::BadRequest(message) => {
                let status = StatusCode::BAD_REQUEST;
                warn!(status = status.as_u16(), "Client error: {}", message);
                let error_response = ErrorResponse::with_status("invalid_request", message, status);
                (status, Json(error_response)).into_response()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        ApiError::Task(err)
    }
}

// =============================================================================
// Public Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler() -> &'static str {
    "OK"
}

/// `OPTIONS /task`, `OPTIONS /task/{id}`: empty 200 for preflights from
/// origins the CORS stage did not answer itself.
pub async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

/// `GET /task`
pub async fn list_tasks_handler(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.tasks.clone();
    Ok(Json(run_blocking(move || tasks.all()).await??))
}

/// `GET /todo`
pub async fn todo_tasks_handler(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ApiError> {
    tasks_by_done(state, false).await
}

/// `GET /done`
pub async fn done_tasks_handler(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ApiError> {
    tasks_by_done(state, true).await
}

async fn tasks_by_done(state: AppState, done: bool) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.tasks.clone();
    Ok(Json(run_blocking(move || tasks.by_done(done)).await??))
}

/// `GET /tag/{tag}`
///
/// `tag` may be a comma-separated list; a task matches if it carries any.
pub async fn tag_tasks_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tags: Vec<String> = tag
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let tasks = state.tasks.clone();
    Ok(Json(run_blocking(move || tasks.by_tags(&tags)).await??))
}

/// `GET /due/{year}/{month}/{day}`
pub async fn due_tasks_handler(
    State(state): State<AppState>,
    Path((year, month, day)): Path<(i32, u32, u32)>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.tasks.clone();
    Ok(Json(
        run_blocking(move || tasks.by_due(year, month, day)).await??,
    ))
}

// =============================================================================
// Session-Gated Handlers
// =============================================================================

/// `POST /task`
pub async fn create_task_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<TaskInput>,
) -> Result<Json<Task>, ApiError> {
    let tasks = state.tasks.clone();
    let task = run_blocking(move || tasks.create(input)).await??;

    info!(user = %user.name, id = task.id, "Created task");
    Ok(Json(task))
}

/// `PUT /task/{id}`
pub async fn update_task_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<TaskInput>,
) -> Result<Json<Task>, ApiError> {
    let tasks = state.tasks.clone();
    let task = run_blocking(move || tasks.update(id, input)).await??;

    info!(user = %user.name, id, "Updated task");
    Ok(Json(task))
}

/// `DELETE /task/{id}`
pub async fn delete_task_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let tasks = state.tasks.clone();
    run_blocking(move || tasks.delete(id)).await??;

    info!(user = %user.name, id, "Deleted task");
    Ok(StatusCode::OK)
}

/// `POST /logout`
///
/// Revokes the caller's session and clears the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    user: AuthenticatedUser,
) -> (CookieJar, StatusCode) {
    if let Some(session) = user.session() {
        state.sessions.revoke(&session.token);
        info!(user = %user.name, "Logged out");
    }

    (jar.add(clear_session_cookie(state.same_site)), StatusCode::OK)
}

// =============================================================================
// Account Handlers
// =============================================================================

/// `POST /register` (basic gate)
///
/// # Response
///
/// - `200 OK`: JSON `{ "id": .., "name": .. }`
/// - `400 Bad Request`: empty name or password, or the name is taken
pub async fn register_handler(
    State(state): State<AppState>,
    registrar: AuthenticatedUser,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<User>, ApiError> {
    if request.name.is_empty() {
        return Err(ApiError::BadRequest("Name must not be empty"));
    }
    if request.pass.is_empty() {
        return Err(ApiError::BadRequest("Password must not be empty"));
    }

    let credentials = state.credentials.clone();
    let user = run_blocking(move || credentials.register(&request.name, &request.pass)).await??;

    info!(user = %user.name, registrar = %registrar.name, "Registered user");
    Ok(Json(user))
}

/// `POST /login`
///
/// On success issues a session, sets the `session_token` cookie and returns
/// the user name as plain text. Failure is a 401 without a basic challenge.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<CredentialsRequest>,
) -> Result<(CookieJar, String), ApiError> {
    let credentials = state.credentials.clone();
    let name = request.name;
    let verified = run_blocking(move || credentials.verify_credentials(&name, &request.pass)).await?;

    let Some(user) = verified else {
        warn!("Login rejected: invalid credentials");
        return Err(AuthError::InvalidCredentials.into());
    };

    let session = state.sessions.issue(&user.name);
    info!(user = %user.name, expires_at = %session.expires_at, "Issued session");

    let cookie = match session_cookie(&session, state.same_site) {
        Ok(cookie) => cookie,
        Err(err) => {
            state.sessions.revoke(&session.token);
            return Err(err.into());
        }
    };

    Ok((jar.add(cookie), user.name))
}

// =============================================================================
// Tests
// =============================================================================
