use thiserror::Error;

/// Errors raised by the SQL storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// A `UNIQUE` constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// No connection could be checked out of the pool
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Any other SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                StorageError::UniqueViolation(
                    message.clone().unwrap_or_else(|| code.to_string()),
                )
            }
            _ => StorageError::Sqlite(err),
        }
    }
}

/// Authentication and authorization failures.
///
/// Every variant except `InternalFault` is a client-facing outcome with a
/// stable status code. `InternalFault` carries detail for the server log only.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A user with the requested name already exists
    #[error("User with given name already exists")]
    DuplicateName,

    /// Missing, unparseable or wrong basic credentials
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// No session cookie on the request
    #[error("Missing session cookie")]
    MissingSession,

    /// Session token is unknown, revoked or past its expiry
    #[error("Session is invalid or has expired")]
    ExpiredSession,

    /// Session cookie is present but cannot be read
    #[error("Malformed session cookie")]
    MalformedSession,

    /// Unexpected failure (storage, hashing, task join)
    #[error("Internal fault: {0}")]
    InternalFault(String),
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UniqueViolation(_) => AuthError::DuplicateName,
            other => AuthError::InternalFault(other.to_string()),
        }
    }
}

/// Errors from the task repository
#[derive(Debug, Error)]
pub enum TaskError {
    /// No task with the given id
    #[error("Task not found: {id}")]
    NotFound { id: i64 },

    /// Calendar date does not exist (e.g. 2024/02/30)
    #[error("Invalid date: {year}/{month}/{day}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
