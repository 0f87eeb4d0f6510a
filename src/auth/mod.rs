//! Authentication core: who a caller is, and for how long we believe it.
//!
//! - [`credentials`] - user records with Argon2id password verifiers
//! - [`session`] - in-memory session registry with a fixed TTL and lazy expiry
//!
//! The HTTP-facing gates that consume these live in [`crate::server::gate`].

pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, User};
pub use session::{
    Clock, ManualClock, Session, SessionRegistry, SystemClock, DEFAULT_SESSION_TTL_MINS,
    MAX_SESSION_TTL_MINS,
};
