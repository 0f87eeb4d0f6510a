//! Session registry: token issuance, lookup, expiry and revocation.
//!
//! The registry is the only shared mutable state in the authorization layer.
//! All operations take the same mutex for their full duration, so a token is
//! either present and live or absent; there is no partially-deleted state.
//!
//! # Lifecycle
//!
//! ```text
//!   issue() ──▶ Active ──(expiry <= now, seen by lookup)──▶ removed
//!                  │
//!                  └────────────(revoke)────────────────▶ removed
//! ```
//!
//! Expiry is lazy: an expired entry is dropped the first time `lookup` or
//! `validate` sees it. [`SessionRegistry::purge_expired`] can sweep in bulk.
//! Lookups never extend the expiry.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;

/// Default session lifetime in minutes.
pub const DEFAULT_SESSION_TTL_MINS: i64 = 60;

/// Longest accepted session lifetime in minutes (one year).
pub const MAX_SESSION_TTL_MINS: i64 = 60 * 24 * 365;

/// Random bytes per token (256 bits), hex-encoded on the wire.
const TOKEN_BYTES: usize = 32;

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// =============================================================================
// Session
// =============================================================================

/// A live proof of authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque lookup key, also the cookie value
    pub token: String,

    /// Name of the authenticated user
    pub username: String,

    /// Absolute instant after which the session is dead
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    username: String,
    expires_at: DateTime<Utc>,
}

// =============================================================================
// Registry
// =============================================================================

/// Concurrency-safe token → session map with a fixed TTL.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("ttl", &self.ttl)
            .field("sessions", &self.len())
            .finish()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Registry with the default 60 minute TTL and the system clock.
    pub fn new() -> Self {
        Self::with_ttl(Duration::minutes(DEFAULT_SESSION_TTL_MINS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// `ttl` is capped at [`MAX_SESSION_TTL_MINS`].
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: ttl.min(Duration::minutes(MAX_SESSION_TTL_MINS)),
            clock,
        }
    }

    /// Session lifetime applied at issuance.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a new session for `username`.
    pub fn issue(&self, username: &str) -> Session {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut sessions = self.sessions.lock();

        loop {
            let token = generate_token();
            if let Entry::Vacant(slot) = sessions.entry(token.clone()) {
                slot.insert(SessionEntry {
                    username: username.to_string(),
                    expires_at,
                });
                return Session {
                    token,
                    username: username.to_string(),
                    expires_at,
                };
            }
        }
    }

    /// Whether `token` names a live session. Drops the entry if it has expired.
    pub fn validate(&self, token: &str) -> bool {
        self.lookup(token).is_some()
    }

    /// Return the live session for `token`, dropping it if it has expired.
    pub fn lookup(&self, token: &str) -> Option<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock();

        let entry = sessions.get(token)?;
        if entry.expires_at <= now {
            sessions.remove(token);
            return None;
        }

        Some(Session {
            token: token.to_string(),
            username: entry.username.clone(),
            expires_at: entry.expires_at,
        })
    }

    /// End a session. Revoking an unknown token is a no-op.
    pub fn revoke(&self, token: &str) {
        self.sessions.lock().remove(token);
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.expires_at > now);
        before - sessions.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// =============================================================================
// Tests
// =============================================================================
