//! Credential store: user records and password verification.
//!
//! Passwords are stored as Argon2id PHC strings (salt and parameters embedded).
//! Verification parses the stored hash and lets Argon2 compare in constant
//! time; the hash text is never compared directly. Unknown names are checked
//! against a throwaway hash so that both outcomes cost one Argon2 run.

use std::fmt;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::params;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::AuthError;
use crate::storage::Database;

const CREATE_USER_TABLE: &str = "CREATE TABLE IF NOT EXISTS user (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    pass TEXT NOT NULL
);";

/// A registered user.
///
/// The password verifier stays inside the store; it is not part of this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

/// Owns user records and checks passwords against them.
#[derive(Clone)]
pub struct CredentialStore {
    db: Database,
    hasher: Argon2<'static>,

    /// Hash of a random secret, verified against when the name is unknown
    decoy_hash: String,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Create a store with the default Argon2id work factor, creating the
    /// `user` table if needed.
    pub fn new(db: Database) -> Result<Self, AuthError> {
        Self::with_hasher(db, Argon2::default())
    }

    /// Create a store with explicit Argon2 parameters.
    ///
    /// Hashes record their own parameters, so stores built with different
    /// hashers still verify each other's users.
    pub fn with_hasher(db: Database, hasher: Argon2<'static>) -> Result<Self, AuthError> {
        db.execute_batch(CREATE_USER_TABLE)?;

        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let decoy_hash = hash_password(&hasher, &secret)?;

        Ok(Self {
            db,
            hasher,
            decoy_hash,
        })
    }

    /// Register a new user.
    ///
    /// Duplicate names are rejected by the `UNIQUE` constraint on insert, so
    /// two concurrent registrations of the same name cannot both succeed.
    pub fn register(&self, name: &str, password: &str) -> Result<User, AuthError> {
        let hash = hash_password(&self.hasher, password.as_bytes())?;

        let outcome = self.db.execute(
            "INSERT INTO user (name, pass) VALUES (?1, ?2)",
            params![name, hash],
        )?;

        debug!(user = name, id = outcome.last_insert_id, "Registered user");
        Ok(User {
            id: outcome.last_insert_id,
            name: name.to_string(),
        })
    }

    /// Check a name/password pair, returning the user on a match.
    pub fn verify_credentials(&self, name: &str, password: &str) -> Option<User> {
        let row = self
            .db
            .query_optional(
                "SELECT id, name, pass FROM user WHERE name = ?1",
                params![name],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .map_err(|e| error!(user = name, "Credential lookup failed: {}", e))
            .ok()
            .flatten();

        let Some((id, name, stored)) = row else {
            self.verify_decoy(password);
            return None;
        };

        let parsed = match PasswordHash::new(&stored) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(user = %name, "Stored password hash is unreadable: {}", e);
                return None;
            }
        };

        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .ok()
            .map(|_| User { id, name })
    }

    fn verify_decoy(&self, password: &str) {
        if let Ok(parsed) = PasswordHash::new(&self.decoy_hash) {
            let _ = self.hasher.verify_password(password.as_bytes(), &parsed);
        }
    }

    /// Number of registered users.
    pub fn user_count(&self) -> Result<i64, AuthError> {
        let count = self
            .db
            .query_optional("SELECT COUNT(*) FROM user", [], |row| row.get(0))?;
        Ok(count.unwrap_or(0))
    }
}

fn hash_password(hasher: &Argon2<'static>, password: &[u8]) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(password, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::InternalFault(format!("password hashing failed: {}", e)))
}
