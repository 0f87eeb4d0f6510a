//! Configuration management for taskgate.
//!
//! Command-line arguments via clap, with environment variable fallbacks under
//! the `TASKGATE_` prefix and defaults for everything.
//!
//! # Commands
//!
//! ```text
//! taskgate [serve] [options]     run the HTTP service (default)
//! taskgate add-user --name ...   create an account directly in the database
//! ```
//!
//! `add-user` exists because `/register` itself requires basic credentials,
//! so the first account has to come from somewhere else.
//!
//! # Environment Variables
//!
//! - `TASKGATE_HOST` - Bind address (default: localhost)
//! - `TASKGATE_PORT` - Port (default: 8080)
//! - `TASKGATE_DATABASE` - SQLite file (default: ./db.sq3)
//! - `TASKGATE_ENVIRONMENT` - `production` or `development`
//! - `TASKGATE_SESSION_TTL_MINS` - Session lifetime (default: 60)
//! - `TASKGATE_CORS_ORIGINS` - Comma-separated allowed origins
//! - `TASKGATE_TRUST_FORWARDED_FOR` - Honor `X-Forwarded-For` (default: false)

use std::str::FromStr;

use axum_extra::extract::cookie::SameSite;
use clap::{Args, Parser, Subcommand, ValueEnum};
use http::{HeaderName, Method};

use crate::auth::{DEFAULT_SESSION_TTL_MINS, MAX_SESSION_TTL_MINS};
use crate::server::{CorsPolicy, RouterConfig};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default SQLite database path.
pub const DEFAULT_DATABASE: &str = "./db.sq3";

/// Default allowed CORS origin (the frontend dev server).
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173";

pub const DEFAULT_CORS_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";

pub const DEFAULT_CORS_HEADERS: &str = "Authorization,Content-Type";

/// Default interval between expired-session sweeps.
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Environment
// =============================================================================

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    /// `SameSite` attribute for session cookies.
    ///
    /// Development runs the frontend on another origin, which needs `None`.
    pub fn same_site(self) -> SameSite {
        match self {
            Environment::Production => SameSite::Strict,
            Environment::Development => SameSite::None,
        }
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// taskgate - a multi-user task list service.
#[derive(Parser, Debug, Clone)]
#[command(name = "taskgate")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    // Options for the implicit `serve` command
    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// The command to run; `serve` when none was given.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP service
    Serve(ServeConfig),

    /// Create a user account directly in the database
    AddUser(AddUserConfig),
}

/// Options for `taskgate serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TASKGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TASKGATE_PORT")]
    pub port: u16,

    /// SQLite database file.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "TASKGATE_DATABASE")]
    pub database: String,

    /// Deployment environment; selects cookie SameSite and allows --cors-open.
    #[arg(long, value_enum, default_value = "production", env = "TASKGATE_ENVIRONMENT")]
    pub environment: Environment,

    // =========================================================================
    // Session Configuration
    // =========================================================================
    /// Session lifetime in minutes.
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_MINS, env = "TASKGATE_SESSION_TTL_MINS")]
    pub session_ttl_mins: i64,

    /// Seconds between sweeps of expired sessions.
    #[arg(long, default_value_t = DEFAULT_PURGE_INTERVAL_SECS, env = "TASKGATE_PURGE_INTERVAL_SECS")]
    pub purge_interval_secs: u64,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated, exact match).
    #[arg(
        long,
        value_delimiter = ',',
        default_value = DEFAULT_CORS_ORIGINS,
        env = "TASKGATE_CORS_ORIGINS"
    )]
    pub cors_origins: Vec<String>,

    /// Methods advertised to preflight requests (comma-separated).
    #[arg(
        long,
        value_delimiter = ',',
        default_value = DEFAULT_CORS_METHODS,
        env = "TASKGATE_CORS_METHODS"
    )]
    pub cors_methods: Vec<String>,

    /// Request headers allowed from permitted origins (comma-separated).
    #[arg(
        long,
        value_delimiter = ',',
        default_value = DEFAULT_CORS_HEADERS,
        env = "TASKGATE_CORS_HEADERS"
    )]
    pub cors_headers: Vec<String>,

    /// Send `Access-Control-Allow-Credentials: true` to permitted origins.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "TASKGATE_CORS_ALLOW_CREDENTIALS"
    )]
    pub cors_allow_credentials: bool,

    /// Allow any origin. Only honored with --environment development.
    #[arg(long, default_value_t = false, env = "TASKGATE_CORS_OPEN")]
    pub cors_open: bool,

    // =========================================================================
    // Network Configuration
    // =========================================================================
    /// Attribute requests to the first X-Forwarded-For entry.
    ///
    /// Enable only behind a reverse proxy that sets the header itself.
    #[arg(long, default_value_t = false, env = "TASKGATE_TRUST_FORWARDED_FOR")]
    pub trust_forwarded_for: bool,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.is_empty() {
            return Err("database path must not be empty".to_string());
        }

        if self.session_ttl_mins <= 0 {
            return Err("session_ttl_mins must be greater than 0".to_string());
        }

        if self.session_ttl_mins > MAX_SESSION_TTL_MINS {
            return Err(format!(
                "session_ttl_mins must be at most {} (one year)",
                MAX_SESSION_TTL_MINS
            ));
        }

        if self.purge_interval_secs == 0 {
            return Err("purge_interval_secs must be greater than 0".to_string());
        }

        if self.cors_open && self.environment == Environment::Production {
            return Err(
                "--cors-open is only allowed with --environment development".to_string(),
            );
        }

        self.cors_policy().map(|_| ())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the CORS allow-lists, rejecting unparseable method or header names.
    pub fn cors_policy(&self) -> Result<CorsPolicy, String> {
        let methods = self
            .cors_methods
            .iter()
            .map(|m| {
                let m = m.trim().to_ascii_uppercase();
                Method::from_str(&m).map_err(|_| format!("invalid CORS method: {:?}", m))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let headers = self
            .cors_headers
            .iter()
            .map(|h| {
                HeaderName::from_str(h.trim()).map_err(|_| format!("invalid CORS header: {:?}", h))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CorsPolicy {
            origins: self
                .cors_origins
                .iter()
                .map(|o| o.trim())
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            methods,
            headers,
            allow_credentials: self.cors_allow_credentials,
        })
    }

    /// Router settings derived from this configuration.
    pub fn router_config(&self) -> Result<RouterConfig, String> {
        Ok(RouterConfig::new()
            .with_environment(self.environment)
            .with_cors_policy(self.cors_policy()?)
            .with_cors_open(self.cors_open)
            .with_trust_forwarded_for(self.trust_forwarded_for))
    }
}

/// Options for `taskgate add-user`.
#[derive(Args, Clone)]
pub struct AddUserConfig {
    /// SQLite database file.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "TASKGATE_DATABASE")]
    pub database: String,

    /// Name of the new user.
    #[arg(long)]
    pub name: String,

    /// Password of the new user.
    #[arg(long, env = "TASKGATE_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl std::fmt::Debug for AddUserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddUserConfig")
            .field("database", &self.database)
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AddUserConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.password.is_empty() {
            return Err("password must not be empty".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
