//! taskgate - a multi-user task list service.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskgate::{
    config::{AddUserConfig, Cli, Command, Environment, ServeConfig},
    create_router, AppState, AuthError, CredentialStore, Database, SessionRegistry, TaskStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::AddUser(config) => run_add_user(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let router_config = match config.router_config() {
        Ok(router_config) => router_config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("taskgate v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Database: {}", config.database);
    info!("  Environment: {:?}", config.environment);
    info!("  Session TTL: {} min", config.session_ttl_mins);
    if router_config.permissive_cors() {
        warn!("  CORS: OPEN - any origin may make credentialed requests");
    } else {
        info!("  CORS origins: {:?}", router_config.cors.origins);
    }
    if config.trust_forwarded_for {
        warn!("  Trusting X-Forwarded-For; run behind a proxy that sets it");
    }
    if config.environment == Environment::Development {
        warn!("  Development mode: session cookies use SameSite=None");
    }

    let db = match Database::open(&config.database) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database {}: {}", config.database, e);
            return ExitCode::FAILURE;
        }
    };

    let credentials = match CredentialStore::new(db.clone()) {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("Failed to prepare user table: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match credentials.user_count() {
        Ok(0) => warn!("  No users yet; create one with `taskgate add-user`"),
        Ok(count) => info!("  Users: {}", count),
        Err(e) => warn!("  Could not count users: {}", e),
    }

    let tasks = match TaskStore::new(db) {
        Ok(tasks) => tasks,
        Err(e) => {
            error!("Failed to prepare task table: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let sessions = Arc::new(SessionRegistry::with_ttl(chrono::Duration::minutes(
        config.session_ttl_mins,
    )));
    spawn_session_purge(
        Arc::clone(&sessions),
        Duration::from_secs(config.purge_interval_secs),
    );

    let state = AppState::new(credentials, sessions, tasks);
    let router = create_router(state, router_config);

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);

    let service = router.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, service).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Periodically drop expired sessions that were never looked up again.
fn spawn_session_purge(sessions: Arc<SessionRegistry>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = sessions.len(), "Purged expired sessions");
            }
        }
    });
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "taskgate=debug,tower_http=debug"
    } else {
        "taskgate=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Add-User Command
// =============================================================================

fn run_add_user(config: AddUserConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = Database::open(&config.database)
        .map_err(AuthError::from)
        .and_then(CredentialStore::new)
        .and_then(|credentials| credentials.register(&config.name, &config.password));

    match result {
        Ok(user) => {
            println!("✓ Created user '{}' (id {})", user.name, user.id);
            ExitCode::SUCCESS
        }
        Err(AuthError::DuplicateName) => {
            eprintln!("✗ A user named '{}' already exists", config.name);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("✗ Failed to create user: {}", e);
            ExitCode::FAILURE
        }
    }
}
