//! infergate-server - Inference gateway HTTP server
//!
//! Completion, chat, command and context memory API over TCP.

use anyhow::Context;
use infergate_core::auth::ServiceToken;
use infergate_core::{Database, Engine};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod error;
mod middleware;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("infergate_server=info".parse()?))
        .init();

    info!("infergate-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load()?;
    info!("Config loaded from {:?}", config.config_source());

    let database_path = config.database_path();
    let db = Database::open_path(&database_path)
        .with_context(|| format!("Failed to open database at {}", database_path.display()))?;
    info!("Database at {}", database_path.display());

    let backend = config.backend.build()?;
    let engine = Engine::start(Arc::new(db), backend, config.engine_config())?;

    // Fresh service token on every start
    let service_token = ServiceToken::generate();
    let token_file = config.service_token_file();
    service_token
        .write_to_file(&token_file)
        .with_context(|| format!("Failed to write service token to {}", token_file.display()))?;
    info!("Service token written to {}", token_file.display());

    let listen = config.server.listen.clone();
    let state = AppState::new(config, engine, service_token);

    let tokens = state.engine.database().list_principal_tokens(None)?;
    state.principal_tokens.load_from_db(tokens).await;
    info!("Loaded {} principal tokens", state.principal_tokens.len().await);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, routes::create_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    if let Err(e) = state.engine.shutdown() {
        warn!("Engine shutdown incomplete: {}", e);
    }
    if let Err(e) = std::fs::remove_file(&token_file) {
        warn!("Failed to remove service token file: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
