//! Round Sync Server - authoritative round-synchronized match server
//!
//! Entry point. It wires together:
//! - the per-game round actors and their ephemeral store
//! - the durable match archive (Supabase or in-process)
//! - HTTP and WebSocket surfaces for clients

mod app;
mod config;
mod game;
mod http;
mod store;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::{Config, LogFormat};
use crate::http::build_router;
use crate::store::{EphemeralStore, MatchArchive, MemoryArchive, SupabaseArchive, SupabaseClient};
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level, config.log_format);
    init_server_time();

    info!("Starting Round Sync Server");
    info!("Server address: {}", config.server_addr);

    let balance = config.load_balance()?;
    info!(
        max_rounds = balance.max_rounds,
        max_level = balance.max_level(),
        respawn_delay = balance.respawn_delay_rounds,
        "Balance table loaded"
    );

    let archive: Arc<dyn MatchArchive> = match &config.supabase {
        Some(settings) => {
            info!(url = %settings.url, "Using Supabase match archive");
            Arc::new(SupabaseArchive::new(SupabaseClient::new(settings)?))
        }
        None => {
            warn!("SUPABASE_URL not set, match history is kept in memory only");
            Arc::new(MemoryArchive::new())
        }
    };

    let store = Arc::new(EphemeralStore::new(config.snapshot_ttl));
    let sweeper = store.clone().spawn_sweeper(config.store_sweep_interval);

    let state = AppState::new(config.clone(), balance, store, archive);
    let router = build_router(state);

    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json().with_target(true))),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty)
        .with(json)
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
