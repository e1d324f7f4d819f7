//! Flowsim server binary.
//!
//! Wires configuration, the startup world, the tick and broadcast loops,
//! and the session server together, then runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `FLOWSIM_CONFIG` or `flowsim-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the world from the level file or a fresh variant
//! 4. Create control state and the shared application state
//! 5. Bind the session server
//! 6. Spawn the tick and broadcast loops
//! 7. Wait for `Ctrl-C`, then signal shutdown and join everything

mod bootstrap;
mod error;

use std::sync::Arc;

use anyhow::Context;
use flowsim_core::{ControlState, FlowConfig, WorldState, run_broadcast_loop, run_tick_loop};
use flowsim_observer::{AppState, ServerConfig, spawn_server};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the startup level, or binding the
/// listener fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration. Logging depends on it, so failures here go to stderr.
    let config_path = bootstrap::config_path(|key| std::env::var(key).ok());
    let config = bootstrap::load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // 2. Logging.
    init_tracing(&config);
    info!(
        config = %config_path.display(),
        host = %config.server.host,
        port = config.server.port,
        tick_hz = config.simulation.tick_hz,
        snapshot_hz = config.simulation.snapshot_hz,
        "flowsim-engine starting"
    );

    // 3. World.
    let world = bootstrap::build_world(&config)?;
    let shared = WorldState::new(world, config.materials.clone()).into_shared();

    // 4. Control and application state.
    let control = Arc::new(ControlState::new(
        config.simulation.tick_hz,
        config.simulation.max_tick_hz,
        config.simulation.start_paused,
    ));
    let app_state = Arc::new(AppState::new(
        Arc::clone(&shared),
        Arc::clone(&control),
        config.server.save_dir.clone(),
    ));

    // 5. Session server.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let server = spawn_server(&server_config, Arc::clone(&app_state), shutdown_rx.clone())
        .await
        .map_err(EngineError::from)?;

    // 6. Loops.
    let ticker = tokio::spawn(run_tick_loop(
        Arc::clone(&shared),
        Arc::clone(&control),
        shutdown_rx.clone(),
    ));
    let broadcaster = tokio::spawn(run_broadcast_loop(
        shared,
        config.simulation.snapshot_hz,
        Arc::clone(&app_state),
        shutdown_rx,
    ));

    // 7. Shutdown.
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown requested");
    // Receivers are held by the tasks joined below.
    let _ = shutdown_tx.send(true);
    app_state.close_all().await;

    let tick_report = ticker.await.context("tick loop panicked")?;
    let broadcast_report = broadcaster.await.context("broadcast loop panicked")?;
    server.await.context("server task panicked")?;

    info!(
        ticks = tick_report.iterations,
        broadcasts = broadcast_report.iterations,
        "flowsim-engine shutdown complete"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(config: &FlowConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
