//! Server startup helper for the engine binary.
//!
//! [`spawn_server`] binds eagerly, so a bad address or a busy port fails
//! startup instead of a background task, then serves on its own task.
//!
//! ```rust,ignore
//! let handle = spawn_server(&config, Arc::clone(&state), shutdown_rx).await?;
//! // ...
//! handle.await?;
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError, bind, serve};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind the listener, then serve on a background task until shutdown.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the listener cannot bind.
pub async fn spawn_server(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, StartupError> {
    let listener = bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Server exited with error");
        }
    });

    tracing::info!(host = %config.host, port = config.port, "Server spawned on background task");
    Ok(handle)
}
