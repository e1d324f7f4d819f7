//! Background save of the world to a level file.
//!
//! A `save` message never blocks its session: the export and the file
//! write run on their own task. Failures are logged and not reported to
//! the client.

use std::path::PathBuf;
use std::sync::Arc;

use flowsim_types::protocol::now_ms;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::state::AppState;

/// Errors from writing a save file.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// Creating the directory or writing the file failed.
    #[error("save I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The export could not be serialized.
    #[error("save serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Spawn a save of the current world, tagged with `note`.
///
/// The returned handle resolves to the written path. Callers may drop it.
pub fn spawn_save(state: Arc<AppState>, note: String) -> JoinHandle<Result<PathBuf, SaveError>> {
    tokio::spawn(async move {
        let result = write_save(&state, &note).await;
        match &result {
            Ok(path) => info!(path = %path.display(), note = %note, "Save written"),
            Err(e) => error!(error = %e, note = %note, "Save failed"),
        }
        result
    })
}

async fn write_save(state: &AppState, note: &str) -> Result<PathBuf, SaveError> {
    let export = state.world.read().await.export(json!({ "note": note }));
    let bytes = serde_json::to_vec_pretty(&export)?;

    tokio::fs::create_dir_all(&state.save_dir).await?;
    let path = state.save_dir.join(format!("save-{}.json", now_ms()));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
