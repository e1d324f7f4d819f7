//! Shared application state for the session server.
//!
//! [`AppState`] holds the shared world, the control knobs, the registry of
//! active sessions, and the process-wide sequence counter. It is wrapped in
//! [`Arc`] and handed to every Axum handler, every session task, and the
//! broadcast loop (as its [`SnapshotSink`]).
//!
//! Each broadcast round serializes the snapshot once. Sessions whose
//! outbound queue is full skip that round and stay registered; sessions
//! whose writer is gone are dropped.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flowsim_core::{ControlState, SharedWorld, SnapshotSink};
use flowsim_types::{MessageKind, PreparedFrame, SessionId, WorldSnapshot};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::session::{SendError, SessionLink};

/// Process-wide outbound sequence numbers, starting at 1.
#[derive(Debug)]
pub struct SequenceCounter {
    next: AtomicU64,
}

impl SequenceCounter {
    /// A counter whose first value is 1.
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Take the next sequence number.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for the Axum application.
#[derive(Debug)]
pub struct AppState {
    /// The world, behind its read/write lock.
    pub world: SharedWorld,
    /// Pause and tick-rate controls.
    pub control: Arc<ControlState>,
    /// Sessions that completed the handshake, keyed by id.
    pub sessions: RwLock<BTreeMap<SessionId, Arc<SessionLink>>>,
    /// Outbound `seq` source.
    pub seq: SequenceCounter,
    /// Directory `save` requests write into.
    pub save_dir: PathBuf,
}

impl AppState {
    /// Build application state around an existing world and control block.
    pub fn new(world: SharedWorld, control: Arc<ControlState>, save_dir: PathBuf) -> Self {
        Self {
            world,
            control,
            sessions: RwLock::new(BTreeMap::new()),
            seq: SequenceCounter::new(),
            save_dir,
        }
    }

    /// Number of active sessions.
    pub async fn connection_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ask every active session to close. Used on shutdown.
    pub async fn close_all(&self) {
        let sessions = self.sessions.read().await;
        for link in sessions.values() {
            link.close();
        }
        debug!(count = sessions.len(), "Closing all sessions");
    }
}

impl SnapshotSink for AppState {
    fn publish(&self, snapshot: Arc<WorldSnapshot>) -> impl Future<Output = usize> + Send {
        async move {
            let frame = match PreparedFrame::new(MessageKind::Snapshot, snapshot.as_ref()) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(tick = snapshot.tick, error = %e, "Snapshot not serialized");
                    return 0;
                }
            };
            let links: Vec<Arc<SessionLink>> =
                self.sessions.read().await.values().cloned().collect();

            let mut delivered: usize = 0;
            let mut stale = Vec::new();
            for link in &links {
                match link.send_prepared(&self.seq, &frame) {
                    Ok(_) => delivered = delivered.saturating_add(1),
                    Err(SendError::Closed) => stale.push(link.id()),
                    Err(SendError::Lagged) => {
                        debug!(session = %link.id(), "Session lagging, snapshot skipped");
                    }
                    Err(e) => warn!(session = %link.id(), error = %e, "Snapshot not sent"),
                }
            }

            if !stale.is_empty() {
                let mut sessions = self.sessions.write().await;
                for id in stale {
                    debug!(session = %id, "Dropping session after failed send");
                    sessions.remove(&id);
                }
            }
            delivered
        }
    }
}
