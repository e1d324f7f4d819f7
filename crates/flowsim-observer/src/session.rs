//! One client session: handshake, inbound dispatch, and ordered outbound.
//!
//! A session is driven by a stream of [`InboundFrame`]s and writes
//! [`Outbound`] items to a channel drained by the socket writer. Keeping the
//! socket out of this module lets the whole protocol run against plain
//! channels in tests.
//!
//! # Lifecycle
//!
//! | State           | Leaves on                                        |
//! |-----------------|--------------------------------------------------|
//! | `Connecting`    | transport accepted                               |
//! | `AwaitingHello` | first frame: `hello` goes Active, else Closed   |
//! | `Active`        | transport close or error                         |
//! | `Closed`        | terminal                                         |
//!
//! Only Active sessions are registered for snapshot fan-out.
//!
//! The outbound channel holds at most [`OUTBOUND_CAPACITY`] items. A client
//! that stops reading fills it, after which further frames fail with
//! [`SendError::Lagged`] instead of queueing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use flowsim_types::protocol::PreparedFrame;
use flowsim_types::{
    ErrorCode, ErrorPayload, Hello, MessageKind, PROTOCOL_MAJOR, SessionId, Welcome,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::save::spawn_save;
use crate::state::{AppState, SequenceCounter};

/// Outbound items buffered per session before frames are dropped.
pub const OUTBOUND_CAPACITY: usize = 64;

/// A frame received from the client transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A text frame.
    Text(String),
    /// A binary frame. Never meaningful to this protocol.
    Binary,
    /// The client closed or the transport failed.
    Close,
}

/// An item for the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized JSON frame.
    Frame(String),
    /// Close the transport.
    Close,
}

/// Handshake progress of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Transport not yet accepted.
    Connecting,
    /// Waiting for the first frame.
    AwaitingHello,
    /// Handshake done; receiving snapshots.
    Active,
    /// Finished.
    Closed,
}

impl HandshakeState {
    /// Lowercase name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl core::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from enqueueing an outbound frame.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The payload could not be serialized.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The writer side is gone.
    #[error("session closed")]
    Closed,

    /// The outbound queue is full; the frame was dropped.
    #[error("session lagging, outbound queue full")]
    Lagged,
}

/// The sending half of a session, shared with the broadcast loop.
///
/// Sequence numbers are taken and frames enqueued under one lock, so the
/// frames a session receives carry strictly increasing `seq` values even
/// when the broadcast loop and the session task send concurrently.
#[derive(Debug)]
pub struct SessionLink {
    id: SessionId,
    tx: Mutex<mpsc::Sender<Outbound>>,
    sent: AtomicU64,
}

impl SessionLink {
    /// Wrap the writer channel of a new session.
    pub const fn new(id: SessionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            tx: Mutex::new(tx),
            sent: AtomicU64::new(0),
        }
    }

    /// Session identifier.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Frames enqueued so far.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Stamp `body` with the next sequence number and enqueue it.
    ///
    /// Returns the sequence number used.
    ///
    /// # Errors
    ///
    /// [`SendError::Encode`] if serialization fails. Otherwise see
    /// [`SessionLink::send_prepared`].
    pub fn send<T: Serialize>(
        &self,
        seq: &SequenceCounter,
        kind: MessageKind,
        body: &T,
    ) -> Result<u64, SendError> {
        let frame = PreparedFrame::new(kind, body)?;
        self.send_prepared(seq, &frame)
    }

    /// Stamp an already serialized frame and enqueue it without waiting.
    ///
    /// # Errors
    ///
    /// [`SendError::Lagged`] if the outbound queue is full,
    /// [`SendError::Closed`] if the writer has gone away.
    pub fn send_prepared(
        &self,
        seq: &SequenceCounter,
        frame: &PreparedFrame,
    ) -> Result<u64, SendError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let n = seq.next();
        match tx.try_send(Outbound::Frame(frame.stamp(n))) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(SendError::Lagged),
            Err(TrySendError::Closed(_)) => return Err(SendError::Closed),
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(n)
    }

    /// Send an `error` reply.
    ///
    /// # Errors
    ///
    /// See [`SessionLink::send`].
    pub fn send_error(
        &self,
        seq: &SequenceCounter,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<u64, SendError> {
        let payload = ErrorPayload {
            code,
            message: message.into(),
        };
        self.send(seq, MessageKind::Error, &payload)
    }

    /// Ask the writer to close the transport.
    pub fn close(&self) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        // A gone writer needs no close. A full queue ends once the session
        // task drops its sender.
        let _ = tx.try_send(Outbound::Close);
    }
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: SessionId,
    /// Whether the handshake completed.
    pub activated: bool,
    /// Frames enqueued to the client.
    pub sent: u64,
    /// Frames received from the client.
    pub received: u64,
}

/// Drive one session until the client goes away.
pub async fn run_session<S>(
    state: Arc<AppState>,
    mut inbound: S,
    outbound: mpsc::Sender<Outbound>,
) -> SessionSummary
where
    S: Stream<Item = InboundFrame> + Unpin,
{
    let id = SessionId::new();
    let link = Arc::new(SessionLink::new(id, outbound));
    let mut handshake = HandshakeState::Connecting;
    let mut received: u64 = 0;
    transition(id, &mut handshake, HandshakeState::AwaitingHello);

    let hello = match inbound.next().await {
        Some(InboundFrame::Text(text)) => {
            received = received.saturating_add(1);
            parse_hello(&text)
        }
        Some(InboundFrame::Binary) => {
            received = received.saturating_add(1);
            None
        }
        Some(InboundFrame::Close) | None => None,
    };

    let activated = match hello {
        Some(hello) => activate(&state, &link, &hello).await,
        None => {
            info!(session = %id, "First frame was not hello, closing");
            false
        }
    };

    if activated {
        transition(id, &mut handshake, HandshakeState::Active);
        while let Some(frame) = inbound.next().await {
            match frame {
                InboundFrame::Text(text) => {
                    received = received.saturating_add(1);
                    if let Err(e) = handle_text(&state, &link, &text).await {
                        debug!(session = %id, error = %e, "Reply failed");
                        if matches!(e, SendError::Closed) {
                            break;
                        }
                    }
                }
                InboundFrame::Binary => {
                    received = received.saturating_add(1);
                    debug!(session = %id, "Ignoring binary frame");
                }
                InboundFrame::Close => break,
            }
        }
        state.sessions.write().await.remove(&id);
    }

    link.close();
    transition(id, &mut handshake, HandshakeState::Closed);
    let summary = SessionSummary {
        id,
        activated,
        sent: link.sent(),
        received,
    };
    info!(
        session = %id,
        sent = summary.sent,
        received = summary.received,
        "Session ended"
    );
    summary
}

fn transition(id: SessionId, current: &mut HandshakeState, next: HandshakeState) {
    debug!(session = %id, from = %current, to = %next, "Session state");
    *current = next;
}

/// A `hello` is any JSON object with `t == "hello"`. Its other fields are
/// advisory and fall back to defaults when malformed.
fn parse_hello(text: &str) -> Option<Hello> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("t").and_then(Value::as_str) != Some("hello") {
        return None;
    }
    Some(serde_json::from_value(value).unwrap_or_default())
}

/// Send `welcome` and register for fan-out.
///
/// The registry write lock is held across both steps so no snapshot can be
/// sequenced ahead of the welcome.
async fn activate(state: &AppState, link: &Arc<SessionLink>, hello: &Hello) -> bool {
    if !hello.accepts_major(PROTOCOL_MAJOR) {
        warn!(
            session = %link.id(),
            accept_major = ?hello.accept_major,
            server_major = PROTOCOL_MAJOR,
            "Client does not list server protocol major"
        );
    }

    let mut sessions = state.sessions.write().await;
    let welcome = Welcome::new(state.control.tick_hz());
    match link.send(&state.seq, MessageKind::Welcome, &welcome) {
        Ok(seq) => {
            sessions.insert(link.id(), Arc::clone(link));
            info!(
                session = %link.id(),
                seq,
                client_version = hello.client_version.as_deref().unwrap_or("unknown"),
                "Session active"
            );
            true
        }
        Err(e) => {
            warn!(session = %link.id(), error = %e, "Welcome not sent");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound dispatch
// ---------------------------------------------------------------------------

async fn handle_text(
    state: &Arc<AppState>,
    link: &SessionLink,
    text: &str,
) -> Result<(), SendError> {
    let Ok(Value::Object(msg)) = serde_json::from_str::<Value>(text) else {
        debug!(session = %link.id(), "Ignoring malformed frame");
        return Ok(());
    };

    match msg.get("t").and_then(Value::as_str) {
        Some("control") => {
            let change = state.control.apply_message(&msg);
            info!(
                session = %link.id(),
                paused = ?change.paused,
                tick_hz = ?change.tick_hz,
                "Control applied"
            );
            Ok(())
        }
        Some("edit_batch") => apply_edits(state, link, msg.get("edits")).await,
        Some("edit_grid") => apply_edits(state, link, msg.get("ops")).await,
        Some("save") => {
            let note = save_note(&msg);
            debug!(session = %link.id(), note = %note, "Save requested");
            drop(spawn_save(Arc::clone(state), note));
            Ok(())
        }
        other => {
            debug!(session = %link.id(), t = ?other, "Ignoring message");
            Ok(())
        }
    }
}

async fn apply_edits(
    state: &AppState,
    link: &SessionLink,
    edits: Option<&Value>,
) -> Result<(), SendError> {
    let Some(Value::Array(edits)) = edits else {
        link.send_error(&state.seq, ErrorCode::BadRequest, "Malformed edits")?;
        return Ok(());
    };

    let result = state.world.write().await.apply_edits(edits);
    match result {
        Ok(applied) => {
            debug!(session = %link.id(), applied, "Edit batch applied");
            Ok(())
        }
        Err(e) => {
            debug!(session = %link.id(), error = %e, "Edit batch rejected");
            link.send_error(&state.seq, e.code(), e.to_string())?;
            Ok(())
        }
    }
}

fn save_note(msg: &Map<String, Value>) -> String {
    msg.get("note")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}
