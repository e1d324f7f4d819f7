//! Session protocol tests.
//!
//! Each session runs against in-memory channels standing in for the
//! socket, so the handshake, dispatch, and fan-out are exercised exactly as
//! the `WebSocket` transport drives them.

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flowsim_core::{ControlState, SnapshotSink, WorldState};
use flowsim_observer::session::{
    InboundFrame, OUTBOUND_CAPACITY, Outbound, SessionSummary, run_session,
};
use flowsim_observer::state::AppState;
use flowsim_types::{Cell, WorldView};
use flowsim_world::{Grid, MaterialTable, Network, World, parse_level};
use futures::channel::mpsc as client_mpsc;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(2);

struct Client {
    tx: client_mpsc::UnboundedSender<InboundFrame>,
    rx: mpsc::Receiver<Outbound>,
    task: JoinHandle<SessionSummary>,
}

impl Client {
    fn connect(state: &Arc<AppState>) -> Self {
        let (tx, inbound) = client_mpsc::unbounded();
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let task = tokio::spawn(run_session(Arc::clone(state), inbound, outbound));
        Self { tx, rx, task }
    }

    async fn handshake(state: &Arc<AppState>) -> (Self, Value) {
        let mut client = Self::connect(state);
        client.send(&json!({"t": "hello", "accept_major": [1], "client_version": "test"}));
        let welcome = client.recv().await;
        assert_eq!(welcome["t"], "welcome");
        (client, welcome)
    }

    fn send(&self, value: &Value) {
        self.send_text(&value.to_string());
    }

    fn send_text(&self, text: &str) {
        self.tx
            .unbounded_send(InboundFrame::Text(text.to_owned()))
            .unwrap();
    }

    async fn next(&mut self) -> Outbound {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn recv(&mut self) -> Value {
        match self.next().await {
            Outbound::Frame(text) => serde_json::from_str(&text).unwrap(),
            Outbound::Close => panic!("unexpected close"),
        }
    }

    async fn disconnect(self) -> SessionSummary {
        drop(self.tx);
        tokio::time::timeout(WAIT, self.task).await.unwrap().unwrap()
    }
}

fn seq_of(frame: &Value) -> u64 {
    frame["seq"].as_str().unwrap().parse().unwrap()
}

fn state_with(world: World, save_dir: PathBuf) -> Arc<AppState> {
    let world = WorldState::new(world, MaterialTable::default()).into_shared();
    let control = Arc::new(ControlState::new(50, 1000, false));
    Arc::new(AppState::new(world, control, save_dir))
}

fn grid_state() -> Arc<AppState> {
    let grid = Grid::filled(4, 4, 1.0, &Cell::new("space", 0.0));
    state_with(World::Grid(grid), std::env::temp_dir())
}

fn network_state() -> Arc<AppState> {
    state_with(World::Network(Network::new()), std::env::temp_dir())
}

async fn publish(state: &Arc<AppState>) -> usize {
    let snapshot = Arc::new(state.world.read().await.snapshot());
    state.publish(snapshot).await
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_frame_without_hello_closes() {
    let state = grid_state();
    let mut client = Client::connect(&state);
    client.send(&json!({"accept_major": [1]}));

    assert_eq!(client.next().await, Outbound::Close);
    let summary = client.disconnect().await;
    assert!(!summary.activated);
    assert_eq!(summary.sent, 0);
    assert_eq!(state.connection_count().await, 0);
}

#[tokio::test]
async fn binary_first_frame_closes() {
    let state = grid_state();
    let mut client = Client::connect(&state);
    client.tx.unbounded_send(InboundFrame::Binary).unwrap();
    assert_eq!(client.next().await, Outbound::Close);
}

#[tokio::test]
async fn welcome_precedes_snapshots() {
    let state = grid_state();
    let (mut client, welcome) = Client::handshake(&state).await;
    assert_eq!(welcome["version"]["major"], 1);
    assert_eq!(welcome["tick_hz"], 50);
    assert_eq!(welcome["fields"], json!(["node.p", "edge.q"]));

    assert_eq!(state.connection_count().await, 1);
    assert_eq!(publish(&state).await, 1);

    let snapshot = client.recv().await;
    assert_eq!(snapshot["t"], "snapshot");
    assert_eq!(snapshot["grid"]["rows"], 4);
    assert!(seq_of(&snapshot) > seq_of(&welcome));
}

#[tokio::test]
async fn foreign_major_is_still_welcomed() {
    let state = grid_state();
    let mut client = Client::connect(&state);
    client.send(&json!({"t": "hello", "accept_major": [7]}));
    assert_eq!(client.recv().await["t"], "welcome");
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_node_is_id_conflict() {
    let state = network_state();
    let (mut client, _) = Client::handshake(&state).await;

    client.send(&json!({"t": "edit_batch", "edits": [{"op": "add_node", "id": "n1"}]}));
    client.send(&json!({"t": "edit_batch", "edits": [{"op": "add_node", "id": "n1"}]}));

    let error = client.recv().await;
    assert_eq!(error["t"], "error");
    assert_eq!(error["code"], "id_conflict");

    let snapshot = state.world.read().await.snapshot();
    let WorldView::Network { nodes, .. } = snapshot.world else {
        panic!("network world");
    };
    assert_eq!(nodes.len(), 1);
}

#[tokio::test]
async fn unknown_op_is_bad_request() {
    let state = network_state();
    let (mut client, _) = Client::handshake(&state).await;

    client.send(&json!({"t": "edit_batch", "edits": [{"op": "teleport"}]}));
    let error = client.recv().await;
    assert_eq!(error["code"], "bad_request");
}

#[tokio::test]
async fn negative_row_is_out_of_bounds() {
    let state = grid_state();
    let (mut client, _) = Client::handshake(&state).await;

    client.send(&json!({
        "t": "edit_grid",
        "ops": [{"op": "set_pixel", "r": -1, "c": 0, "material": "stone"}]
    }));
    let error = client.recv().await;
    assert_eq!(error["code"], "index_out_of_bounds");
}

#[tokio::test]
async fn failed_batch_leaves_world_unchanged() {
    let state = grid_state();
    let before = state.world.read().await.snapshot();
    let (mut client, _) = Client::handshake(&state).await;

    client.send(&json!({
        "t": "edit_grid",
        "ops": [
            {"op": "fill", "r": 0, "c": 0},
            {"op": "set_pixel", "r": 1, "c": 1, "material": "lava"}
        ]
    }));
    let error = client.recv().await;
    assert_eq!(error["code"], "invalid_material");
    assert!(error["message"].as_str().unwrap().starts_with("edit 1:"));
    assert_eq!(state.world.read().await.snapshot(), before);
}

#[tokio::test]
async fn non_list_edits_are_malformed() {
    let state = grid_state();
    let (mut client, _) = Client::handshake(&state).await;

    client.send(&json!({"t": "edit_batch", "edits": {"op": "fill"}}));
    let error = client.recv().await;
    assert_eq!(error["code"], "bad_request");
    assert_eq!(error["message"], "Malformed edits");

    client.send(&json!({"t": "edit_grid"}));
    let error = client.recv().await;
    assert_eq!(error["message"], "Malformed edits");
}

#[tokio::test]
async fn errors_go_only_to_the_sender() {
    let state = network_state();
    let (mut alice, _) = Client::handshake(&state).await;
    let (mut bob, _) = Client::handshake(&state).await;

    alice.send(&json!({"t": "edit_batch", "edits": [{"op": "del", "id": "ghost"}]}));
    assert_eq!(alice.recv().await["code"], "unknown_entity");

    publish(&state).await;
    assert_eq!(bob.recv().await["t"], "snapshot");
    assert_eq!(alice.recv().await["t"], "snapshot");
}

// ---------------------------------------------------------------------------
// Control and junk
// ---------------------------------------------------------------------------

#[tokio::test]
async fn control_applies_valid_fields_only() {
    let state = grid_state();
    let (mut client, _) = Client::handshake(&state).await;

    client.send(&json!({"t": "control", "pause": true, "tick_hz": "abc"}));
    // The error reply proves the control frame before it was handled.
    client.send(&json!({"t": "edit_grid"}));
    client.recv().await;

    assert!(state.control.is_paused());
    assert_eq!(state.control.tick_hz(), 50);

    client.send(&json!({"t": "control", "pause": false, "tick_hz": 10}));
    client.send(&json!({"t": "edit_grid"}));
    client.recv().await;

    assert!(!state.control.is_paused());
    assert_eq!(state.control.tick_hz(), 10);
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let state = grid_state();
    let (mut client, _) = Client::handshake(&state).await;

    client.send_text("{not json");
    client.send_text("[1, 2, 3]");
    client.send(&json!({"t": "dance"}));
    client.tx.unbounded_send(InboundFrame::Binary).unwrap();
    client.send(&json!({"t": "edit_grid"}));

    // Only the malformed edit produced a reply.
    assert_eq!(client.recv().await["code"], "bad_request");
    assert!(client.rx.try_recv().is_err());

    let summary = client.disconnect().await;
    assert!(summary.activated);
    assert_eq!(summary.received, 6);
    assert_eq!(summary.sent, 2);
}

// ---------------------------------------------------------------------------
// Ordering and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn seq_strictly_increases_per_session() {
    let state = grid_state();
    let (mut client, welcome) = Client::handshake(&state).await;

    for _ in 0..5 {
        client.send(&json!({"t": "edit_grid"}));
        publish(&state).await;
    }

    let mut last = seq_of(&welcome);
    for _ in 0..10 {
        let frame = client.recv().await;
        let seq = seq_of(&frame);
        assert!(seq > last, "{seq} after {last}");
        last = seq;
    }
}

#[tokio::test]
async fn disconnect_unregisters() {
    let state = grid_state();
    let (client, _) = Client::handshake(&state).await;
    assert_eq!(state.connection_count().await, 1);

    client.disconnect().await;
    assert_eq!(state.connection_count().await, 0);
    assert_eq!(publish(&state).await, 0);
}

#[tokio::test]
async fn dead_writer_is_dropped_from_fan_out() {
    let state = grid_state();
    let (mut alive, _) = Client::handshake(&state).await;
    let (dead, _) = Client::handshake(&state).await;
    drop(dead.rx);

    assert_eq!(publish(&state).await, 1);
    assert_eq!(state.connection_count().await, 1);
    assert_eq!(alive.recv().await["t"], "snapshot");
}

#[tokio::test]
async fn stalled_reader_queue_stays_bounded() {
    let state = grid_state();
    let (mut stalled, _) = Client::handshake(&state).await;

    let mut delivered = 0;
    for _ in 0..OUTBOUND_CAPACITY * 4 {
        delivered += publish(&state).await;
    }
    assert_eq!(delivered, OUTBOUND_CAPACITY);
    assert_eq!(state.connection_count().await, 1);

    let queued = std::iter::from_fn(|| stalled.rx.try_recv().ok()).count();
    assert_eq!(queued, OUTBOUND_CAPACITY);

    // Once drained, the session receives snapshots again.
    assert_eq!(publish(&state).await, 1);
    assert_eq!(stalled.recv().await["t"], "snapshot");
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_writes_loadable_level() {
    let dir = std::env::temp_dir().join(format!("flowsim-save-{}", uuid::Uuid::now_v7()));
    let grid = Grid::filled(2, 3, 1.0, &Cell::new("space", 0.5));
    let state = state_with(World::Grid(grid), dir.clone());
    let (client, _) = Client::handshake(&state).await;

    client.send(&json!({"t": "save", "note": "checkpoint"}));

    let path = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
                if let Ok(Some(entry)) = entries.next_entry().await {
                    break entry.path();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // The file may exist before its contents are flushed.
    let text = tokio::time::timeout(WAIT, async {
        loop {
            let text = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            if serde_json::from_str::<Value>(&text).is_ok() {
                break text;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let json: Value = serde_json::from_str(&text).unwrap();
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("save-"));
    assert_eq!(json["meta"]["note"], "checkpoint");
    assert_eq!(json["version"]["major"], 1);
    assert_eq!(json["rows"], 2);

    let world = parse_level(&text, &MaterialTable::default()).unwrap();
    assert_eq!(world, state.world.read().await.world().clone());

    std::fs::remove_dir_all(&dir).ok();
}
