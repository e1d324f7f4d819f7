//! Shared type definitions for the Flowsim server.
//!
//! Everything that crosses the wire or lands in a level file is defined
//! here. Types flow downstream to `TypeScript` via `ts-rs` for the browser
//! client.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers
//! - [`entities`] -- Cells, nodes, and pipes
//! - [`snapshot`] -- Immutable world views sent to clients
//! - [`protocol`] -- Message envelope, handshake payloads, error codes

pub mod entities;
pub mod ids;
pub mod protocol;
pub mod snapshot;

pub use entities::{Cell, DEFAULT_NODE_TYPE, Node, NodeState, Params, Pipe, PipeState};
pub use ids::SessionId;
pub use protocol::{
    ErrorCode, ErrorPayload, Hello, MessageKind, PROTOCOL_MAJOR, PROTOCOL_MINOR, ProtocolVersion,
    PreparedFrame, SCHEMA_REV, SERVER_VERSION, Welcome,
};
pub use snapshot::{GridView, SnapshotMeta, WorldSnapshot, WorldView};
