//! Session server for Flowsim.
//!
//! Serves the `/ws` message channel that clients use to watch and edit the
//! world, fans periodic snapshots out to every active session, and exposes
//! a small HTTP API for health checks and tooling.
//!
//! # Modules
//!
//! - [`session`] -- Handshake, dispatch, and ordered outbound per client
//! - [`ws`] -- `WebSocket` transport feeding [`session`]
//! - [`save`] -- Background save to a level file
//! - [`handlers`] -- HTTP endpoints
//! - [`router`] -- Route table and middleware
//! - [`server`] / [`startup`] -- Bind and serve with graceful shutdown
//! - [`state`] -- [`AppState`](state::AppState), also the snapshot sink

pub mod error;
pub mod handlers;
pub mod router;
pub mod save;
pub mod server;
pub mod session;
pub mod startup;
pub mod state;
pub mod ws;

pub use error::ObserverError;
pub use router::build_router;
pub use save::{SaveError, spawn_save};
pub use server::{ServerConfig, ServerError};
pub use session::{InboundFrame, OUTBOUND_CAPACITY, Outbound, SessionSummary, run_session};
pub use startup::{StartupError, spawn_server};
pub use state::AppState;
