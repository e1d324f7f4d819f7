//! Server core for Flowsim: configuration, control, and scheduling.
//!
//! This crate sits between the pure world model (`flowsim-world`) and the
//! network front end (`flowsim-observer`). It owns the lock-guarded world
//! shared by every task, the runtime control knobs, and the two periodic
//! loops that tick the simulation and broadcast snapshots.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with defaults and env overrides
//! - [`control`] -- Pause/resume and tick rate, shared via atomics
//! - [`runner`] -- Tick loop and broadcast loop with cooperative shutdown
//! - [`state`] -- [`WorldState`](state::WorldState) and the shared handle

pub mod config;
pub mod control;
pub mod runner;
pub mod state;

pub use config::{ConfigError, FlowConfig, WorldVariant};
pub use control::{ControlChange, ControlState};
pub use runner::{LoopReport, SnapshotSink, run_broadcast_loop, run_tick_loop};
pub use state::{SharedWorld, WorldState};
