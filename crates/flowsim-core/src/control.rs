//! Runtime control state shared by the tick loop and client sessions.
//!
//! Any session may pause, resume, or retune the simulation with a `control`
//! message. Fields are atomics so the tick loop reads them without locking.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::Notify;

/// Period of a rate in hertz. A zero rate is treated as one hertz.
pub fn period_for_hz(hz: u32) -> Duration {
    Duration::from_secs(1)
        .checked_div(hz)
        .unwrap_or(Duration::from_secs(1))
}

/// The fields of a `control` message that took effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlChange {
    /// New pause flag, if it was set.
    pub paused: Option<bool>,
    /// New tick rate, if it was accepted.
    pub tick_hz: Option<u32>,
}

/// Process-wide simulation controls.
#[derive(Debug)]
pub struct ControlState {
    /// Whether the tick loop is parked.
    paused: AtomicBool,

    /// Wakes the tick loop on resume.
    resume_notify: Notify,

    /// Current simulation rate.
    tick_hz: AtomicU32,

    /// Wakes the tick loop's sleep when the rate changes.
    rate_notify: Notify,

    /// Upper bound for `tick_hz`.
    max_tick_hz: u32,

    /// Wall-clock time the server started.
    started_at: DateTime<Utc>,
}

impl ControlState {
    /// Create control state with the given initial rate and cap.
    pub fn new(tick_hz: u32, max_tick_hz: u32, paused: bool) -> Self {
        Self {
            paused: AtomicBool::new(paused),
            resume_notify: Notify::new(),
            tick_hz: AtomicU32::new(tick_hz),
            rate_notify: Notify::new(),
            max_tick_hz,
            started_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Whether the simulation is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause the simulation. The tick loop parks at its next wake-up.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume the simulation and wake the tick loop.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_one();
    }

    /// Set the pause flag either way.
    pub fn set_paused(&self, paused: bool) {
        if paused {
            self.pause();
        } else {
            self.resume();
        }
    }

    /// Wait until the simulation is no longer paused.
    ///
    /// Returns immediately if not paused.
    pub async fn wait_if_paused(&self) {
        while self.paused.load(Ordering::Acquire) {
            self.resume_notify.notified().await;
        }
    }

    // -----------------------------------------------------------------------
    // Rate
    // -----------------------------------------------------------------------

    /// Current simulation rate.
    pub fn tick_hz(&self) -> u32 {
        self.tick_hz.load(Ordering::Acquire)
    }

    /// Highest accepted simulation rate.
    pub const fn max_tick_hz(&self) -> u32 {
        self.max_tick_hz
    }

    /// Change the simulation rate and wake the tick loop.
    ///
    /// Returns the previous rate, or `None` if `hz` is zero or above the
    /// cap and was rejected.
    pub fn set_tick_hz(&self, hz: u32) -> Option<u32> {
        if hz == 0 || hz > self.max_tick_hz {
            return None;
        }
        let previous = self.tick_hz.swap(hz, Ordering::AcqRel);
        self.rate_notify.notify_one();
        Some(previous)
    }

    /// Wait for the next accepted rate change.
    ///
    /// A change made while nobody was waiting completes the next call
    /// immediately.
    pub async fn rate_changed(&self) {
        self.rate_notify.notified().await;
    }

    /// Target wall time of one tick at the current rate.
    pub fn tick_period(&self) -> Duration {
        period_for_hz(self.tick_hz())
    }

    /// Apply the fields of a `control` message.
    ///
    /// `pause` takes effect only if it is a boolean; `tick_hz` only if it
    /// is an integer in `1..=max_tick_hz`. Anything else is ignored field by
    /// field.
    pub fn apply_message(&self, msg: &Map<String, Value>) -> ControlChange {
        let mut change = ControlChange::default();
        if let Some(paused) = msg.get("pause").and_then(Value::as_bool) {
            self.set_paused(paused);
            change.paused = Some(paused);
        }
        if let Some(hz) = msg
            .get("tick_hz")
            .and_then(Value::as_u64)
            .and_then(|hz| u32::try_from(hz).ok())
        {
            if self.set_tick_hz(hz).is_some() {
                change.tick_hz = Some(hz);
            }
        }
        change
    }

    // -----------------------------------------------------------------------
    // Uptime
    // -----------------------------------------------------------------------

    /// Wall-clock time the server started.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whole seconds since start.
    pub fn uptime_seconds(&self) -> u64 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        u64::try_from(elapsed.num_seconds()).unwrap_or(0)
    }
}
