//! Tick and broadcast scheduling.
//!
//! Two independent loops share the world:
//!
//! - [`run_tick_loop`] advances the simulation at the current `tick_hz`,
//!   parking while paused.
//! - [`run_broadcast_loop`] snapshots the world at `snapshot_hz` and hands
//!   each snapshot to a [`SnapshotSink`], paused or not.
//!
//! Both subtract their own processing time from the next sleep, so the
//! cadence does not drift under load. The tick loop's sleep is cut short
//! when `tick_hz` changes, so a new rate applies from the current tick.
//! Both stop at their next wake-up once the shutdown watch flips to `true`
//! or its sender is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use flowsim_types::WorldSnapshot;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, trace};

use crate::control::{ControlState, period_for_hz};
use crate::state::SharedWorld;

/// Receiver of periodic snapshots.
pub trait SnapshotSink: Send + Sync + 'static {
    /// Deliver one snapshot to every subscriber. Returns how many received it.
    fn publish(&self, snapshot: Arc<WorldSnapshot>) -> impl Future<Output = usize> + Send;
}

/// Counters reported when a loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    /// Iterations completed.
    pub iterations: u64,
}

/// Advance the world until shutdown.
pub async fn run_tick_loop(
    world: SharedWorld,
    control: Arc<ControlState>,
    mut shutdown: watch::Receiver<bool>,
) -> LoopReport {
    let mut report = LoopReport::default();
    info!(
        tick_hz = control.tick_hz(),
        paused = control.is_paused(),
        "Tick loop starting"
    );

    while !*shutdown.borrow() {
        if control.is_paused() {
            info!("Simulation paused");
            tokio::select! {
                () = control.wait_if_paused() => info!("Simulation resumed"),
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        }

        let started = Instant::now();
        let tick = world.write().await.advance();
        report.iterations = report.iterations.saturating_add(1);
        trace!(tick, "Tick complete");

        if !pace_tick(started, &control, &mut shutdown).await {
            break;
        }
    }

    info!(ticks = report.iterations, "Tick loop stopped");
    report
}

/// Broadcast snapshots until shutdown.
pub async fn run_broadcast_loop<S: SnapshotSink>(
    world: SharedWorld,
    snapshot_hz: u32,
    sink: Arc<S>,
    mut shutdown: watch::Receiver<bool>,
) -> LoopReport {
    let mut report = LoopReport::default();
    let period = period_for_hz(snapshot_hz);
    info!(snapshot_hz, "Broadcast loop starting");

    while !*shutdown.borrow() {
        let started = Instant::now();
        let snapshot = Arc::new(world.read().await.snapshot());
        let tick = snapshot.tick;
        let delivered = sink.publish(snapshot).await;
        report.iterations = report.iterations.saturating_add(1);
        trace!(tick, delivered, "Snapshot broadcast");

        if !pace(started, period, &mut shutdown).await {
            break;
        }
    }

    info!(broadcasts = report.iterations, "Broadcast loop stopped");
    report
}

/// Sleep out the rest of `period` measured from `started`.
///
/// Returns `false` if shutdown was signalled while sleeping.
async fn pace(started: Instant, period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let remaining = period.saturating_sub(started.elapsed());
    tokio::select! {
        () = tokio::time::sleep(remaining) => return true,
        changed = shutdown.changed() => {
            if changed.is_err() {
                return false;
            }
        }
    }
    !*shutdown.borrow()
}

/// Sleep out the rest of the current tick period measured from `started`,
/// re-reading the period whenever the rate changes.
///
/// Returns `false` if shutdown was signalled while sleeping.
async fn pace_tick(
    started: Instant,
    control: &ControlState,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        let remaining = control.tick_period().saturating_sub(started.elapsed());
        tokio::select! {
            () = tokio::time::sleep(remaining) => return true,
            () = control.rate_changed() => {
                trace!(tick_hz = control.tick_hz(), "Tick rate changed");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use flowsim_types::Cell;
    use flowsim_world::{Grid, MaterialTable, World};

    use super::*;
    use crate::state::WorldState;

    struct CountingSink {
        published: AtomicUsize,
    }

    impl SnapshotSink for CountingSink {
        fn publish(&self, _snapshot: Arc<WorldSnapshot>) -> impl Future<Output = usize> + Send {
            self.published.fetch_add(1, Ordering::SeqCst);
            std::future::ready(1)
        }
    }

    fn shared_world() -> SharedWorld {
        let grid = Grid::filled(4, 4, 1.0, &Cell::new("space", 0.0));
        WorldState::new(World::Grid(grid), MaterialTable::default()).into_shared()
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_configured_rate() {
        let world = shared_world();
        let control = Arc::new(ControlState::new(10, 1000, false));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_tick_loop(Arc::clone(&world), control, rx));

        tokio::time::sleep(Duration::from_millis(1050)).await;
        tx.send(true).unwrap();
        let report = handle.await.unwrap();

        assert!((10..=12).contains(&report.iterations), "{report:?}");
        assert_eq!(world.read().await.tick(), report.iterations);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_loop_does_not_tick_until_resumed() {
        let world = shared_world();
        let control = Arc::new(ControlState::new(10, 1000, true));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_tick_loop(
            Arc::clone(&world),
            Arc::clone(&control),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(world.read().await.tick(), 0);

        control.resume();
        tokio::time::sleep(Duration::from_millis(450)).await;
        tx.send(true).unwrap();
        let report = handle.await.unwrap();
        assert!(report.iterations >= 4, "{report:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_paused_exits() {
        let control = Arc::new(ControlState::new(10, 1000, true));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_tick_loop(shared_world(), control, rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let report = handle.await.unwrap();
        assert_eq!(report.iterations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_change_takes_effect() {
        let world = shared_world();
        let control = Arc::new(ControlState::new(10, 1000, false));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_tick_loop(
            Arc::clone(&world),
            Arc::clone(&control),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        control.set_tick_hz(100).unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        tx.send(true).unwrap();
        let report = handle.await.unwrap();
        assert!(report.iterations >= 90, "{report:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn faster_rate_cuts_current_sleep_short() {
        let world = shared_world();
        let control = Arc::new(ControlState::new(1, 1000, false));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_tick_loop(
            Arc::clone(&world),
            Arc::clone(&control),
            rx,
        ));

        // First tick done, now sleeping out a one-second period.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(world.read().await.tick(), 1);

        control.set_tick_hz(1000).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        let report = handle.await.unwrap();
        assert!(report.iterations >= 50, "{report:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn broadcasts_at_snapshot_rate_while_paused() {
        let world = shared_world();
        let sink = Arc::new(CountingSink {
            published: AtomicUsize::new(0),
        });
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_broadcast_loop(world, 20, Arc::clone(&sink), rx));

        tokio::time::sleep(Duration::from_millis(525)).await;
        tx.send(true).unwrap();
        let report = handle.await.unwrap();

        let published = sink.published.load(Ordering::SeqCst);
        assert!((10..=12).contains(&published), "{published}");
        assert_eq!(u64::try_from(published).unwrap(), report.iterations);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_stops_loops() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_tick_loop(
            shared_world(),
            Arc::new(ControlState::new(50, 1000, false)),
            rx,
        ));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
