//! Dynamic snapshot polling.
//!
//! A single loop builds one [`DynamicSnapshot`] per interval and publishes
//! it over a channel. A tick never starts before the previous one has
//! finished, so dynamic facts never have more than one read outstanding.
//! The loop owns its [`ProbeState`]; denials found on one tick carry over
//! to every later tick.
//!
//! At most one snapshot waits in the channel. A tick that finds it still
//! occupied is dropped and counted in [`PollState::skipped`].
//!
//! [`poll_tick`] is the synchronous core; [`DynamicPoller`] runs it on a
//! background thread.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::logging::event_names;
use crate::probe::ProbeState;
use crate::snapshot::{DynamicSnapshot, SharedSources, Sources};

/// State carried from tick to tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollState {
    pub probe: ProbeState,
    pub tick_count: u64,
    /// Ticks not published because the consumer had not caught up.
    pub skipped: u64,
    pub last_tick_at: Option<String>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Build and count one snapshot.
pub fn poll_tick(sources: &Sources<'_>, cores: usize, state: &mut PollState) -> Arc<DynamicSnapshot> {
    let snapshot = DynamicSnapshot::build(sources, cores, &mut state.probe);
    state.tick_count += 1;
    state.last_tick_at = Some(Utc::now().to_rfc3339());
    trace!(
        target: event_names::POLL_TICK,
        tick = state.tick_count,
        denied = state.probe.denied_count(),
        "poll tick"
    );
    Arc::new(snapshot)
}

/// Handle to a running poll loop.
///
/// Dropping the handle stops the loop and waits for the current tick.
pub struct DynamicPoller {
    stop: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<PollState>>,
}

impl DynamicPoller {
    /// Start polling on a background thread.
    ///
    /// The loop also ends on its own once the returned receiver is dropped.
    pub fn start(
        sources: SharedSources,
        cores: usize,
        interval: Duration,
    ) -> std::io::Result<(Self, Receiver<Arc<DynamicSnapshot>>)> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (snap_tx, snap_rx) = mpsc::sync_channel(1);

        let thread = thread::Builder::new()
            .name("dt-poller".to_string())
            .spawn(move || run_loop(&sources, cores, interval, &stop_rx, &snap_tx))?;

        info!(interval_ms = interval.as_millis() as u64, "poller started");
        Ok((
            Self {
                stop: Some(stop_tx),
                thread: Some(thread),
            },
            snap_rx,
        ))
    }

    /// Stop the loop and return its final state.
    pub fn stop(mut self) -> Option<PollState> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<PollState> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.thread.take().and_then(|t| t.join().ok())
    }
}

impl Drop for DynamicPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(
    sources: &SharedSources,
    cores: usize,
    interval: Duration,
    stop: &Receiver<()>,
    publish: &SyncSender<Arc<DynamicSnapshot>>,
) -> PollState {
    let mut state = PollState::new();
    let borrowed = sources.borrow();

    loop {
        let started = Instant::now();
        let snapshot = poll_tick(&borrowed, cores, &mut state);
        match publish.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                state.skipped += 1;
                trace!(target: event_names::POLL_TICK, skipped = state.skipped, "consumer behind, tick dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("snapshot receiver dropped");
                break;
            }
        }

        let wait = interval.saturating_sub(started.elapsed());
        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(
        target: event_names::POLL_STOPPED,
        ticks = state.tick_count,
        skipped = state.skipped,
        denied = state.probe.denied_count(),
        "poller stopped"
    );
    state
}
