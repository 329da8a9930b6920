//! Throughput aggregation over worker count events
//!
//! Workers push [`CountEvent`]s onto one shared channel. A single
//! [`RateAggregator`] task drains it, keeps the last 60 seconds of events and
//! reports the running total as counts per minute.

use crate::worker::PoolLiveness;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Retention of the sliding window in seconds
pub const WINDOW_SECS: f64 = 60.0;

/// Sending half of the shared counting channel
pub type CountSender = mpsc::UnboundedSender<CountEvent>;

/// Receiving half of the shared counting channel
pub type CountReceiver = mpsc::UnboundedReceiver<CountEvent>;

/// Create the shared counting channel
pub fn count_channel() -> (CountSender, CountReceiver) {
    mpsc::unbounded_channel()
}

/// Current wall-clock time in seconds since the Unix epoch
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Amount of work a worker finished at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountEvent {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub count: u64,
}

impl CountEvent {
    pub fn new(timestamp: f64, count: u64) -> Self {
        Self { timestamp, count }
    }

    /// Stamp `count` with the current time
    pub fn now(count: u64) -> Self {
        Self::new(unix_now(), count)
    }
}

/// Events younger than [`WINDOW_SECS`], oldest first
#[derive(Debug, Default)]
pub struct RateWindow {
    events: VecDeque<CountEvent>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and drop everything that fell out of the window at `now`
    pub fn push(&mut self, event: CountEvent, now: f64) {
        self.events.push_back(event);
        // Arrival order is not timestamp order across workers.
        self.events.retain(|e| now - e.timestamp < WINDOW_SECS);
    }

    /// Sum of counts currently retained
    pub fn total(&self) -> u64 {
        self.events.iter().map(|e| e.count).sum()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Receiver of formatted rate lines
pub trait StatsSink: Send + Sync {
    fn update_stats(&self, formatted: &str);
}

/// Sink that logs each rate line through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatsSink for TracingSink {
    fn update_stats(&self, formatted: &str) {
        info!(target: "scan_controller::stats", "{formatted}");
    }
}

/// Sink that keeps rewriting a single stdout line
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl StatsSink for ConsoleSink {
    fn update_stats(&self, formatted: &str) {
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "\r{formatted}    ");
        let _ = stdout.flush();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Running,
    Stopped,
}

/// Sliding-window counts-per-minute aggregator
pub struct RateAggregator {
    window: RateWindow,
    sink: Arc<dyn StatsSink>,
    state: AggregatorState,
    processed: u64,
}

impl RateAggregator {
    pub fn new(sink: Arc<dyn StatsSink>) -> Self {
        Self {
            window: RateWindow::new(),
            sink,
            state: AggregatorState::Running,
            processed: 0,
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == AggregatorState::Running
    }

    /// Number of events consumed so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Record one event as seen at `now` and emit the rate
    ///
    /// Returns the emitted rate, or `None` once stopped.
    pub fn record(&mut self, event: CountEvent, now: f64) -> Option<u64> {
        if !self.is_running() {
            return None;
        }
        self.window.push(event, now);
        self.processed += 1;

        let cpm = self.window.total();
        self.sink.update_stats(&format!("CPM: {cpm}"));
        Some(cpm)
    }

    pub fn stop(&mut self) {
        if self.is_running() {
            debug!(processed = self.processed, "Rate aggregator stopped");
        }
        self.state = AggregatorState::Stopped;
    }

    /// Drain `events` until every worker is gone, the channel closes, or
    /// `shutdown` fires
    pub async fn run(
        mut self,
        mut events: CountReceiver,
        liveness: PoolLiveness,
        shutdown: CancellationToken,
    ) -> Self {
        while self.is_running() {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                event = events.recv() => event,
            };

            match event {
                Some(event) => {
                    self.record(event, unix_now());
                    if !liveness.any_alive() {
                        self.stop();
                    }
                }
                None => self.stop(),
            }
        }
        self
    }

    /// Run the aggregator on its own task
    pub fn spawn(
        self,
        events: CountReceiver,
        liveness: PoolLiveness,
        shutdown: CancellationToken,
    ) -> JoinHandle<Self> {
        tokio::spawn(self.run(events, liveness, shutdown))
    }
}
