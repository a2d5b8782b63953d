//! # Heartbeat Monitor
//!
//! Detects a silently-dead connection.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Heartbeat Timeline                                   │
//! │                                                                         │
//! │  open ──► start()                                                      │
//! │            │                                                            │
//! │            ├── every `interval` ──► tick                               │
//! │            │      now - last_seen >  2·interval  ──► Dead              │
//! │            │      otherwise                      ──► Probe (send ping) │
//! │            │                                                            │
//! │  any inbound frame ──► record_inbound()  (last_seen = now)             │
//! │                                                                         │
//! │  leave `connected` ──► stop()   (timer dropped, no more ticks)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ticker is an owned `Option<Interval>`. Stopping drops it, so a closed
//! socket can never receive a probe.

use std::future;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatCheck {
    /// Traffic seen recently; send a liveness probe.
    Probe,
    /// Nothing heard for longer than the stale window.
    Dead { silent_for: Duration },
}

/// Owns the heartbeat timer for the current connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    ticker: Option<Interval>,
    last_seen: Instant,
}

/// Floor for the probe period; tokio intervals cannot be zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl HeartbeatMonitor {
    pub fn new(interval: Duration) -> Self {
        HeartbeatMonitor {
            interval: interval.max(MIN_INTERVAL),
            ticker: None,
            last_seen: Instant::now(),
        }
    }

    /// Arms the timer. Restarting replaces any previous timer.
    pub fn start(&mut self) {
        let now = Instant::now();
        let mut ticker = interval_at(now + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        self.last_seen = now;
    }

    /// Drops the timer.
    pub fn stop(&mut self) {
        self.ticker = None;
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Any inbound frame counts as proof of life.
    pub fn record_inbound(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Window after which a silent connection is declared dead.
    pub fn stale_after(&self) -> Duration {
        self.interval * 2
    }

    /// Waits for the next tick and evaluates liveness.
    ///
    /// Never resolves while stopped, so it is safe to poll inside `select!`.
    pub async fn tick(&mut self) -> HeartbeatCheck {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => future::pending::<()>().await,
        }
        self.check()
    }

    /// Evaluates liveness at the current instant.
    pub fn check(&self) -> HeartbeatCheck {
        let silent_for = Instant::now().saturating_duration_since(self.last_seen);
        if silent_for > self.stale_after() {
            HeartbeatCheck::Dead { silent_for }
        } else {
            HeartbeatCheck::Probe
        }
    }
}
