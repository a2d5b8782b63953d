//! # Reconnection Policy
//!
//! Decides whether and when to retry after an unintentional closure.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reconnect Decision                                   │
//! │                                                                         │
//! │  closure (not intentional)                                             │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  attempts += 1                                                         │
//! │        │                                                                │
//! │        ├── attempts > max_attempts ──► Exhausted  (terminal notice)    │
//! │        │                                                                │
//! │        └── otherwise ──► Retry { delay }                               │
//! │                          delay = min(max, base·2^(n-1)) + jitter       │
//! │                          jitter ∈ [0, jitter_ratio·base]               │
//! │                                                                         │
//! │  successful open ──► reset (attempts = 0, backoff restarts at base)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The policy only computes. The connection actor owns the timer and guards
//! against arming a second one while a retry is already pending.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use std::time::Duration;

use crate::config::ReconnectSettings;

/// What the actor should do after a closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Arm a single timer for `delay`, then call `connect()`.
    Retry { attempt: u32, delay: Duration },
    /// Stop retrying and surface "max attempts reached".
    Exhausted { attempts: u32 },
}

/// Exponential backoff with bounded jitter and an attempt ceiling.
#[derive(Debug)]
pub struct ReconnectPolicy {
    base: Duration,
    max_attempts: u32,
    jitter_ratio: f64,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl ReconnectPolicy {
    pub fn new(settings: &ReconnectSettings) -> Self {
        ReconnectPolicy {
            base: settings.base_delay(),
            max_attempts: settings.max_attempts,
            jitter_ratio: settings.jitter_ratio.clamp(0.0, 1.0),
            attempts: 0,
            backoff: Self::build_backoff(settings),
        }
    }

    /// Counts one failed or closed attempt and decides what happens next.
    pub fn next_decision(&mut self) -> ReconnectDecision {
        self.attempts = self.attempts.saturating_add(1);

        if self.attempts > self.max_attempts {
            return ReconnectDecision::Exhausted {
                attempts: self.attempts - 1,
            };
        }

        // max_elapsed_time is disabled, so the backoff never runs dry.
        let exponential = self.backoff.next_backoff().unwrap_or(self.base);
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay: exponential + self.jitter(),
        }
    }

    /// Called on every successful open and on manual retry.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    /// Current value of the reconnect counter.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn jitter(&self) -> Duration {
        let bound = self.base.mul_f64(self.jitter_ratio);
        if bound.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng().gen_range(0..=bound.as_millis() as u64);
        Duration::from_millis(millis)
    }

    fn build_backoff(settings: &ReconnectSettings) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(settings.base_delay())
            .with_max_interval(settings.max_delay())
            .with_multiplier(2.0)
            // Jitter is added separately, bounded by the base delay.
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}
