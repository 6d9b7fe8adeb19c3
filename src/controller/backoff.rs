//! # Exponential Backoff
//!
//! Per-resource exponential backoff for reconciles that asked to be requeued
//! immediately or failed outright.
//!
//! The delay doubles on every consecutive failure, starting at `start` and
//! capped at `max`. A reconcile that completes or schedules its own requeue
//! resets the sequence for that resource.
//!
//! ## Usage
//!
//! ```rust
//! use managed_resource_runtime::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! ```

use crate::store::ObjectKey;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    start: Duration,
    current: Duration,
    max: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        Self {
            start,
            current: start,
            max: max.max(start),
            attempts: 0,
        }
    }

    /// Get the next backoff duration and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        result
    }

    /// Consecutive backoffs handed out since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current = self.start;
        self.attempts = 0;
    }
}

/// Backoff state tracked per resource so one failing resource can't slow
/// down another
#[derive(Debug)]
pub struct BackoffStates {
    start: Duration,
    max: Duration,
    states: Mutex<HashMap<ObjectKey, ExponentialBackoff>>,
}

impl BackoffStates {
    #[must_use]
    pub fn new(start: Duration, max: Duration) -> Self {
        Self {
            start,
            max,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Next delay for `key`, plus the number of consecutive attempts so far
    pub fn next_backoff(&self, key: &ObjectKey) -> (Duration, u32) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let backoff = states
            .entry(key.clone())
            .or_insert_with(|| ExponentialBackoff::new(self.start, self.max));
        let delay = backoff.next_backoff();
        (delay, backoff.attempts())
    }

    pub fn reset(&self, key: &ObjectKey) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(key);
    }
}
