//! Sliding record of recent vendor calls, for rate-limit warnings.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

pub struct RateMonitor {
    calls: Mutex<VecDeque<Instant>>,
    capacity: usize,
    window: Duration,
    warn_threshold: usize,
}

impl Default for RateMonitor {
    fn default() -> Self { Self::new(100, Duration::from_secs(60), 60) }
}

impl RateMonitor {
    pub fn new(capacity: usize, window: Duration, warn_threshold: usize) -> Self {
        Self { calls: Mutex::new(VecDeque::with_capacity(capacity)), capacity: capacity.max(1), window, warn_threshold }
    }

    /// Records a call and returns how many fall inside the window. Warns, never blocks.
    pub fn record(&self, operation: &str) -> usize {
        self.record_at(operation, Instant::now())
    }

    fn record_at(&self, operation: &str, now: Instant) -> usize {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if calls.len() == self.capacity { calls.pop_front(); }
        calls.push_back(now);
        let recent = Self::count_since(&calls, now, self.window);
        if recent > self.warn_threshold {
            warn!(operation = %operation, recent_calls = recent, window_secs = self.window.as_secs(), "approaching EasyPost rate limit");
        }
        recent
    }

    pub fn calls_in_window(&self) -> usize {
        let calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        Self::count_since(&calls, Instant::now(), self.window)
    }

    pub fn warn_threshold(&self) -> usize { self.warn_threshold }

    fn count_since(calls: &VecDeque<Instant>, now: Instant, window: Duration) -> usize {
        calls.iter().rev().take_while(|t| now.saturating_duration_since(**t) <= window).count()
    }
}
