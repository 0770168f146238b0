//! Sliding-window admission gate for outbound submissions.
//!
//! Keeps the timestamps of past admissions in order. An admission stays in
//! the window until it is strictly older than the window length, so an entry
//! sitting exactly on the boundary still counts.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::warn;

/// Default window length
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Timer resolution; added to waits so the oldest admission is strictly outside the window
const TIMER_TICK: Duration = Duration::from_millis(1);

/// At most `max_requests` admissions per rolling window
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    admissions: VecDeque<Instant>,
}

impl RateLimiter {
    /// Limit to `max_requests` per minute
    pub fn new(max_requests: usize) -> Self {
        Self::with_window(max_requests, RATE_WINDOW)
    }

    pub fn with_window(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            admissions: VecDeque::new(),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Drop admissions strictly older than the window
    fn purge(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };

        while let Some(&oldest) = self.admissions.front() {
            if oldest < cutoff {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record an admission at the current time
    pub fn record(&mut self) {
        self.admissions.push_back(Instant::now());
    }

    /// Whether an admission would currently fit in the window
    pub fn can_admit(&mut self) -> bool {
        self.purge(Instant::now());
        self.admissions.len() < self.max_requests
    }

    /// Admissions in the trailing window
    pub fn current_rate(&mut self) -> usize {
        self.purge(Instant::now());
        self.admissions.len()
    }

    /// Time until the oldest admission leaves the window (zero if there is room)
    pub fn time_until_next_slot(&mut self) -> Duration {
        let now = Instant::now();
        self.purge(now);

        if self.admissions.len() < self.max_requests {
            return Duration::ZERO;
        }

        match self.admissions.front() {
            Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Sleep until the window has room for another admission.
    ///
    /// Does not record anything; call [`RateLimiter::record`] once the
    /// request is actually made.
    pub async fn wait_if_needed(&mut self) {
        let wait = self.time_until_next_slot();
        if wait.is_zero() {
            return;
        }

        warn!(
            limit = self.max_requests,
            wait_secs = format!("{:.1}", wait.as_secs_f64()),
            "Rate limit reached, waiting"
        );
        sleep(wait + TIMER_TICK).await;
        self.purge(Instant::now());
    }
}
