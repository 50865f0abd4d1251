//! Sliding-window rate limiter.
//!
//! Admission is decided against the exact trailing interval: the limiter keeps
//! the timestamps of recent admissions and lets a caller through only when
//! fewer than `max_requests` of them are younger than `time_window`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window admission control for one client.
pub struct RateLimiter {
    max_requests: usize,
    time_window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting at most `max_requests` calls per `time_window`.
    ///
    /// A zero `max_requests` is treated as one.
    pub fn new(max_requests: usize, time_window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            time_window,
            requests: Mutex::new(VecDeque::with_capacity(max_requests.max(1))),
        }
    }

    /// Wait until the trailing window has room, then record this call.
    ///
    /// The lock is released while sleeping; on wake-up the window is
    /// re-evaluated because other waiters may have taken the freed slot.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut requests = self.requests.lock();
                let now = Instant::now();
                prune(&mut requests, now, self.time_window);

                if requests.len() < self.max_requests {
                    requests.push_back(now);
                    return;
                }

                match requests.front() {
                    Some(oldest) => self
                        .time_window
                        .saturating_sub(now.saturating_duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            debug!(
                wait_ms = wait.as_millis() as u64,
                max_requests = self.max_requests,
                "Rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of admissions still inside the trailing window.
    pub fn current_count(&self) -> usize {
        let mut requests = self.requests.lock();
        prune(&mut requests, Instant::now(), self.time_window);
        requests.len()
    }

    /// Fraction of the window capacity in use, `0.0..=1.0`.
    pub fn utilization(&self) -> f64 {
        self.current_count() as f64 / self.max_requests as f64
    }

    /// Forget every recorded admission.
    pub fn reset(&self) {
        self.requests.lock().clear();
        debug!("Rate limiter reset");
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn time_window(&self) -> Duration {
        self.time_window
    }
}

fn prune(requests: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = requests.front() {
        if now.saturating_duration_since(*front) >= window {
            requests.pop_front();
        } else {
            break;
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("time_window", &self.time_window)
            .field("current_count", &self.current_count())
            .finish()
    }
}
