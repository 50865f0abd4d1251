//! Request metrics.
//!
//! Counters are plain atomics; anything derived (averages, rates) is computed
//! from a [`MetricsSnapshot`] when asked for.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters for one service client.
#[derive(Clone, Default)]
pub struct RequestMetrics {
    /// Logical requests started
    total_requests: Arc<AtomicU64>,
    /// Logical requests that eventually succeeded
    successful_requests: Arc<AtomicU64>,
    /// Logical requests that failed after all attempts
    failed_requests: Arc<AtomicU64>,
    /// Extra attempts made by the retry loop
    retries: Arc<AtomicU64>,
    /// Accumulated latency of successful requests, in microseconds
    total_latency_us: Arc<AtomicU64>,
    last_request_time: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempted(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, latency: Duration) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        *self.last_request_time.lock() = Some(Utc::now());
    }

    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        *self.last_request_time.lock() = Some(Utc::now());
    }

    /// Point-in-time copy of the counters.
    ///
    /// `utilization` is sampled by the caller from the client's rate limiter.
    pub fn snapshot(&self, service: &str, utilization: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            service: service.to_string(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            total_latency_us: self.total_latency_us.load(Ordering::Relaxed),
            last_request_time: *self.last_request_time.lock(),
            rate_limit_utilization: utilization,
        }
    }
}

/// Metrics snapshot for a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub service: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries: u64,
    pub total_latency_us: u64,
    pub last_request_time: Option<DateTime<Utc>>,
    /// `current_count / max_requests` of the rate limiter when sampled
    pub rate_limit_utilization: f64,
}

impl MetricsSnapshot {
    /// Mean latency of successful requests.
    pub fn average_latency(&self) -> Duration {
        if self.successful_requests > 0 {
            Duration::from_micros(self.total_latency_us / self.successful_requests)
        } else {
            Duration::ZERO
        }
    }

    /// Share of finished requests that succeeded, `0.0..=1.0`.
    pub fn success_rate(&self) -> f64 {
        let finished = self.successful_requests + self.failed_requests;
        if finished > 0 {
            self.successful_requests as f64 / finished as f64
        } else {
            0.0
        }
    }

    /// Rate-limiter utilization as a percentage.
    pub fn utilization_percent(&self) -> f64 {
        self.rate_limit_utilization * 100.0
    }
}
