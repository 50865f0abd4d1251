//! Operation timing.
//!
//! Every finished operation (a pipeline stage, a connection check) is recorded
//! with its duration and outcome. Aggregates are kept per operation name for
//! the lifetime of the monitor; individual records only for the most recent
//! `history_size` operations.

use crate::config::MonitoringConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// One finished operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRecord {
    pub name: String,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregates for one operation name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OperationStats {
    pub count: u64,
    pub errors: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl OperationStats {
    pub fn average_duration(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total_duration / self.count as u32
    }

    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.errors as f64 / self.count as f64
    }
}

/// Threshold crossed by a recorded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationAlert {
    Slow { name: String, duration: Duration },
    HighErrorRate { name: String, rate: f64 },
}

impl fmt::Display for OperationAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationAlert::Slow { name, duration } => {
                write!(f, "{} took {:.2}s", name, duration.as_secs_f64())
            }
            OperationAlert::HighErrorRate { name, rate } => {
                write!(f, "{} error rate is {:.1}%", name, rate * 100.0)
            }
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    history: VecDeque<OperationRecord>,
    stats: BTreeMap<String, OperationStats>,
}

/// Thread-safe recorder of operation durations.
#[derive(Debug)]
pub struct OperationMonitor {
    inner: Mutex<Inner>,
    history_size: usize,
    slow_threshold: Duration,
    error_rate_threshold: f64,
}

impl OperationMonitor {
    pub fn new(history_size: usize, slow_threshold: Duration, error_rate_threshold: f64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            history_size: history_size.max(1),
            slow_threshold,
            error_rate_threshold,
        }
    }

    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self::new(
            config.history_size,
            config.slow_operation(),
            config.error_rate_threshold,
        )
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Record a finished operation and return the thresholds it crossed.
    pub fn record(
        &self,
        name: &str,
        duration: Duration,
        outcome: std::result::Result<(), String>,
    ) -> Vec<OperationAlert> {
        let mut alerts = Vec::new();
        let mut inner = self.inner.lock();

        let stats = inner.stats.entry(name.to_string()).or_default();
        stats.count += 1;
        stats.total_duration += duration;
        stats.max_duration = stats.max_duration.max(duration);
        if outcome.is_err() {
            stats.errors += 1;
        }
        let rate = stats.error_rate();

        if duration > self.slow_threshold {
            alerts.push(OperationAlert::Slow {
                name: name.to_string(),
                duration,
            });
        }
        if outcome.is_err() && rate > self.error_rate_threshold {
            alerts.push(OperationAlert::HighErrorRate {
                name: name.to_string(),
                rate,
            });
        }

        if inner.history.len() == self.history_size {
            inner.history.pop_front();
        }
        inner.history.push_back(OperationRecord {
            name: name.to_string(),
            duration,
            success: outcome.is_ok(),
            error: outcome.err(),
        });
        drop(inner);

        for alert in &alerts {
            warn!(operation = name, alert = %alert, "Operation threshold exceeded");
        }
        alerts
    }

    pub fn stats(&self, name: &str) -> Option<OperationStats> {
        self.inner.lock().stats.get(name).copied()
    }

    pub fn all_stats(&self) -> BTreeMap<String, OperationStats> {
        self.inner.lock().stats.clone()
    }

    /// Recorded operations slower than `threshold`, or than the configured
    /// slow threshold when `None`. Oldest first.
    pub fn slow_operations(&self, threshold: Option<Duration>) -> Vec<OperationRecord> {
        let threshold = threshold.unwrap_or(self.slow_threshold);
        self.inner
            .lock()
            .history
            .iter()
            .filter(|r| r.duration > threshold)
            .cloned()
            .collect()
    }

    /// Most recent records, oldest first.
    pub fn history(&self) -> Vec<OperationRecord> {
        self.inner.lock().history.iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.history.clear();
        inner.stats.clear();
    }
}

impl Default for OperationMonitor {
    fn default() -> Self {
        Self::from_config(&MonitoringConfig::default())
    }
}
