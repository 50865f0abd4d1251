//! Background credential health checks.
//!
//! A [`CredentialMonitor`] runs an authenticated connection check against
//! every configured service on a fixed interval, keeps a [`CredentialStatus`]
//! per service and emits a [`CredentialEvent`] whenever something worth
//! telling the user happens.

use crate::cancel::CancellationToken;
use crate::config::MonitoringConfig;
use crate::monitor::operations::OperationMonitor;
use crate::request::ConnectionHealth;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Something that can check every configured service.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check_health(&self) -> BTreeMap<String, ConnectionHealth>;
}

/// Latest known state of one service's credentials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialStatus {
    pub service: String,
    pub healthy: bool,
    pub last_checked: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
    /// Failed checks in a row; reset by a healthy check.
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub latency: Duration,
}

impl CredentialStatus {
    fn new(service: &str, now: DateTime<Utc>) -> Self {
        Self {
            service: service.to_string(),
            healthy: false,
            last_checked: now,
            last_success: None,
            consecutive_failures: 0,
            last_error: None,
            latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CredentialEvent {
    /// First observation of a service, or its health flipped.
    StatusChanged { service: String, healthy: bool },
    /// The service has failed at least the configured number of checks in a
    /// row. Repeated on every further failed check.
    Failing {
        service: String,
        consecutive_failures: u32,
        error: String,
    },
}

impl fmt::Display for CredentialEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialEvent::StatusChanged { service, healthy: true } => {
                write!(f, "{} credentials are healthy", service)
            }
            CredentialEvent::StatusChanged { service, healthy: false } => {
                write!(f, "{} credentials are unhealthy", service)
            }
            CredentialEvent::Failing {
                service,
                consecutive_failures,
                error,
            } => write!(
                f,
                "{} failed {} checks in a row: {}",
                service, consecutive_failures, error
            ),
        }
    }
}

/// Aggregate view over every monitored service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub services: usize,
    pub healthy: usize,
    pub unhealthy: Vec<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl HealthSummary {
    pub fn all_healthy(&self) -> bool {
        self.services > 0 && self.unhealthy.is_empty()
    }
}

/// Periodic credential checker.
pub struct CredentialMonitor {
    checker: Arc<dyn HealthCheck>,
    interval: Duration,
    max_consecutive_failures: u32,
    statuses: Mutex<BTreeMap<String, CredentialStatus>>,
    events: Option<mpsc::UnboundedSender<CredentialEvent>>,
    operations: Option<Arc<OperationMonitor>>,
    checks: AtomicU64,
}

impl CredentialMonitor {
    pub fn new(checker: Arc<dyn HealthCheck>, config: &MonitoringConfig) -> Self {
        Self {
            checker,
            interval: config.check_interval(),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
            statuses: Mutex::new(BTreeMap::new()),
            events: None,
            operations: None,
            checks: AtomicU64::new(0),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_events(mut self, sender: mpsc::UnboundedSender<CredentialEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Time each check as a `credential_check` operation.
    pub fn with_operations(mut self, operations: Arc<OperationMonitor>) -> Self {
        self.operations = Some(operations);
        self
    }

    /// The monitor together with the receiving end of its event channel.
    pub fn channel(self) -> (Self, mpsc::UnboundedReceiver<CredentialEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (self.with_events(sender), receiver)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Checks completed so far.
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn status(&self, service: &str) -> Option<CredentialStatus> {
        self.statuses.lock().get(service).cloned()
    }

    pub fn statuses(&self) -> BTreeMap<String, CredentialStatus> {
        self.statuses.lock().clone()
    }

    pub fn summary(&self) -> HealthSummary {
        let statuses = self.statuses.lock();
        HealthSummary {
            services: statuses.len(),
            healthy: statuses.values().filter(|s| s.healthy).count(),
            unhealthy: statuses
                .values()
                .filter(|s| !s.healthy)
                .map(|s| s.service.clone())
                .collect(),
            last_checked: statuses.values().map(|s| s.last_checked).max(),
        }
    }

    /// Check every service once, update the statuses and publish the
    /// resulting events.
    pub async fn check_once(&self) -> Vec<CredentialEvent> {
        let started = Instant::now();
        let health = self.checker.check_health().await;
        let now = Utc::now();
        let events = self.apply(&health, now);

        let unhealthy = health.values().filter(|h| !h.healthy).count();
        if let Some(operations) = &self.operations {
            let outcome = if unhealthy == 0 {
                Ok(())
            } else {
                Err(format!("{} of {} services unhealthy", unhealthy, health.len()))
            };
            operations.record("credential_check", started.elapsed(), outcome);
        }
        self.checks.fetch_add(1, Ordering::SeqCst);
        debug!(services = health.len(), unhealthy = unhealthy, events = events.len(), "Credential check finished");

        for event in &events {
            match event {
                CredentialEvent::StatusChanged { service, healthy: true } => {
                    info!(service = %service, "Credentials healthy")
                }
                CredentialEvent::StatusChanged { service, healthy: false } => {
                    warn!(service = %service, "Credentials unhealthy")
                }
                CredentialEvent::Failing {
                    service,
                    consecutive_failures,
                    error,
                } => warn!(
                    service = %service,
                    failures = consecutive_failures,
                    error = %error,
                    "Credential check keeps failing"
                ),
            }
            if let Some(sender) = &self.events {
                // A dropped receiver only means nobody is listening any more.
                let _ = sender.send(event.clone());
            }
        }
        events
    }

    fn apply(
        &self,
        health: &BTreeMap<String, ConnectionHealth>,
        now: DateTime<Utc>,
    ) -> Vec<CredentialEvent> {
        let mut statuses = self.statuses.lock();
        let mut events = Vec::new();

        for (service, outcome) in health {
            let previous = statuses.get(service).map(|s| s.healthy);
            let status = statuses
                .entry(service.clone())
                .or_insert_with(|| CredentialStatus::new(service, now));

            status.last_checked = now;
            status.healthy = outcome.healthy;
            status.latency = outcome.latency;
            if outcome.healthy {
                status.last_success = Some(now);
                status.consecutive_failures = 0;
                status.last_error = None;
            } else {
                status.consecutive_failures += 1;
                status.last_error = outcome.error.clone();
            }

            if previous != Some(outcome.healthy) {
                events.push(CredentialEvent::StatusChanged {
                    service: service.clone(),
                    healthy: outcome.healthy,
                });
            }
            if !outcome.healthy && status.consecutive_failures >= self.max_consecutive_failures {
                events.push(CredentialEvent::Failing {
                    service: service.clone(),
                    consecutive_failures: status.consecutive_failures,
                    error: status
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }

        events
    }

    /// Check on every tick of the interval, the first one immediately,
    /// until `cancel` fires. A check in progress always completes.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Credential monitoring started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }

        info!(checks = self.checks(), "Credential monitoring stopped");
    }
}
