//! Retry logic with exponential backoff.
//!
//! A [`RetryPolicy`] says how long to wait between attempts; a [`RetryOn`]
//! says which failures deserve another attempt at all.

use crate::error::{Classify, ErrorKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Backoff configuration for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    pub multiplier: f64,

    /// Scale each delay by a uniform factor in `[0.5, 1.0]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay before retry number `retry` (0-indexed).
    ///
    /// `min(initial * multiplier^retry, max)`, scaled into `[0.5, 1.0]` of
    /// itself when jitter is enabled.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.min(i32::MAX as u32) as i32;
        let base = (self.initial_delay_ms as f64 * self.multiplier.powi(exp))
            .min(self.max_delay_ms as f64)
            .max(0.0);

        let millis = if self.jitter {
            base * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            base
        };

        Duration::from_secs_f64(millis / 1_000.0)
    }

    /// Run `operation` until it succeeds, fails with an error `retry_on`
    /// rejects, or runs out of attempts.
    ///
    /// The error returned is always the one produced by the last attempt.
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        operation_name: &str,
        retry_on: &RetryOn,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !retry_on.matches(&err) {
                        debug!(
                            operation = operation_name,
                            attempt = attempt,
                            kind = %err.kind(),
                            error = %err,
                            "Error is not retryable"
                        );
                        return Err(err);
                    }

                    if attempt >= self.max_retries {
                        error!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            error = %err,
                            "Retries exhausted"
                        );
                        return Err(err);
                    }

                    let mut delay = self.delay_for(attempt);
                    if let Some(hint) = err.retry_after() {
                        delay = delay.max(hint).min(self.max_delay());
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retryable error, backing off"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Predicate deciding which failures are worth another attempt.
///
/// Authentication and configuration failures never match, whatever the
/// predicate was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOn {
    kinds: HashSet<ErrorKind>,
    statuses: HashSet<u16>,
}

impl Default for RetryOn {
    /// Throttling plus transient integration failures (timeouts, connection
    /// failures, 5xx).
    fn default() -> Self {
        Self::kinds([ErrorKind::RateLimit, ErrorKind::Integration])
    }
}

impl RetryOn {
    pub fn kinds(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            statuses: HashSet::new(),
        }
    }

    /// Matches nothing.
    pub fn never() -> Self {
        Self::kinds(Vec::<ErrorKind>::new())
    }

    /// Also retry responses with this status, e.g. a 404 from an
    /// eventually-consistent index.
    pub fn with_status(mut self, status: u16) -> Self {
        self.statuses.insert(status);
        self
    }

    pub fn matches<E: Classify + ?Sized>(&self, err: &E) -> bool {
        let kind = err.kind();
        if matches!(kind, ErrorKind::Authentication | ErrorKind::Configuration) {
            return false;
        }

        if let Some(status) = err.status() {
            if self.statuses.contains(&status) {
                return true;
            }
        }

        if !self.kinds.contains(&kind) {
            return false;
        }

        match kind {
            ErrorKind::RateLimit => true,
            _ => err.is_transient(),
        }
    }
}
