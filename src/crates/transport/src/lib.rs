//! Resilient request core shared by every pulse service client.
//!
//! This crate bundles the pieces a remote-service client needs to talk to slow,
//! throttled and occasionally broken HTTP APIs:
//! - [`RateLimiter`]: sliding-window admission control
//! - [`RetryPolicy`] / [`RetryOn`]: exponential backoff with jitter and a
//!   retryable-kind predicate
//! - [`ServiceClient`]: a lazily pooled `reqwest` client that routes every call
//!   through the limiter and the retry loop
//! - [`RequestMetrics`]: request counters with derived averages
//!
//! # Example
//!
//! ```rust,ignore
//! use transport::{ClientConfig, ServiceClient};
//!
//! let config = ClientConfig::new("https://issues.example.com")
//!     .with_rate_limit(100, Duration::from_secs(60))
//!     .with_timeout(Duration::from_secs(30));
//!
//! let client = ServiceClient::new("tracker", config)?;
//! let me = client.get("/rest/api/2/myself", &[]).await?;
//! client.close().await;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;

pub use auth::AuthScheme;
pub use client::{RequestSpec, ServiceClient};
pub use config::ClientConfig;
pub use error::{classify_status, Classify, ErrorKind, RequestError, Result};
pub use metrics::{MetricsSnapshot, RequestMetrics};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryOn, RetryPolicy};
pub use reqwest::{Method, Url};
