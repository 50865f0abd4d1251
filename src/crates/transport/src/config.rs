//! Configuration for a [`ServiceClient`](crate::ServiceClient).

use crate::auth::AuthScheme;
use crate::error::{RequestError, Result};
use crate::retry::{RetryOn, RetryPolicy};
use reqwest::Url;
use std::time::Duration;

/// Everything a service client needs to know about its remote endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto.
    pub base_url: String,

    /// Per-call timeout.
    pub timeout: Duration,

    /// Requests admitted per `rate_window`.
    pub rate_limit: usize,

    /// Length of the sliding rate-limit window.
    pub rate_window: Duration,

    /// Requests allowed in flight at once across all destinations.
    pub max_connections: usize,

    /// Idle pooled connections kept per destination host.
    pub max_connections_per_host: usize,

    pub retry: RetryPolicy,

    /// Failures the retry loop may absorb.
    pub retry_on: RetryOn,

    pub user_agent: String,

    /// Headers sent with every request.
    pub default_headers: Vec<(String, String)>,

    pub auth: AuthScheme,
}

impl ClientConfig {
    /// Create a configuration with defaults for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: default_timeout(),
            rate_limit: 100,
            rate_window: Duration::from_secs(60),
            max_connections: 50,
            max_connections_per_host: 10,
            retry: RetryPolicy::default(),
            retry_on: RetryOn::default(),
            user_agent: default_user_agent(),
            default_headers: vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            auth: AuthScheme::None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.rate_limit = max_requests;
        self.rate_window = window;
        self
    }

    pub fn with_connection_limits(mut self, total: usize, per_host: usize) -> Self {
        self.max_connections = total;
        self.max_connections_per_host = per_host;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a default header, replacing an existing one with the same name.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.default_headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&key));
        self.default_headers.push((key, value.into()));
        self
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    /// Parse and check the base URL and limits.
    pub fn validate(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            RequestError::Configuration(format!("invalid base URL '{}': {}", self.base_url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(RequestError::Configuration(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }
        if self.rate_limit == 0 {
            return Err(RequestError::Configuration(
                "rate limit must be at least 1".to_string(),
            ));
        }
        if self.max_connections == 0 || self.max_connections_per_host == 0 {
            return Err(RequestError::Configuration(
                "connection limits must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(RequestError::Configuration(
                "timeout must be non-zero".to_string(),
            ));
        }

        Ok(url)
    }

    /// Join `path` onto the base URL.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("pulse/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default_values() {
        let config = ClientConfig::new("https://api.example.com/");

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.rate_limit, 100);
        assert_eq!(config.rate_window, Duration::from_secs(60));
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.max_connections_per_host, 10);
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.user_agent.starts_with("pulse/"));
        assert_eq!(config.default_headers.len(), 2);
    }

    #[test]
    fn test_client_config_builder_pattern() {
        let config = ClientConfig::new("http://localhost:8080")
            .with_timeout(Duration::from_secs(5))
            .with_rate_limit(10, Duration::from_secs(1))
            .with_connection_limits(8, 2)
            .with_retry(RetryPolicy::none())
            .with_user_agent("custom-agent/1.0")
            .with_header("X-Request-ID", "req-123");

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.rate_limit, 10);
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.max_connections_per_host, 2);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.user_agent, "custom-agent/1.0");
        assert_eq!(config.default_headers.len(), 3);
    }

    #[test]
    fn test_with_header_replaces_existing() {
        let config = ClientConfig::new("http://localhost").with_header("accept", "text/plain");
        let accepts: Vec<_> = config
            .default_headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("accept"))
            .collect();
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts[0].1, "text/plain");
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert!(ClientConfig::new("not a url").validate().is_err());
        assert!(ClientConfig::new("ftp://example.com").validate().is_err());
        assert!(ClientConfig::new("https://example.com")
            .with_rate_limit(0, Duration::from_secs(60))
            .validate()
            .is_err());
        assert!(ClientConfig::new("https://example.com")
            .with_connection_limits(0, 1)
            .validate()
            .is_err());
        assert!(ClientConfig::new("https://example.com").validate().is_ok());
    }

    #[test]
    fn test_url_for_joins_paths() {
        let config = ClientConfig::new("https://example.com/api/");
        assert_eq!(config.url_for("/search"), "https://example.com/api/search");
        assert_eq!(config.url_for("search"), "https://example.com/api/search");
        assert_eq!(
            config.url_for("https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }
}
