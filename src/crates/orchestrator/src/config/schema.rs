//! Configuration schema

use crate::error::{OrchestratorError, Result};
use integrations::SourceFlavor;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use transport::{ClientConfig, RetryPolicy, Url};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "pretty", "compact"];

/// Main pulse configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub summarizer: SummarizerConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Issue tracker connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Tracker base URL, e.g. `https://issues.example.com`
    pub url: String,

    /// Account for basic auth; the enterprise flavor ignores it
    pub username: Option<String>,

    /// Forced flavor; detected from `url` when unset
    pub flavor: Option<SourceFlavor>,

    /// Requests per minute
    pub rate_limit: usize,

    pub timeout_secs: u64,

    pub max_retries: u32,

    /// Issues per search page
    pub page_size: usize,

    /// Upper bound on issues fetched per run
    pub max_results: usize,

    /// Restrict searches to these project keys
    pub projects: Vec<String>,

    pub include_comments: bool,

    pub epic_link_field: String,

    /// Attach epic and initiative context to activities
    pub resolve_issue_hierarchy: bool,

    pub hierarchy_depth: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: None,
            flavor: None,
            rate_limit: 100,
            timeout_secs: 30,
            max_retries: 3,
            page_size: 50,
            max_results: 1000,
            projects: Vec::new(),
            include_comments: true,
            epic_link_field: "customfield_10007".to_string(),
            resolve_issue_hierarchy: true,
            hierarchy_depth: 3,
        }
    }
}

/// People directory used for manager expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub enabled: bool,

    pub url: String,

    /// Default levels below a manager to expand
    pub max_depth: usize,

    /// Managers per batched lookup
    pub page_size: usize,

    pub cache_ttl_secs: u64,

    pub cache_capacity: usize,

    /// Requests per minute
    pub rate_limit: usize,

    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            max_depth: 3,
            page_size: 50,
            cache_ttl_secs: 3600,
            cache_capacity: 1000,
            rate_limit: 50,
            timeout_secs: 30,
        }
    }
}

/// AI summarizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub base_url: String,

    pub model: String,

    /// Generation temperature (0.0-2.0)
    pub temperature: f32,

    pub max_tokens: u32,

    /// Requests per minute
    pub rate_limit: usize,

    pub timeout_secs: u64,

    pub max_retries: u32,

    /// Attempts per summary when safety filters block the input
    pub max_attempts: u32,

    /// Prompt template with an `{activity_data}` placeholder
    pub custom_prompt: Option<String>,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            base_url: llm::config::DEFAULT_BASE_URL.to_string(),
            model: llm::config::DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            rate_limit: 60,
            timeout_secs: 120,
            max_retries: 3,
            max_attempts: 3,
            custom_prompt: None,
        }
    }
}

/// Shared pooling and backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Requests in flight at once, per service
    pub max_connections: usize,

    pub max_connections_per_host: usize,

    pub initial_delay_ms: u64,

    pub max_delay_ms: u64,

    pub multiplier: f64,

    pub jitter: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            max_connections_per_host: 10,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl TransportConfig {
    pub fn retry_policy(&self, max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_multiplier(self.multiplier)
            .with_jitter(self.jitter)
    }

    /// Transport profile for one service.
    pub fn client_config(
        &self,
        base_url: &str,
        rate_limit: usize,
        timeout_secs: u64,
        max_retries: u32,
    ) -> ClientConfig {
        ClientConfig::new(base_url)
            .with_rate_limit(rate_limit, Duration::from_secs(60))
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_connection_limits(self.max_connections, self.max_connections_per_host)
            .with_retry(self.retry_policy(max_retries))
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,

    /// json, pretty or compact
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Credential health checks and operation timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Minutes between background credential checks
    pub check_interval_minutes: u64,

    /// Failed checks in a row before a credential is reported as failing
    pub max_consecutive_failures: u32,

    /// Operations slower than this are reported
    pub slow_operation_secs: u64,

    /// Per-operation error rate (0.0 to 1.0) above which it is reported
    pub error_rate_threshold: f64,

    /// Finished operations kept for inspection
    pub history_size: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 60,
            max_consecutive_failures: 3,
            slow_operation_secs: 10,
            error_rate_threshold: 0.1,
            history_size: 1000,
        }
    }
}

impl MonitoringConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes * 60)
    }

    pub fn slow_operation(&self) -> Duration {
        Duration::from_secs(self.slow_operation_secs)
    }
}

fn check_url(problems: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        problems.push(format!("{} is required", field));
        return;
    }
    match Url::parse(value.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => problems.push(format!("{} has unsupported scheme '{}'", field, url.scheme())),
        Err(e) => problems.push(format!("{} is not a valid URL: {}", field, e)),
    }
}

fn check_positive(problems: &mut Vec<String>, field: &str, value: u64) {
    if value == 0 {
        problems.push(format!("{} must be greater than zero", field));
    }
}

impl PulseConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| OrchestratorError::Configuration(format!("failed to parse config: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            OrchestratorError::Configuration(format!("failed to serialize config: {}", e))
        })
    }

    /// Every problem with the configuration; empty when it is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let tracker = &self.tracker;
        check_url(&mut problems, "tracker.url", &tracker.url);
        check_positive(&mut problems, "tracker.rate_limit", tracker.rate_limit as u64);
        check_positive(&mut problems, "tracker.timeout_secs", tracker.timeout_secs);
        check_positive(&mut problems, "tracker.page_size", tracker.page_size as u64);
        check_positive(&mut problems, "tracker.max_results", tracker.max_results as u64);
        if tracker.resolve_issue_hierarchy {
            check_positive(&mut problems, "tracker.hierarchy_depth", tracker.hierarchy_depth as u64);
        }

        let directory = &self.directory;
        if directory.enabled {
            check_url(&mut problems, "directory.url", &directory.url);
            check_positive(&mut problems, "directory.max_depth", directory.max_depth as u64);
            check_positive(&mut problems, "directory.page_size", directory.page_size as u64);
            check_positive(&mut problems, "directory.rate_limit", directory.rate_limit as u64);
            check_positive(&mut problems, "directory.timeout_secs", directory.timeout_secs);
        }

        let summarizer = &self.summarizer;
        check_url(&mut problems, "summarizer.base_url", &summarizer.base_url);
        if summarizer.model.trim().is_empty() {
            problems.push("summarizer.model is required".to_string());
        }
        if !(0.0..=2.0).contains(&summarizer.temperature) {
            problems.push(format!(
                "summarizer.temperature must be between 0.0 and 2.0, got {}",
                summarizer.temperature
            ));
        }
        check_positive(&mut problems, "summarizer.max_tokens", summarizer.max_tokens as u64);
        check_positive(&mut problems, "summarizer.rate_limit", summarizer.rate_limit as u64);
        check_positive(&mut problems, "summarizer.timeout_secs", summarizer.timeout_secs);
        check_positive(&mut problems, "summarizer.max_attempts", summarizer.max_attempts as u64);

        let transport = &self.transport;
        check_positive(&mut problems, "transport.max_connections", transport.max_connections as u64);
        check_positive(
            &mut problems,
            "transport.max_connections_per_host",
            transport.max_connections_per_host as u64,
        );
        if transport.multiplier < 1.0 {
            problems.push("transport.multiplier must be at least 1.0".to_string());
        }
        if transport.initial_delay_ms > transport.max_delay_ms {
            problems.push("transport.initial_delay_ms must not exceed max_delay_ms".to_string());
        }

        let monitoring = &self.monitoring;
        check_positive(
            &mut problems,
            "monitoring.check_interval_minutes",
            monitoring.check_interval_minutes,
        );
        check_positive(
            &mut problems,
            "monitoring.max_consecutive_failures",
            monitoring.max_consecutive_failures as u64,
        );
        check_positive(&mut problems, "monitoring.history_size", monitoring.history_size as u64);
        if !(0.0..=1.0).contains(&monitoring.error_rate_threshold) {
            problems.push(format!(
                "monitoring.error_rate_threshold must be between 0.0 and 1.0, got {}",
                monitoring.error_rate_threshold
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            problems.push(format!("logging.level '{}' is not recognized", self.logging.level));
        }
        if !LOG_FORMATS.contains(&self.logging.format.to_lowercase().as_str()) {
            problems.push(format!("logging.format '{}' is not recognized", self.logging.format));
        }

        problems
    }
}
