//! Service client construction and the per-run client registry.

use crate::config::PulseConfig;
use crate::credentials::CredentialProvider;
use crate::error::{OrchestratorError, Result};
use integrations::{
    ActivitySource, DirectorySettings, DirectorySource, HttpDirectoryClient, JiraActivitySource,
    TrackerSettings,
};
use llm::{GeminiSettings, GeminiSummarizer, Summarizer};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use transport::MetricsSnapshot;

pub const TRACKER: &str = "tracker";
pub const DIRECTORY: &str = "directory";
pub const SUMMARIZER: &str = "summarizer";

/// Builds the service clients a run needs.
pub trait ClientFactory: Send + Sync {
    fn activity_source(
        &self,
        config: &PulseConfig,
        credentials: &dyn CredentialProvider,
    ) -> Result<Arc<dyn ActivitySource>>;

    /// `None` when no directory is configured.
    fn directory(
        &self,
        config: &PulseConfig,
        credentials: &dyn CredentialProvider,
    ) -> Result<Option<Arc<dyn DirectorySource>>>;

    fn summarizer(
        &self,
        config: &PulseConfig,
        credentials: &dyn CredentialProvider,
    ) -> Result<Arc<dyn Summarizer>>;
}

fn required(credentials: &dyn CredentialProvider, service: &str, key: &str) -> Result<String> {
    credentials.get(service, key).ok_or_else(|| {
        OrchestratorError::Configuration(format!("missing credential {}/{}", service, key))
    })
}

/// Default factory: tracker, HTTP directory and Gemini clients built from
/// [`PulseConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceFactory;

impl ClientFactory for ServiceFactory {
    fn activity_source(
        &self,
        config: &PulseConfig,
        credentials: &dyn CredentialProvider,
    ) -> Result<Arc<dyn ActivitySource>> {
        let tracker = &config.tracker;
        let token = required(credentials, TRACKER, "api_token")?;

        let mut settings = TrackerSettings::new(&tracker.url, token)
            .with_page_size(tracker.page_size)
            .with_hierarchy(tracker.resolve_issue_hierarchy, tracker.hierarchy_depth);
        settings.epic_link_field = tracker.epic_link_field.clone();
        if let Some(username) = tracker
            .username
            .clone()
            .or_else(|| credentials.get(TRACKER, "username"))
        {
            settings = settings.with_username(username);
        }
        if let Some(flavor) = tracker.flavor {
            settings = settings.with_flavor(flavor);
        }

        let client = config.transport.client_config(
            &tracker.url,
            tracker.rate_limit,
            tracker.timeout_secs,
            tracker.max_retries,
        );
        let source = JiraActivitySource::new(settings, client)
            .map_err(|e| OrchestratorError::service(TRACKER, e.kind(), e))?;
        debug!(flavor = %source.flavor(), "Created tracker client");
        Ok(Arc::new(source))
    }

    fn directory(
        &self,
        config: &PulseConfig,
        credentials: &dyn CredentialProvider,
    ) -> Result<Option<Arc<dyn DirectorySource>>> {
        let directory = &config.directory;
        if !directory.enabled {
            return Ok(None);
        }

        let mut settings = DirectorySettings::new(&directory.url).with_batch_size(directory.page_size);
        settings.cache_ttl = Duration::from_secs(directory.cache_ttl_secs);
        settings.cache_capacity = directory.cache_capacity;
        if let Some(token) = credentials.get(DIRECTORY, "token") {
            settings = settings.with_token(token);
        }

        let client = config.transport.client_config(
            &directory.url,
            directory.rate_limit,
            directory.timeout_secs,
            config.tracker.max_retries,
        );
        let directory = HttpDirectoryClient::new(settings, client)
            .map_err(|e| OrchestratorError::service(DIRECTORY, e.kind(), e))?;
        Ok(Some(Arc::new(directory)))
    }

    fn summarizer(
        &self,
        config: &PulseConfig,
        credentials: &dyn CredentialProvider,
    ) -> Result<Arc<dyn Summarizer>> {
        let summarizer = &config.summarizer;
        let api_key = required(credentials, SUMMARIZER, "api_key")?;

        let mut settings = GeminiSettings::new(api_key)
            .with_base_url(&summarizer.base_url)
            .with_model(&summarizer.model);
        settings.max_attempts = summarizer.max_attempts;

        let client = config.transport.client_config(
            &summarizer.base_url,
            summarizer.rate_limit,
            summarizer.timeout_secs,
            summarizer.max_retries,
        );
        let gemini = GeminiSummarizer::new(settings, client)
            .map_err(|e| OrchestratorError::service(SUMMARIZER, e.kind(), e))?;
        Ok(Arc::new(gemini))
    }
}

/// Clients created for one run. Each is closed at most once.
#[derive(Default)]
pub struct ServiceClients {
    activity: Option<Arc<dyn ActivitySource>>,
    directory: Option<Arc<dyn DirectorySource>>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl ServiceClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_activity(&mut self, source: Arc<dyn ActivitySource>) {
        self.activity = Some(source);
    }

    pub fn set_directory(&mut self, directory: Arc<dyn DirectorySource>) {
        self.directory = Some(directory);
    }

    pub fn set_summarizer(&mut self, summarizer: Arc<dyn Summarizer>) {
        self.summarizer = Some(summarizer);
    }

    pub fn activity(&self) -> Result<Arc<dyn ActivitySource>> {
        self.activity
            .clone()
            .ok_or_else(|| OrchestratorError::Configuration("tracker client not initialized".into()))
    }

    pub fn directory(&self) -> Option<Arc<dyn DirectorySource>> {
        self.directory.clone()
    }

    pub fn summarizer(&self) -> Result<Arc<dyn Summarizer>> {
        self.summarizer.clone().ok_or_else(|| {
            OrchestratorError::Configuration("summarizer client not initialized".into())
        })
    }

    pub fn len(&self) -> usize {
        [
            self.activity.is_some(),
            self.directory.is_some(),
            self.summarizer.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metrics of every live client, keyed by service name.
    pub fn metrics(&self) -> BTreeMap<String, MetricsSnapshot> {
        let mut metrics = BTreeMap::new();
        if let Some(source) = &self.activity {
            metrics.insert(source.name().to_string(), source.metrics());
        }
        if let Some(directory) = &self.directory {
            metrics.insert(directory.name().to_string(), directory.metrics());
        }
        if let Some(summarizer) = &self.summarizer {
            metrics.insert(summarizer.name().to_string(), summarizer.metrics());
        }
        metrics
    }

    /// Close and forget every client. Returns how many were closed.
    pub async fn close_all(&mut self) -> usize {
        let mut closed = 0;

        if let Some(source) = self.activity.take() {
            closed += log_close(source.name(), source.close().await);
        }
        if let Some(directory) = self.directory.take() {
            closed += log_close(directory.name(), directory.close().await);
        }
        if let Some(summarizer) = self.summarizer.take() {
            closed += log_close(summarizer.name(), summarizer.close().await);
        }

        if closed > 0 {
            info!(clients = closed, "Service clients closed");
        }
        closed
    }
}

fn log_close(service: &str, closed: bool) -> usize {
    if closed {
        debug!(service = service, "Closed client");
        1
    } else {
        warn!(service = service, "Client was already closed");
        0
    }
}
