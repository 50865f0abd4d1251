//! People-directory client.
//!
//! The directory is queried over a small JSON API:
//!
//! | Request                        | Meaning                             |
//! |--------------------------------|-------------------------------------|
//! | `GET /people?mail=<email>`     | entries with that email             |
//! | `GET /people?uid=<uid>`        | entries with that uid               |
//! | `GET /people?manager=a,b,c`    | direct reports of `a`, `b` and `c`  |
//!
//! Responses are either a JSON array of people or `{"people": [...]}`.

use crate::error::{IntegrationError, Result};
use crate::source::DirectorySource;
use async_trait::async_trait;
use hierarchy::{
    email_local_part, DirectoryBackend, Expansion, MemberIdentity, OrgResolver, Person,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use transport::{AuthScheme, ClientConfig, MetricsSnapshot, ServiceClient};

const PEOPLE_PATH: &str = "/people";

/// Connection settings for [`HttpDirectoryClient`].
#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub base_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Managers per batched report query.
    pub batch_size: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl DirectorySettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            batch_size: 50,
            cache_ttl: Duration::from_secs(3600),
            cache_capacity: 1000,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

struct DirectoryApi {
    client: ServiceClient,
    batch_size: usize,
}

impl DirectoryApi {
    async fn people(&self, key: &str, value: &str) -> Result<Vec<Person>> {
        let body = self.client.get(PEOPLE_PATH, &[(key, value)]).await?;
        let list = match body {
            Value::Array(_) => body,
            Value::Object(mut map) => map.remove("people").unwrap_or(Value::Array(Vec::new())),
            Value::Null => Value::Array(Vec::new()),
            other => {
                return Err(IntegrationError::response(
                    self.client.name(),
                    format!("expected a list of people, got {}", other),
                ))
            }
        };
        serde_json::from_value(list)
            .map_err(|e| IntegrationError::response(self.client.name(), e.to_string()))
    }
}

#[async_trait]
impl DirectoryBackend for DirectoryApi {
    async fn lookup(&self, identifier: &str) -> hierarchy::Result<Vec<Person>> {
        let key = if email_local_part(identifier).is_some() {
            "mail"
        } else {
            "uid"
        };
        Ok(self.people(key, identifier).await?)
    }

    async fn direct_reports(&self, manager_uids: &[String]) -> hierarchy::Result<Vec<Person>> {
        if manager_uids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.people("manager", &manager_uids.join(",")).await?)
    }

    fn page_size(&self) -> usize {
        self.batch_size
    }
}

/// [`DirectorySource`] over the HTTP people API, with cached batched
/// expansion.
pub struct HttpDirectoryClient {
    api: Arc<DirectoryApi>,
    resolver: OrgResolver,
}

impl HttpDirectoryClient {
    pub fn new(settings: DirectorySettings, client: ClientConfig) -> Result<Self> {
        let mut config = client;
        config.base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        config.auth = match settings.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => AuthScheme::bearer(token),
            _ => AuthScheme::None,
        };

        let client = ServiceClient::new("directory", config)?;
        info!(base_url = %client.config().base_url, "Directory client configured");

        let api = Arc::new(DirectoryApi {
            client,
            batch_size: settings.batch_size.max(1),
        });
        let resolver = OrgResolver::new(
            Arc::clone(&api) as Arc<dyn DirectoryBackend>,
            settings.cache_ttl,
            settings.cache_capacity,
        );

        Ok(Self { api, resolver })
    }

    pub fn resolver(&self) -> &OrgResolver {
        &self.resolver
    }

    pub fn client(&self) -> &ServiceClient {
        &self.api.client
    }
}

#[async_trait]
impl DirectorySource for HttpDirectoryClient {
    fn name(&self) -> &str {
        self.api.client.name()
    }

    async fn expand_manager(&self, manager: &str, max_depth: usize) -> Result<Expansion> {
        Ok(self.resolver.expand(manager, max_depth).await?)
    }

    async fn map_identity(&self, identifier: &str) -> MemberIdentity {
        self.resolver.map_identity(identifier).await
    }

    async fn validate_connection(&self) -> Result<()> {
        self.api.client.get(PEOPLE_PATH, &[("limit", "1")]).await?;
        info!("Directory connection validated");
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.api.client.metrics()
    }

    async fn close(&self) -> bool {
        self.api.client.close().await
    }
}
