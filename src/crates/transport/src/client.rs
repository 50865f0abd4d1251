//! Pooled, rate-limited, retrying HTTP client.

use crate::config::ClientConfig;
use crate::error::{classify_status, RequestError, Result};
use crate::metrics::{MetricsSnapshot, RequestMetrics};
use crate::rate_limiter::RateLimiter;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// One outgoing request, relative to the client's base URL.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

enum PoolState {
    Idle,
    Open(Client),
    Closed,
}

/// HTTP client owned by exactly one service integration.
///
/// Every request passes through the sliding-window limiter and the retry
/// loop. The underlying connection pool is built on first use and torn down
/// by [`close`](Self::close).
pub struct ServiceClient {
    name: String,
    config: ClientConfig,
    limiter: RateLimiter,
    metrics: RequestMetrics,
    pool: Mutex<PoolState>,
    in_flight: Arc<Semaphore>,
}

impl ServiceClient {
    /// Create a client for the service called `name`.
    ///
    /// No connection is opened until the first request.
    pub fn new(name: impl Into<String>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let name = name.into();

        info!(
            service = %name,
            base_url = %config.base_url,
            rate_limit = config.rate_limit,
            auth = config.auth.scheme_name(),
            "Created service client"
        );

        Ok(Self {
            limiter: RateLimiter::new(config.rate_limit, config.rate_window),
            in_flight: Arc::new(Semaphore::new(config.max_connections)),
            metrics: RequestMetrics::new(),
            pool: Mutex::new(PoolState::Idle),
            name,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(&self.name, self.limiter.utilization())
    }

    pub async fn is_closed(&self) -> bool {
        matches!(*self.pool.lock().await, PoolState::Closed)
    }

    /// Shared pool, created on first use.
    async fn pool(&self) -> Result<Client> {
        let mut state = self.pool.lock().await;
        match &*state {
            PoolState::Open(client) => Ok(client.clone()),
            PoolState::Closed => Err(RequestError::Closed),
            PoolState::Idle => {
                let client = self.build_pool()?;
                debug!(service = %self.name, "Opened connection pool");
                *state = PoolState::Open(client.clone());
                Ok(client)
            }
        }
    }

    fn build_pool(&self) -> Result<Client> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.config.default_headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                RequestError::Configuration(format!("invalid header name '{}': {}", key, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                RequestError::Configuration(format!("invalid value for header '{}': {}", key, e))
            })?;
            headers.insert(name, value);
        }

        Client::builder()
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(self.config.max_connections_per_host)
            .user_agent(self.config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| RequestError::Configuration(format!("failed to build HTTP client: {}", e)))
    }

    /// Send `spec` with rate limiting and retries, returning the decoded body.
    ///
    /// Non-JSON bodies come back as `{"content": "<text>"}`; empty bodies as
    /// `null`.
    pub async fn request(&self, spec: RequestSpec) -> Result<Value> {
        if self.is_closed().await {
            return Err(RequestError::Closed);
        }

        debug!(
            service = %self.name,
            method = %spec.method,
            path = %spec.path,
            has_body = spec.body.is_some(),
            "Sending request"
        );

        self.metrics.record_attempted();
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let operation = format!("{} {} {}", self.name, spec.method, spec.path);

        let result = self
            .config
            .retry
            .execute_with_retry(&operation, &self.config.retry_on, || {
                if attempts.fetch_add(1, Ordering::Relaxed) > 0 {
                    self.metrics.record_retry();
                }
                self.attempt(&spec)
            })
            .await;

        match &result {
            Ok(_) => self.metrics.record_success(started.elapsed()),
            Err(e) => {
                self.metrics.record_failure();
                error!(
                    service = %self.name,
                    method = %spec.method,
                    path = %spec.path,
                    error = %e,
                    "Request failed"
                );
            }
        }

        result
    }

    async fn attempt(&self, spec: &RequestSpec) -> Result<Value> {
        self.limiter.acquire().await;
        let client = self.pool().await?;
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| RequestError::Closed)?;

        let mut request = client.request(spec.method.clone(), self.config.url_for(&spec.path));
        for (key, value) in &spec.headers {
            request = request.header(key, value);
        }
        request = self.config.auth.apply(request);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("json"))
            .unwrap_or(false);
        let text = response.text().await?;

        debug!(service = %self.name, path = %spec.path, status = status, "Received response");

        if let Some(err) = classify_status(status, &text, retry_after.as_deref()) {
            return Err(err);
        }

        if text.trim().is_empty() {
            Ok(Value::Null)
        } else if is_json {
            Ok(serde_json::from_str(&text)?)
        } else {
            Ok(serde_json::json!({ "content": text }))
        }
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let mut spec = RequestSpec::get(path);
        for (key, value) in query {
            spec = spec.with_query(*key, *value);
        }
        self.request(spec).await
    }

    /// GET and deserialize the body into `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let value = self.get(path, query).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        let body = serde_json::to_value(body)?;
        self.request(RequestSpec::post(path, body)).await
    }

    /// POST and deserialize the body into `T`.
    pub async fn post_json_as<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = self.post_json(path, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Tear down the pool. Returns `false` if the client was already closed.
    ///
    /// Requests issued afterwards fail with [`RequestError::Closed`].
    pub async fn close(&self) -> bool {
        let mut state = self.pool.lock().await;
        if matches!(*state, PoolState::Closed) {
            debug!(service = %self.name, "Client already closed");
            return false;
        }

        *state = PoolState::Closed;
        self.in_flight.close();

        let snapshot = self.metrics();
        info!(
            service = %self.name,
            total_requests = snapshot.total_requests,
            successful_requests = snapshot.successful_requests,
            failed_requests = snapshot.failed_requests,
            retries = snapshot.retries,
            average_latency_ms = snapshot.average_latency().as_millis() as u64,
            "Closed service client"
        );
        true
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("name", &self.name)
            .field("base_url", &self.config.base_url)
            .field("limiter", &self.limiter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_spec_builder() {
        let spec = RequestSpec::get("/search")
            .with_query("jql", "project = X")
            .with_header("X-Trace", "1");

        assert_eq!(spec.method, Method::GET);
        assert_eq!(spec.query, vec![("jql".to_string(), "project = X".to_string())]);
        assert_eq!(spec.headers.len(), 1);
        assert!(spec.body.is_none());

        let spec = RequestSpec::post("/items", serde_json::json!({"a": 1}));
        assert_eq!(spec.method, Method::POST);
        assert!(spec.body.is_some());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = ServiceClient::new("bad", ClientConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, RequestError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = ServiceClient::new("svc", ClientConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(!client.is_closed().await);
        assert!(client.close().await);
        assert!(client.is_closed().await);
        assert!(!client.close().await);

        let err = client.get("/anything", &[]).await.unwrap_err();
        assert!(matches!(err, RequestError::Closed));
    }
}
