//! Credential lookup.
//!
//! Credentials are addressed by `(service, key)`, e.g. `("tracker", "api_token")`.

use std::collections::HashMap;

/// Source of secrets for the service clients.
pub trait CredentialProvider: Send + Sync {
    fn get(&self, service: &str, key: &str) -> Option<String>;
}

/// Reads `PULSE_<SERVICE>_<KEY>` environment variables.
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    prefix: String,
}

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self::with_prefix("PULSE")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Variable name for a credential.
    pub fn variable(&self, service: &str, key: &str) -> String {
        format!("{}_{}_{}", self.prefix, service, key)
            .to_uppercase()
            .replace('-', "_")
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn get(&self, service: &str, key: &str) -> Option<String> {
        std::env::var(self.variable(service, key))
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

/// Fixed in-memory credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: HashMap<(String, String), String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, service: &str, key: &str, value: impl Into<String>) -> Self {
        self.values
            .insert((service.to_string(), key.to_string()), value.into());
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn get(&self, service: &str, key: &str) -> Option<String> {
        self.values
            .get(&(service.to_string(), key.to_string()))
            .cloned()
    }
}
