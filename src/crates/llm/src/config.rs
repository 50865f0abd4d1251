//! Summarizer connection settings.

use crate::error::{LlmError, Result};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Configuration for [`GeminiSummarizer`](crate::GeminiSummarizer).
#[derive(Clone)]
pub struct GeminiSettings {
    /// API root; requests go to `{base_url}/models/{model}:generateContent`.
    pub base_url: String,

    pub api_key: String,

    pub model: String,

    /// Attempts per summary when the model keeps blocking the input.
    pub max_attempts: u32,

    /// Pause between blocked attempts.
    pub blocked_retry_delay: Duration,
}

impl GeminiSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_attempts: 3,
            blocked_retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_blocked_retry_delay(mut self, delay: Duration) -> Self {
        self.blocked_retry_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::Configuration("API key is required".to_string()));
        }
        if self.model.trim().is_empty() || self.model.contains('/') {
            return Err(LlmError::Configuration(format!(
                "invalid model name '{}'",
                self.model
            )));
        }
        if self.max_attempts == 0 {
            return Err(LlmError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("max_attempts", &self.max_attempts)
            .field("blocked_retry_delay", &self.blocked_retry_delay)
            .finish()
    }
}
