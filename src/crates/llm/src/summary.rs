//! Summarizer contract and payload types.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use integrations::ActivityRecord;
use serde::{Deserialize, Serialize};
use transport::MetricsSnapshot;

/// Per-call generation overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryOptions {
    /// Template with an `{activity_data}` placeholder.
    pub custom_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            custom_prompt: None,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
}

/// A generated summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPayload {
    /// Markdown body.
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub usage: TokenUsage,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
    /// True when the content is a locally computed statistical summary.
    #[serde(default)]
    pub fallback: bool,
    /// Why generation fell back, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SummaryPayload {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: TokenUsage::default(),
            generated_at: Utc::now(),
            safety_ratings: Vec::new(),
            fallback: false,
            error: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A service that turns activity records into a prose summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(
        &self,
        activities: &[ActivityRecord],
        options: &SummaryOptions,
    ) -> Result<SummaryPayload>;

    async fn validate_connection(&self) -> Result<()>;

    fn metrics(&self) -> MetricsSnapshot;

    /// Release pooled connections. Returns `false` when already closed.
    async fn close(&self) -> bool;
}
