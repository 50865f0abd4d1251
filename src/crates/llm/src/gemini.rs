//! Google Gemini summarizer.
//!
//! Calls `POST {base_url}/models/{model}:generateContent` with the API key as
//! the `key` query parameter. Transport failures are retried by the request
//! core; safety blocks are retried here with stricter input sanitization and
//! end in a statistical fallback summary rather than an error.

use crate::config::GeminiSettings;
use crate::error::{LlmError, Result};
use crate::fallback::fallback_summary;
use crate::prompt::prepare_prompt;
use crate::sanitize::{ContentSanitizer, SanitizeLevel};
use crate::summary::{SafetyRating, Summarizer, SummaryOptions, SummaryPayload, TokenUsage};
use async_trait::async_trait;
use integrations::ActivityRecord;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use transport::{AuthScheme, ClientConfig, MetricsSnapshot, ServiceClient};

/// Finish reasons that mean the model refused to answer.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "OTHER",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

const SAFETY_SETTINGS: &[(&str, &str)] = &[
    ("HARM_CATEGORY_HATE_SPEECH", "BLOCK_ONLY_HIGH"),
    ("HARM_CATEGORY_DANGEROUS_CONTENT", "BLOCK_ONLY_HIGH"),
    ("HARM_CATEGORY_HARASSMENT", "BLOCK_ONLY_HIGH"),
    ("HARM_CATEGORY_SEXUALLY_EXPLICIT", "BLOCK_MEDIUM_AND_ABOVE"),
];

const PING_PROMPT: &str = "What is 2 + 2? Reply with just the number.";

// Gemini API types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<OutgoingPart<'a>>,
}

#[derive(Debug, Serialize)]
struct OutgoingPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    candidate_count: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<IncomingPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IncomingPart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: u64,
    candidates_token_count: u64,
    total_token_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn blocked_message(reason: &str) -> &'static str {
    match reason {
        "SAFETY" => "the input may contain content that violates the model's usage policies",
        "RECITATION" => "the model detected potential copyright or citation issues",
        _ => "generation was blocked for other reasons",
    }
}

/// [`Summarizer`] backed by the Gemini API.
pub struct GeminiSummarizer {
    client: ServiceClient,
    model: String,
    max_attempts: u32,
    blocked_retry_delay: Duration,
    sanitizer: ContentSanitizer,
}

impl GeminiSummarizer {
    /// Build a summarizer from its settings and the transport profile to use.
    ///
    /// `client.base_url` and `client.auth` are replaced by values derived
    /// from `settings`.
    pub fn new(settings: GeminiSettings, client: ClientConfig) -> Result<Self> {
        settings.validate()?;

        let mut config = client;
        config.base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        config.auth = AuthScheme::api_key_query("key", settings.api_key.trim());
        let client = ServiceClient::new("summarizer", config)?;

        info!(model = %settings.model, "Summarizer configured");
        Ok(Self {
            client,
            model: settings.model,
            max_attempts: settings.max_attempts,
            blocked_retry_delay: settings.blocked_retry_delay,
            sanitizer: ContentSanitizer::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<SummaryPayload> {
        let request = GenerateRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![OutgoingPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: max_tokens,
                candidate_count: 1,
            },
            safety_settings: SAFETY_SETTINGS
                .iter()
                .map(|&(category, threshold)| SafetySetting {
                    category,
                    threshold,
                })
                .collect(),
        };

        let path = format!("/models/{}:generateContent", self.model);
        let value = self.client.post_json(&path, &request).await?;
        let response: GenerateResponse = serde_json::from_value(value)?;
        self.interpret(response)
    }

    fn interpret(&self, response: GenerateResponse) -> Result<SummaryPayload> {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Blocked {
                message: blocked_message(&reason).to_string(),
                reason,
            });
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyResponse(self.model.clone()))?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if BLOCKING_FINISH_REASONS.contains(&reason) {
                return Err(LlmError::Blocked {
                    reason: reason.to_string(),
                    message: blocked_message(reason).to_string(),
                });
            }
        }

        let content: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse(self.model.clone()));
        }

        let mut payload = SummaryPayload::new(content.trim(), &self.model);
        payload.safety_ratings = candidate.safety_ratings;
        if let Some(usage) = response.usage_metadata {
            payload.usage = TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            };
        }
        Ok(payload)
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    fn name(&self) -> &str {
        self.client.name()
    }

    async fn summarize(
        &self,
        activities: &[ActivityRecord],
        options: &SummaryOptions,
    ) -> Result<SummaryPayload> {
        let mut last_block = String::new();

        for attempt in 0..self.max_attempts {
            let level = SanitizeLevel::for_attempt(attempt);
            let data = self.sanitizer.prepare(activities, level);
            let prompt = prepare_prompt(&data, options.custom_prompt.as_deref());
            debug!(
                attempt = attempt + 1,
                level = ?level,
                activities = prompt.activity_count,
                words = prompt.word_count(),
                "Requesting summary"
            );

            match self
                .generate(&prompt.text, options.temperature, options.max_tokens)
                .await
            {
                Ok(payload) => {
                    info!(
                        model = %payload.model,
                        prompt_tokens = payload.usage.prompt_tokens,
                        output_tokens = payload.usage.output_tokens,
                        attempt = attempt + 1,
                        "Summary generated"
                    );
                    return Ok(payload);
                }
                Err(e) if e.is_blocked() => {
                    warn!(attempt = attempt + 1, error = %e, "Summary blocked by safety filters");
                    last_block = e.to_string();
                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(self.blocked_retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        error!(
            attempts = self.max_attempts,
            "Every summary attempt was blocked, using statistical fallback"
        );
        Ok(fallback_summary(activities, &last_block))
    }

    async fn validate_connection(&self) -> Result<()> {
        match self.generate(PING_PROMPT, 0.1, 10).await {
            Ok(_) => {
                info!("Summarizer connection validated");
                Ok(())
            }
            // The request was authenticated and answered; only the content was withheld.
            Err(e @ (LlmError::Blocked { .. } | LlmError::EmptyResponse(_))) => {
                info!(detail = %e, "Summarizer connection validated (content withheld)");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.client.metrics()
    }

    async fn close(&self) -> bool {
        self.client.close().await
    }
}
