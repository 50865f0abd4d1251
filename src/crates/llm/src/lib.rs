//! AI summarization for pulse.
//!
//! [`GeminiSummarizer`] turns a batch of [`ActivityRecord`](integrations::ActivityRecord)s
//! into a markdown summary. Each attempt sanitizes the input more strictly
//! than the last when the model's safety filters block it; if every attempt is
//! blocked, a statistical summary is returned with
//! [`SummaryPayload::fallback`] set.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::{GeminiSettings, GeminiSummarizer, Summarizer, SummaryOptions};
//! use transport::ClientConfig;
//!
//! let summarizer = GeminiSummarizer::new(
//!     GeminiSettings::new(std::env::var("PULSE_SUMMARIZER_API_KEY")?),
//!     ClientConfig::new("https://generativelanguage.googleapis.com/v1beta"),
//! )?;
//! let summary = summarizer.summarize(&activities, &SummaryOptions::default()).await?;
//! println!("{}", summary.content);
//! ```

pub mod config;
pub mod error;
pub mod fallback;
pub mod gemini;
pub mod prompt;
pub mod sanitize;
pub mod summary;

pub use config::GeminiSettings;
pub use error::{LlmError, Result};
pub use fallback::{fallback_summary, FALLBACK_MODEL};
pub use gemini::GeminiSummarizer;
pub use prompt::{prepare_prompt, Prompt};
pub use sanitize::{ContentSanitizer, SanitizeLevel};
pub use summary::{SafetyRating, Summarizer, SummaryOptions, SummaryPayload, TokenUsage};
