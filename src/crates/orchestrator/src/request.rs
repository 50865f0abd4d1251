//! Workflow inputs and outputs.

use crate::error::{OrchestratorError, Result};
use crate::status::{Stage, WorkflowStatus};
use hierarchy::{email_local_part, HierarchyTree};
use integrations::{ActivityRecord, DateRange};
use llm::SummaryPayload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use transport::MetricsSnapshot;
use uuid::Uuid;

/// Whose activity to summarize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Targets {
    /// Tracker usernames or email addresses. Emails are mapped to usernames
    /// through the directory when one is configured.
    Members(Vec<String>),
    /// Everyone reporting to `identifier`, expanded through the directory.
    Manager {
        identifier: String,
        /// Levels below the manager; the configured default when `None`.
        max_depth: Option<usize>,
    },
}

impl Targets {
    pub fn members<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Targets::Members(members.into_iter().map(Into::into).collect())
    }

    pub fn manager(identifier: impl Into<String>) -> Self {
        Targets::Manager {
            identifier: identifier.into(),
            max_depth: None,
        }
    }

    /// Whether resolving these targets consults the directory.
    pub fn needs_directory(&self) -> bool {
        match self {
            Targets::Members(members) => members
                .iter()
                .any(|m| email_local_part(m.trim()).is_some()),
            Targets::Manager { .. } => true,
        }
    }
}

/// Per-run replacements for the configured summarizer settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryOverrides {
    pub custom_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// One workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub targets: Targets,
    pub range: DateRange,
    #[serde(default)]
    pub overrides: SummaryOverrides,
}

impl WorkflowRequest {
    pub fn new(targets: Targets, range: DateRange) -> Self {
        Self {
            targets,
            range,
            overrides: SummaryOverrides::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.overrides.custom_prompt = Some(prompt.into());
        self
    }

    pub fn with_overrides(mut self, overrides: SummaryOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Reject requests no stage could do anything useful with.
    pub fn validate(&self) -> Result<()> {
        match &self.targets {
            Targets::Members(members) => {
                if members.iter().all(|m| m.trim().is_empty()) {
                    return Err(OrchestratorError::InvalidRequest(
                        "at least one member is required".to_string(),
                    ));
                }
            }
            Targets::Manager {
                identifier,
                max_depth,
            } => {
                if identifier.trim().is_empty() {
                    return Err(OrchestratorError::InvalidRequest(
                        "manager identifier is required".to_string(),
                    ));
                }
                if *max_depth == Some(0) {
                    return Err(OrchestratorError::InvalidRequest(
                        "max_depth must be at least 1".to_string(),
                    ));
                }
            }
        }

        if let Some(temperature) = self.overrides.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(OrchestratorError::InvalidRequest(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    temperature
                )));
            }
        }
        Ok(())
    }
}

/// Everything a run produced. Failures are recorded here, never raised.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub run_id: Uuid,
    pub status: WorkflowStatus,
    pub summary: Option<SummaryPayload>,
    /// Activities fetched, failed ones included.
    pub activity_count: usize,
    #[serde(skip)]
    pub activities: Vec<ActivityRecord>,
    pub elapsed: Duration,
    pub error_message: Option<String>,
    /// Stage that was running when the run stopped.
    pub current_stage: Option<Stage>,
    pub stages_completed: Vec<Stage>,
    /// Degraded outcomes that did not fail the run.
    pub warnings: Vec<String>,
    /// Reporting tree, for manager runs that expanded.
    pub hierarchy: Option<HierarchyTree>,
    pub metrics: BTreeMap<String, MetricsSnapshot>,
    /// Wall time of every stage that ran, failed ones included.
    pub stage_durations: BTreeMap<String, Duration>,
}

impl WorkflowResult {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: WorkflowStatus::Pending,
            summary: None,
            activity_count: 0,
            activities: Vec::new(),
            elapsed: Duration::ZERO,
            error_message: None,
            current_stage: None,
            stages_completed: Vec::new(),
            warnings: Vec::new(),
            hierarchy: None,
            metrics: BTreeMap::new(),
            stage_durations: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }
}

impl Default for WorkflowResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of probing one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionHealth {
    pub healthy: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

impl ConnectionHealth {
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            latency,
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency: Duration::ZERO,
            error: Some(error.into()),
        }
    }
}
