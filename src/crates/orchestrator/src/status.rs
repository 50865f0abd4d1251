//! Run status and the fixed stage sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "Pending"),
            WorkflowStatus::Running => write!(f, "Running"),
            WorkflowStatus::Completed => write!(f, "Completed"),
            WorkflowStatus::Failed => write!(f, "Failed"),
            WorkflowStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ValidateConfiguration,
    InitializeClients,
    FetchActivityData,
    GenerateSummary,
    Finalize,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::ValidateConfiguration,
        Stage::InitializeClients,
        Stage::FetchActivityData,
        Stage::GenerateSummary,
        Stage::Finalize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::ValidateConfiguration => "validate_configuration",
            Stage::InitializeClients => "initialize_clients",
            Stage::FetchActivityData => "fetch_activity_data",
            Stage::GenerateSummary => "generate_summary",
            Stage::Finalize => "finalize",
        }
    }

    /// Zero-based position in [`Stage::ALL`].
    pub fn ordinal(&self) -> usize {
        match self {
            Stage::ValidateConfiguration => 0,
            Stage::InitializeClients => 1,
            Stage::FetchActivityData => 2,
            Stage::GenerateSummary => 3,
            Stage::Finalize => 4,
        }
    }

    /// Progress message shown when the stage starts.
    pub fn label(&self) -> String {
        let title = match self {
            Stage::ValidateConfiguration => "Validate Configuration",
            Stage::InitializeClients => "Initialize Clients",
            Stage::FetchActivityData => "Fetch Activity Data",
            Stage::GenerateSummary => "Generate Summary",
            Stage::Finalize => "Finalize",
        };
        format!("Stage {}: {}", self.ordinal() + 1, title)
    }

    /// Percent reported when the stage starts.
    pub fn percent(&self) -> u8 {
        let total = Stage::ALL.len() as f64;
        (100.0 * self.ordinal() as f64 / total).round() as u8
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
