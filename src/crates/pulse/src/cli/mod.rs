//! Command-line interface

pub mod check;
pub mod output;
pub mod run;

use crate::error::{PulseError, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use integrations::DateRange;
use orchestrator::{SummaryOverrides, WorkflowStatus};
use std::path::PathBuf;

/// Days covered when no start date is given.
pub const DEFAULT_RANGE_DAYS: i64 = 7;

#[derive(Debug, Parser)]
#[command(name = "pulse")]
#[command(about = "Pulse - executive summaries of issue-tracker activity", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file to use instead of ~/.pulse/pulse.toml and ./.pulse/pulse.toml
    #[arg(short, long, global = true, env = "PULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Summarize activity for a list of people
    Run {
        /// Tracker usernames, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        members: Vec<String>,

        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        summary: SummaryArgs,
    },

    /// Summarize activity for everyone reporting to a manager
    Team {
        /// Manager username or email address
        #[arg(short, long)]
        manager: String,

        /// Reporting levels to include below the manager
        #[arg(short, long)]
        depth: Option<usize>,

        #[command(flatten)]
        window: WindowArgs,

        #[command(flatten)]
        summary: SummaryArgs,
    },

    /// Check connectivity to every configured service
    Check {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Keep checking every N minutes until interrupted
        #[arg(short, long, value_name = "MINUTES", value_parser = clap::value_parser!(u64).range(1..))]
        watch: Option<u64>,
    },

    /// Print the effective configuration
    Config,
}

/// Date window for a run.
#[derive(Debug, Clone, Default, Args)]
pub struct WindowArgs {
    /// First day (YYYY-MM-DD); defaults to a week before the end date
    #[arg(short, long)]
    pub start: Option<NaiveDate>,

    /// Last day (YYYY-MM-DD); defaults to today
    #[arg(short, long)]
    pub end: Option<NaiveDate>,
}

impl WindowArgs {
    pub fn range(&self, today: NaiveDate) -> Result<DateRange> {
        let end = self.end.unwrap_or(today);
        let start = self
            .start
            .unwrap_or_else(|| end - Duration::days(DEFAULT_RANGE_DAYS));
        Ok(DateRange::new(start, end)?)
    }

    pub fn resolve(&self) -> Result<DateRange> {
        self.range(Local::now().date_naive())
    }
}

/// Summary generation overrides.
#[derive(Debug, Clone, Default, Args)]
pub struct SummaryArgs {
    /// Prompt template; `{activity_data}` marks where the data goes
    #[arg(short, long, conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Read the prompt template from a file
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl SummaryArgs {
    pub async fn overrides(&self) -> Result<SummaryOverrides> {
        let custom_prompt = match (&self.prompt, &self.prompt_file) {
            (Some(prompt), _) => Some(prompt.clone()),
            (None, Some(path)) => Some(tokio::fs::read_to_string(path).await.map_err(|e| {
                PulseError::Argument(format!("cannot read prompt file {}: {}", path.display(), e))
            })?),
            (None, None) => None,
        };
        Ok(SummaryOverrides {
            custom_prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

/// Process exit code for a finished run.
pub fn exit_code(status: WorkflowStatus) -> i32 {
    match status {
        WorkflowStatus::Completed => 0,
        WorkflowStatus::Cancelled => 130,
        _ => 1,
    }
}
