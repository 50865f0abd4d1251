//! `run` and `team` command handlers

use crate::cli::output::{progress_line, render_result};
use crate::error::Result;
use integrations::DateRange;
use orchestrator::{
    ProgressSink, SummaryOverrides, Targets, WorkflowOrchestrator, WorkflowRequest, WorkflowStatus,
};
use std::sync::Arc;
use tracing::info;

/// Progress sink that prints one line per stage to stderr.
pub fn stderr_progress() -> Arc<dyn ProgressSink> {
    Arc::new(|message: &str, percent: u8| eprintln!("{}", progress_line(message, percent)))
}

pub fn members_request(
    members: Vec<String>,
    range: DateRange,
    overrides: SummaryOverrides,
) -> WorkflowRequest {
    WorkflowRequest::new(Targets::Members(members), range).with_overrides(overrides)
}

pub fn team_request(
    manager: String,
    depth: Option<usize>,
    range: DateRange,
    overrides: SummaryOverrides,
) -> WorkflowRequest {
    let targets = Targets::Manager {
        identifier: manager,
        max_depth: depth,
    };
    WorkflowRequest::new(targets, range).with_overrides(overrides)
}

/// Execute one run and print its result. Returns the final status.
pub async fn handle_run(
    orchestrator: &WorkflowOrchestrator,
    request: WorkflowRequest,
    json: bool,
) -> Result<WorkflowStatus> {
    info!(
        start = %request.range.start,
        end = %request.range.end,
        "Starting activity digest"
    );
    let result = orchestrator.execute(request).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_result(&result));
    }
    Ok(result.status)
}
