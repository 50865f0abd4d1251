//! Terminal rendering for workflow results

use colored::Colorize;
use orchestrator::{
    activity_breakdown, ConnectionHealth, CredentialEvent, WorkflowResult, WorkflowStatus,
};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;
use tabled::{Table, Tabled};

/// Activity count per person
#[derive(Tabled)]
struct ContributorRow {
    #[tabled(rename = "Person")]
    person: String,
    #[tabled(rename = "Activities")]
    activities: usize,
}

/// Request metrics per service
#[derive(Tabled)]
struct MetricsRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Requests")]
    requests: u64,
    #[tabled(rename = "Success")]
    success: String,
    #[tabled(rename = "Retries")]
    retries: u64,
    #[tabled(rename = "Avg latency")]
    latency: String,
    #[tabled(rename = "Rate limit")]
    utilization: String,
}

/// Connection check outcome per service
#[derive(Tabled)]
struct HealthRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Error")]
    error: String,
}

fn millis(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

/// Colorize a run status for display
pub fn colorize_status(status: WorkflowStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        WorkflowStatus::Completed => text.green().bold(),
        WorkflowStatus::Failed => text.red().bold(),
        WorkflowStatus::Cancelled => text.yellow().bold(),
        _ => text.normal(),
    }
}

/// One progress line: `[ 40%] Stage 3: Fetch Activity Data`.
pub fn progress_line(message: &str, percent: u8) -> String {
    format!("{} {}", format!("[{:>3}%]", percent).cyan(), message)
}

/// Human-readable report of a finished run.
pub fn render_result(result: &WorkflowResult) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} {} in {:.1}s ({} activities)",
        "Run".bold(),
        colorize_status(result.status),
        result.elapsed.as_secs_f64(),
        result.activity_count
    );
    if let Some(error) = &result.error_message {
        let _ = writeln!(out, "{} {}", "✗".red().bold(), error);
    }

    if !result.warnings.is_empty() {
        let _ = writeln!(out, "\n{}", "Warnings".yellow().bold());
        for warning in &result.warnings {
            let _ = writeln!(out, "  ⚠ {}", warning);
        }
    }

    if let Some(summary) = &result.summary {
        let source = if summary.fallback {
            "statistical fallback".to_string()
        } else {
            format!("{}, {} tokens", summary.model, summary.usage.total_tokens)
        };
        let _ = writeln!(out, "\n{} ({})\n", "Summary".bold(), source);
        let _ = writeln!(out, "{}", summary.content.trim_end());
    }

    if !result.activities.is_empty() {
        let stats = activity_breakdown(&result.activities);
        let mut rows: Vec<ContributorRow> = stats
            .by_user
            .iter()
            .map(|(person, activities)| ContributorRow {
                person: person.clone(),
                activities: *activities,
            })
            .collect();
        rows.sort_by(|a, b| b.activities.cmp(&a.activities).then_with(|| a.person.cmp(&b.person)));
        let _ = writeln!(out, "\n{}", "Activity by person".bold());
        let _ = writeln!(out, "{}", Table::new(rows));
        if stats.failed_activities > 0 {
            let _ = writeln!(out, "{} activities could not be processed", stats.failed_activities);
        }
    }

    if !result.metrics.is_empty() {
        let rows: Vec<MetricsRow> = result
            .metrics
            .iter()
            .map(|(service, m)| MetricsRow {
                service: service.clone(),
                requests: m.total_requests,
                success: format!("{:.0}%", m.success_rate() * 100.0),
                retries: m.retries,
                latency: millis(m.average_latency()),
                utilization: format!("{:.0}%", m.utilization_percent()),
            })
            .collect();
        let _ = writeln!(out, "\n{}", "Service metrics".bold());
        let _ = writeln!(out, "{}", Table::new(rows));
    }

    out
}

/// One timestamped line per credential event.
pub fn credential_event_line(event: &CredentialEvent) -> String {
    let stamp = chrono::Local::now().format("%H:%M:%S").to_string().dimmed();
    let marker = match event {
        CredentialEvent::StatusChanged { healthy: true, .. } => "✓".green().bold(),
        CredentialEvent::StatusChanged { healthy: false, .. } => "✗".red().bold(),
        CredentialEvent::Failing { .. } => "⚠".yellow().bold(),
    };
    format!("{} {} {}", stamp, marker, event)
}

/// Table of connection check outcomes.
pub fn render_health(health: &BTreeMap<String, ConnectionHealth>) -> String {
    let rows: Vec<HealthRow> = health
        .iter()
        .map(|(service, h)| HealthRow {
            service: service.clone(),
            status: if h.healthy { "✓ healthy" } else { "✗ unhealthy" }.to_string(),
            latency: if h.healthy { millis(h.latency) } else { "-".to_string() },
            error: h.error.clone().unwrap_or_default(),
        })
        .collect();
    Table::new(rows).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use integrations::ActivityRecord;

    #[test]
    fn test_render_completed_run() {
        let mut result = WorkflowResult::new();
        result.status = WorkflowStatus::Completed;
        result.activity_count = 3;
        result.warnings.push("directory returned no members".to_string());
        result.activities = vec![
            ActivityRecord::new("A-1", "issue", "one").with_assignee("alice", "Alice"),
            ActivityRecord::new("A-2", "issue", "two").with_assignee("alice", "Alice"),
            ActivityRecord::failed("A-3", "boom"),
        ];

        let text = render_result(&result);
        assert!(text.contains("(3 activities)"));
        assert!(text.contains("directory returned no members"));
        assert!(text.contains("Activity by person"));
        assert!(text.contains("Activities"));
        assert!(text.contains("1 activities could not be processed"));
        assert!(!text.contains("Service metrics"));
    }

    #[test]
    fn test_render_failure_message() {
        let mut result = WorkflowResult::new();
        result.status = WorkflowStatus::Failed;
        result.error_message = Some("stage fetch_activity_data failed: timeout".to_string());

        let text = render_result(&result);
        assert!(text.contains("stage fetch_activity_data failed: timeout"));
        assert!(!text.contains("Activity by person"));
    }

    #[test]
    fn test_credential_event_line() {
        let line = credential_event_line(&CredentialEvent::Failing {
            service: "tracker".to_string(),
            consecutive_failures: 3,
            error: "authentication failed with status 401".to_string(),
        });
        assert!(line.contains("tracker failed 3 checks in a row: authentication failed"));
    }

    #[test]
    fn test_render_health() {
        let mut health = BTreeMap::new();
        health.insert("tracker".to_string(), ConnectionHealth::healthy(Duration::from_millis(42)));
        health.insert(
            "summarizer".to_string(),
            ConnectionHealth::unhealthy("authentication failed with status 401"),
        );

        let table = render_health(&health);
        assert!(table.contains("42ms"));
        assert!(table.contains("✗ unhealthy"));
        assert!(table.contains("authentication failed with status 401"));
    }
}
