//! Statistical summary used when the model refuses every attempt.

use crate::summary::{SummaryPayload, TokenUsage};
use integrations::ActivityRecord;
use std::collections::HashMap;
use std::fmt::Write;

pub const FALLBACK_MODEL: &str = "fallback_generator";

const TOP_N: usize = 10;

fn ranked<'a>(
    records: &'a [ActivityRecord],
    key: impl Fn(&'a ActivityRecord) -> &'a str,
) -> Vec<(&'a str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(key(record)).or_default() += 1;
    }
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

/// Build a markdown summary from counts alone.
pub fn fallback_summary(activities: &[ActivityRecord], reason: &str) -> SummaryPayload {
    let by_type = ranked(activities, |r| {
        r.issue_type.as_deref().unwrap_or(r.activity_type.as_str())
    });
    let by_status = ranked(activities, |r| r.status.as_deref().unwrap_or("Unknown"));
    let by_assignee = ranked(activities, |r| r.assignee.as_deref().unwrap_or("Unassigned"));

    let mut content = String::from("# Activity Summary\n\n");
    content.push_str(
        "AI summary generation was blocked by content filtering. \
         This is a statistical overview of the collected activity.\n\n",
    );
    let _ = writeln!(content, "**Total activities**: {}\n", activities.len());

    content.push_str("## By type\n");
    for (name, count) in by_type.iter().take(TOP_N) {
        let _ = writeln!(content, "- {}: {}", name, count);
    }
    content.push_str("\n## By status\n");
    for (name, count) in &by_status {
        let _ = writeln!(content, "- {}: {}", name, count);
    }
    content.push_str("\n## Top contributors\n");
    for (name, count) in by_assignee.iter().take(TOP_N) {
        let _ = writeln!(content, "- {}: {} activities", name, count);
    }
    content.push_str(
        "\n## Next steps\n\
         - Review issue descriptions and comments for wording that may trip content filters\n\
         - Retry with a smaller date range or fewer people\n",
    );

    let mut payload = SummaryPayload::new(content, FALLBACK_MODEL);
    payload.usage = TokenUsage::default();
    payload.fallback = true;
    payload.error = Some(format!("AI generation blocked: {}", reason));
    payload
}
