//! Prompt assembly.

use serde_json::Value;
use tracing::warn;

/// Placeholder replaced with the serialized activities.
pub const ACTIVITY_PLACEHOLDER: &str = "{activity_data}";

/// Prompts longer than this many whitespace-separated words are rebuilt from
/// the first [`TRUNCATED_ACTIVITY_LIMIT`] activities.
pub const MAX_PROMPT_WORDS: usize = 30_000;

pub const TRUNCATED_ACTIVITY_LIMIT: usize = 50;

pub const DEFAULT_PROMPT: &str = "\
You are preparing a weekly summary of engineering activity for a senior leader.
Summarize the issue-tracker activity below.

Cover completed work, progress on important initiatives (weighted by priority),
blockers or risks that need attention, and upcoming priorities. Use short
sections with headings.

Activity data:
{activity_data}

Summary:
";

/// A rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    /// Activities actually embedded.
    pub activity_count: usize,
    pub truncated: bool,
}

impl Prompt {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

fn render(template: &str, activities: &[Value]) -> String {
    let data = serde_json::to_string_pretty(activities).unwrap_or_else(|_| "[]".to_string());
    if template.contains(ACTIVITY_PLACEHOLDER) {
        template.replace(ACTIVITY_PLACEHOLDER, &data)
    } else {
        format!("{}\n\n{}", template.trim_end(), data)
    }
}

/// Render `template` (or [`DEFAULT_PROMPT`]) with `activities`.
///
/// A template without the placeholder gets the data appended.
pub fn prepare_prompt(activities: &[Value], template: Option<&str>) -> Prompt {
    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_PROMPT);

    let text = render(template, activities);
    let prompt = Prompt {
        text,
        activity_count: activities.len(),
        truncated: false,
    };
    if prompt.word_count() <= MAX_PROMPT_WORDS || activities.len() <= TRUNCATED_ACTIVITY_LIMIT {
        return prompt;
    }

    warn!(
        words = prompt.word_count(),
        activities = activities.len(),
        kept = TRUNCATED_ACTIVITY_LIMIT,
        "Prompt too long, truncating activity data"
    );
    let kept = &activities[..TRUNCATED_ACTIVITY_LIMIT];
    Prompt {
        text: render(template, kept),
        activity_count: kept.len(),
        truncated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_placeholder_substitution() {
        let prompt = prepare_prompt(&[json!({"id": "A-1"})], Some("Data: {activity_data} end"));
        assert!(prompt.text.starts_with("Data: ["));
        assert!(prompt.text.contains("\"A-1\""));
        assert!(prompt.text.ends_with("] end"));
        assert!(!prompt.truncated);
    }

    #[test]
    fn test_default_and_blank_templates() {
        let prompt = prepare_prompt(&[], None);
        assert!(prompt.text.contains("Activity data:\n[]"));
        assert_eq!(prepare_prompt(&[], Some("   ")).text, prompt.text);
    }

    #[test]
    fn test_template_without_placeholder_gets_data_appended() {
        let prompt = prepare_prompt(&[json!({"id": "A-1"})], Some("Summarize:"));
        assert!(prompt.text.starts_with("Summarize:\n\n["));
    }

    #[test]
    fn test_long_prompt_truncates_to_fifty_activities() {
        let filler = "word ".repeat(400);
        let activities: Vec<Value> = (0..100)
            .map(|i| json!({"id": format!("A-{}", i), "description": filler}))
            .collect();

        let prompt = prepare_prompt(&activities, None);
        assert!(prompt.truncated);
        assert_eq!(prompt.activity_count, TRUNCATED_ACTIVITY_LIMIT);
        assert!(prompt.text.contains("\"A-49\""));
        assert!(!prompt.text.contains("\"A-50\""));
    }
}
