//! Input cleanup for models with safety filters.
//!
//! Tracker text is full of words like "kill", "crash" or "exploit" that are
//! harmless in context but trip content filters. Each blocked attempt is
//! retried with a stricter [`SanitizeLevel`].

use integrations::ActivityRecord;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

const TECHNICAL_TERMS: &[(&str, &str)] = &[
    ("kill", "terminate"),
    ("killed", "terminated"),
    ("killing", "terminating"),
    ("dead", "inactive"),
    ("die", "stop"),
    ("died", "stopped"),
    ("crash", "failure"),
    ("crashed", "failed"),
    ("crashing", "failing"),
    ("hang", "freeze"),
    ("hanging", "freezing"),
    ("abort", "cancel"),
    ("aborted", "cancelled"),
    ("master", "primary"),
    ("slave", "secondary"),
    ("blacklist", "blocklist"),
    ("whitelist", "allowlist"),
    ("attack", "access attempt"),
    ("attacker", "unauthorized user"),
    ("exploit", "vulnerability"),
    ("exploited", "compromised"),
    ("inject", "insert"),
    ("injection", "insertion"),
    ("fatal", "critical"),
    ("lethal", "critical"),
    ("deadly", "severe"),
    ("poison", "corrupt"),
    ("poisoned", "corrupted"),
    ("bomb", "error"),
    ("nuke", "remove"),
    ("nuked", "removed"),
    ("war", "conflict"),
    ("fight", "resolve"),
];

const AGGRESSIVE_TERMS: &[(&str, &str)] = &[
    ("destroy", "remove"),
    ("destroyed", "removed"),
    ("annihilate", "remove completely"),
    ("obliterate", "delete"),
    ("execute", "run"),
    ("executed", "ran"),
    ("execution", "operation"),
    ("terminate", "end"),
    ("terminated", "ended"),
];

const SECRET_PATTERNS: &[(&str, &str)] = &[
    (r#"(?i)(?:password|passwd|pwd)\s*[:=]\s*["']?[\w-]+["']?"#, "[CREDENTIALS_REMOVED]"),
    (r#"(?i)(?:api[_-]?key|apikey)\s*[:=]\s*["']?[\w-]+["']?"#, "[API_KEY_REMOVED]"),
    (r#"(?i)(?:token|secret)\s*[:=]\s*["']?[\w-]+["']?"#, "[SECRET_REMOVED]"),
    (r"(?i)CVE-\d{4}-\d+", "[CVE_REFERENCE]"),
];

const COMPLAINT_PATTERNS: &[&str] = &[
    r"(?i)this is (?:completely |totally |absolutely )?(?:stupid|idiotic|moronic|dumb)",
    r"(?i)this (?:sucks|blows)",
    r"(?i)\b(?:terrible|horrible|awful|pathetic|useless|worthless|garbage|trash)\b",
    r"(?i)\b(?:hate|despise|loathe) this\b",
    r"(?i)\bincompeten(?:t|ce)\b",
];

/// Minimal-mode activity cap.
pub const MINIMAL_ACTIVITY_LIMIT: usize = 30;

const MINIMAL_TITLE_CHARS: usize = 100;

/// How hard to scrub activity text before prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SanitizeLevel {
    /// Term replacement and secret redaction.
    Standard,
    /// Also rewrites violent wording, drops descriptions, and reduces
    /// records with flagged content to their minimal form.
    Aggressive,
    /// Only the minimal form of the first [`MINIMAL_ACTIVITY_LIMIT`] records.
    Minimal,
}

impl SanitizeLevel {
    /// Level for zero-based `attempt`.
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt {
            0 => SanitizeLevel::Standard,
            1 => SanitizeLevel::Aggressive,
            _ => SanitizeLevel::Minimal,
        }
    }
}

/// Compiled replacement rules.
pub struct ContentSanitizer {
    terms: Vec<(Regex, &'static str)>,
    aggressive_terms: Vec<(Regex, &'static str)>,
    secrets: Vec<(Regex, &'static str)>,
    complaints: Vec<Regex>,
    exclamations: Option<Regex>,
}

fn word_rules(table: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    table
        .iter()
        .filter_map(|(word, replacement)| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word)))
                .ok()
                .map(|re| (re, *replacement))
        })
        .collect()
}

impl ContentSanitizer {
    pub fn new() -> Self {
        Self {
            terms: word_rules(TECHNICAL_TERMS),
            aggressive_terms: word_rules(AGGRESSIVE_TERMS),
            secrets: SECRET_PATTERNS
                .iter()
                .filter_map(|(pattern, replacement)| {
                    Regex::new(pattern).ok().map(|re| (re, *replacement))
                })
                .collect(),
            complaints: COMPLAINT_PATTERNS
                .iter()
                .filter_map(|pattern| Regex::new(pattern).ok())
                .collect(),
            exclamations: Regex::new(r"!{3,}").ok(),
        }
    }

    /// Rewrite `text` so it is less likely to be flagged.
    pub fn sanitize_text(&self, text: &str, aggressive: bool) -> String {
        if text.is_empty() {
            return String::new();
        }

        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        let upper = text.chars().filter(|c| c.is_uppercase()).count();
        let mut out = if letters > 10 && upper * 2 > letters {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        for (re, replacement) in &self.secrets {
            out = re.replace_all(&out, *replacement).into_owned();
        }
        for (re, replacement) in &self.terms {
            out = re.replace_all(&out, *replacement).into_owned();
        }
        for re in &self.complaints {
            out = re.replace_all(&out, "[feedback removed]").into_owned();
        }
        if aggressive {
            for (re, replacement) in &self.aggressive_terms {
                out = re.replace_all(&out, *replacement).into_owned();
            }
        }
        if let Some(re) = &self.exclamations {
            out = re.replace_all(&out, "!").into_owned();
        }

        out
    }

    /// Whether `text` contains anything the rules would touch.
    pub fn is_flagged(&self, text: &str) -> bool {
        self.terms.iter().any(|(re, _)| re.is_match(text))
            || self.secrets.iter().any(|(re, _)| re.is_match(text))
            || self.complaints.iter().any(|re| re.is_match(text))
    }

    /// Activities as JSON values ready for the prompt.
    pub fn prepare(&self, activities: &[ActivityRecord], level: SanitizeLevel) -> Vec<Value> {
        if level == SanitizeLevel::Minimal {
            warn!(
                activities = activities.len().min(MINIMAL_ACTIVITY_LIMIT),
                "Using minimal activity data"
            );
            return activities
                .iter()
                .take(MINIMAL_ACTIVITY_LIMIT)
                .map(|record| self.minimal(record))
                .collect();
        }

        let aggressive = level == SanitizeLevel::Aggressive;
        let mut flagged = 0;
        let prepared = activities
            .iter()
            .map(|record| {
                let raw_text = record_text(record);
                if aggressive && self.is_flagged(&raw_text) {
                    flagged += 1;
                    return self.minimal(record);
                }
                self.scrubbed(record, aggressive)
            })
            .collect();

        if flagged > 0 {
            debug!(flagged = flagged, "Reduced flagged activities to minimal form");
        }
        prepared
    }

    fn scrubbed(&self, record: &ActivityRecord, aggressive: bool) -> Value {
        let mut record = record.clone();
        record.title = self.sanitize_text(&record.title, aggressive);
        record.description = if aggressive {
            None
        } else {
            record
                .description
                .as_deref()
                .map(|d| self.sanitize_text(d, false))
        };
        for comment in &mut record.comments {
            comment.body = self.sanitize_text(&comment.body, aggressive);
        }
        record.processing_error = None;
        serde_json::to_value(&record).unwrap_or(Value::Null)
    }

    fn minimal(&self, record: &ActivityRecord) -> Value {
        let title: String = self
            .sanitize_text(&record.title, true)
            .chars()
            .take(MINIMAL_TITLE_CHARS)
            .collect();
        json!({
            "id": record.id,
            "type": record.activity_type,
            "title": title,
            "status": record.status.as_deref().unwrap_or("unknown"),
            "priority": record.priority.as_deref().unwrap_or("unknown"),
            "assignee": record.assignee.as_deref().unwrap_or("unassigned"),
            "created": record.created.as_deref().unwrap_or_default(),
            "updated": record.updated.as_deref().unwrap_or_default(),
        })
    }
}

impl Default for ContentSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

fn record_text(record: &ActivityRecord) -> String {
    let mut text = record.title.clone();
    if let Some(description) = &record.description {
        text.push(' ');
        text.push_str(description);
    }
    for comment in &record.comments {
        text.push(' ');
        text.push_str(&comment.body);
    }
    text
}
