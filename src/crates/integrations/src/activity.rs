//! Normalized activity records and the queries that produce them.

use crate::error::{IntegrationError, Result};
use chrono::NaiveDate;
use hierarchy::{Expansion, HierarchyContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive calendar range; `end` must be strictly after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(IntegrationError::InvalidQuery(format!(
                "end date {} must be after start date {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |value: &str| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
                IntegrationError::InvalidQuery(format!("invalid date '{}': {}", value, e))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// What to fetch from an activity source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityQuery {
    /// Tracker usernames.
    pub members: Vec<String>,
    pub range: DateRange,
    /// Restrict to these project keys; empty means all projects.
    pub projects: Vec<String>,
    /// Upper bound on returned records.
    pub max_results: usize,
    pub include_comments: bool,
}

impl ActivityQuery {
    pub fn new(members: Vec<String>, range: DateRange) -> Self {
        Self {
            members,
            range,
            projects: Vec::new(),
            max_results: 1000,
            include_comments: true,
        }
    }

    pub fn with_projects(mut self, projects: Vec<String>) -> Self {
        self.projects = projects;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_comments(mut self, include: bool) -> Self {
        self.include_comments = include;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.members.iter().all(|m| m.trim().is_empty()) {
            return Err(IntegrationError::InvalidQuery(
                "at least one member is required".to_string(),
            ));
        }
        if self.range.end <= self.range.start {
            return Err(IntegrationError::InvalidQuery(
                "end date must be after start date".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(IntegrationError::InvalidQuery(
                "max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One field transition from an issue's changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub field: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub author: Option<String>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEntry {
    pub id: Option<String>,
    pub author: Option<String>,
    pub body: String,
    pub created: Option<String>,
}

/// Non-hierarchical links to other issues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedIssues {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relates_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<String>,
}

impl RelatedIssues {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
            && self.blocked_by.is_empty()
            && self.relates_to.is_empty()
            && self.subtasks.is_empty()
    }
}

/// Where an activity's assignee sits in the organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgContext {
    pub username: String,
    pub display_name: String,
    pub manager: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    /// Distance from the expansion root.
    pub level: usize,
}

/// One unit of work in the tracker, normalized for summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub issue_type: Option<String>,
    /// Assignee display name.
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub assignee_username: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub changes: Vec<ChangeEntry>,
    #[serde(default)]
    pub comments: Vec<CommentEntry>,
    #[serde(default, skip_serializing_if = "RelatedIssues::is_empty")]
    pub related: RelatedIssues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_parents: Vec<String>,
    /// Set when the raw item could not be normalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<HierarchyContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<OrgContext>,
}

impl ActivityRecord {
    pub fn new(
        id: impl Into<String>,
        activity_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            activity_type: activity_type.into(),
            title: title.into(),
            description: None,
            status: None,
            issue_type: None,
            assignee: None,
            assignee_username: None,
            priority: None,
            created: None,
            updated: None,
            url: None,
            project: None,
            project_name: None,
            labels: Vec::new(),
            changes: Vec::new(),
            comments: Vec::new(),
            related: RelatedIssues::default(),
            parent_key: None,
            epic_key: None,
            linked_parents: Vec::new(),
            processing_error: None,
            hierarchy: None,
            org: None,
        }
    }

    /// Placeholder for an item that could not be normalized.
    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        let mut record = Self::new(id, "issue", "Error processing issue");
        record.processing_error = Some(error.into());
        record
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_assignee(mut self, username: impl Into<String>, display: impl Into<String>) -> Self {
        self.assignee_username = Some(username.into());
        self.assignee = Some(display.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.processing_error.is_some()
    }
}

/// Derive an [`OrgContext`] for `username` from an organization expansion.
pub fn org_context_for(expansion: &Expansion, username: &str) -> Option<OrgContext> {
    let node = expansion.tree.get(username)?;
    let manager = expansion
        .tree
        .parent(username)
        .map(|parent| parent.display_name.clone());

    Some(OrgContext {
        username: username.to_string(),
        display_name: node.display_name.clone(),
        manager,
        title: node.attributes.get("title").cloned(),
        department: node.attributes.get("department").cloned(),
        level: node.depth(),
    })
}

/// Aggregate counts over a batch of activities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total_activities: usize,
    pub failed_activities: usize,
    pub total_changes: usize,
    pub total_comments: usize,
    pub by_user: BTreeMap<String, usize>,
    pub by_project: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

impl ActivityStats {
    pub fn from_records(records: &[ActivityRecord]) -> Self {
        let mut stats = Self {
            total_activities: records.len(),
            ..Default::default()
        };

        for record in records {
            if record.is_failed() {
                stats.failed_activities += 1;
                continue;
            }
            stats.total_changes += record.changes.len();
            stats.total_comments += record.comments.len();

            let bump = |map: &mut BTreeMap<String, usize>, key: Option<&String>| {
                if let Some(key) = key {
                    *map.entry(key.clone()).or_default() += 1;
                }
            };
            bump(&mut stats.by_user, record.assignee.as_ref());
            bump(&mut stats.by_project, record.project.as_ref());
            bump(&mut stats.by_status, record.status.as_ref());
            bump(&mut stats.by_priority, record.priority.as_ref());
            bump(
                &mut stats.by_type,
                Some(record.issue_type.as_ref().unwrap_or(&record.activity_type)),
            );
        }

        stats
    }

    /// Most frequent key of `map`; ties resolve to the alphabetically first.
    pub fn top(map: &BTreeMap<String, usize>) -> Option<(&str, usize)> {
        map.iter()
            .fold(None, |best: Option<(&str, usize)>, (key, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((key.as_str(), *count)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hierarchy::{MemberIdentity, NodeData, NodeKind, TreeBuilder};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_date_range_requires_end_after_start() {
        assert!(DateRange::new(date("2024-01-01"), date("2024-01-08")).is_ok());
        assert!(DateRange::new(date("2024-01-08"), date("2024-01-08")).is_err());
        assert!(DateRange::new(date("2024-01-08"), date("2024-01-01")).is_err());
        assert_eq!(DateRange::parse("2024-01-01", "2024-01-08").unwrap().days(), 7);
        assert!(DateRange::parse("2024-13-01", "2024-12-08").is_err());
    }

    #[test]
    fn test_query_validation() {
        let range = DateRange::parse("2024-01-01", "2024-01-08").unwrap();
        assert!(ActivityQuery::new(vec!["alice".into()], range).validate().is_ok());
        assert!(ActivityQuery::new(vec![], range).validate().is_err());
        assert!(ActivityQuery::new(vec!["  ".into()], range).validate().is_err());
        assert!(ActivityQuery::new(vec!["alice".into()], range)
            .with_max_results(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_record_serializes_type_field() {
        let record = ActivityRecord::new("PROJ-1", "issue", "Fix login");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "issue");
        assert!(value.get("processing_error").is_none());
        assert!(value.get("related").is_none());
    }

    #[test]
    fn test_stats_skip_failed_records() {
        let records = vec![
            ActivityRecord::new("A-1", "issue", "a")
                .with_status("Done")
                .with_assignee("alice", "Alice")
                .with_project("A")
                .with_priority("High"),
            ActivityRecord::new("A-2", "issue", "b")
                .with_status("Done")
                .with_assignee("bob", "Bob")
                .with_project("A"),
            ActivityRecord::failed("A-3", "bad payload"),
        ];
        let stats = ActivityStats::from_records(&records);

        assert_eq!(stats.total_activities, 3);
        assert_eq!(stats.failed_activities, 1);
        assert_eq!(stats.by_status.get("Done"), Some(&2));
        assert_eq!(stats.by_project.get("A"), Some(&2));
        assert_eq!(stats.by_user.len(), 2);
        assert_eq!(stats.by_type.get("issue"), Some(&2));
        assert_eq!(ActivityStats::top(&stats.by_user), Some(("Alice", 1)));
    }

    #[test]
    fn test_org_context_from_expansion() {
        let mut builder = TreeBuilder::new();
        builder
            .add_root(NodeData::new("boss", NodeKind::Person, "The Boss"))
            .unwrap();
        builder
            .add_child(
                "boss",
                NodeData::new("alice", NodeKind::Person, "Alice").with_attribute("title", "Engineer"),
            )
            .unwrap();
        let expansion = Expansion {
            root: MemberIdentity::fallback("boss"),
            members: vec![MemberIdentity::fallback("boss"), MemberIdentity::fallback("alice")],
            tree: builder.build(),
            warnings: Vec::new(),
        };

        let context = org_context_for(&expansion, "alice").unwrap();
        assert_eq!(context.manager.as_deref(), Some("The Boss"));
        assert_eq!(context.title.as_deref(), Some("Engineer"));
        assert_eq!(context.level, 1);
        assert!(org_context_for(&expansion, "nobody").is_none());
    }
}
