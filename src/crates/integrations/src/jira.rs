//! Issue-tracker activity source.
//!
//! Talks to the tracker's v2 REST API: `/rest/api/2/search` for activity and
//! ancestor batches, `/rest/api/2/myself` for connection checks. Requests go
//! through a [`ServiceClient`], so every page is rate limited and retried.

use crate::activity::{ActivityQuery, ActivityRecord, ChangeEntry, CommentEntry, RelatedIssues};
use crate::error::{IntegrationError, Result};
use crate::flavor::{classify_endpoint, SourceFlavor};
use crate::jql;
use crate::source::ActivitySource;
use async_trait::async_trait;
use hierarchy::{IssueBackend, IssueRecord, IssueResolver};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use transport::{ClientConfig, MetricsSnapshot, RequestSpec, ServiceClient};

const SEARCH_PATH: &str = "/rest/api/2/search";
const MYSELF_PATH: &str = "/rest/api/2/myself";

const ACTIVITY_FIELDS: &[&str] = &[
    "summary",
    "description",
    "status",
    "assignee",
    "created",
    "updated",
    "priority",
    "issuetype",
    "project",
    "labels",
    "parent",
    "issuelinks",
    "subtasks",
];

const ANCESTOR_FIELDS: &[&str] = &["summary", "issuetype", "status", "labels", "parent", "issuelinks"];

/// Link types that express parentage rather than a peer relation.
const HIERARCHY_LINKS: &[&str] = &["epic-story link", "parent", "hierarchy"];

/// Connection and behavior settings for [`JiraActivitySource`].
#[derive(Clone)]
pub struct TrackerSettings {
    pub base_url: String,
    /// Account for basic auth; unused by the enterprise flavor.
    pub username: Option<String>,
    pub token: String,
    /// Forced flavor; detected from `base_url` when unset.
    pub flavor: Option<SourceFlavor>,
    /// Issues requested per search page.
    pub page_size: usize,
    /// Custom field holding the legacy epic link.
    pub epic_link_field: String,
    /// Attach ancestor context to fetched activities.
    pub resolve_hierarchy: bool,
    pub hierarchy_depth: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl TrackerSettings {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            token: token.into(),
            flavor: None,
            page_size: 50,
            epic_link_field: "customfield_10007".to_string(),
            resolve_hierarchy: true,
            hierarchy_depth: 3,
            cache_ttl: Duration::from_secs(3600),
            cache_capacity: 1000,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_flavor(mut self, flavor: SourceFlavor) -> Self {
        self.flavor = Some(flavor);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_hierarchy(mut self, enabled: bool, depth: usize) -> Self {
        self.resolve_hierarchy = enabled;
        self.hierarchy_depth = depth;
        self
    }

    pub fn flavor(&self) -> SourceFlavor {
        self.flavor
            .unwrap_or_else(|| classify_endpoint(&self.base_url))
    }
}

impl fmt::Debug for TrackerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("token", &"***")
            .field("flavor", &self.flavor)
            .field("page_size", &self.page_size)
            .field("epic_link_field", &self.epic_link_field)
            .field("resolve_hierarchy", &self.resolve_hierarchy)
            .field("hierarchy_depth", &self.hierarchy_depth)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    key: String,
    #[serde(default)]
    fields: RawFields,
    #[serde(default)]
    changelog: Option<RawChangelog>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFields {
    summary: Option<String>,
    description: Option<Value>,
    status: Option<Named>,
    assignee: Option<RawUser>,
    created: Option<String>,
    updated: Option<String>,
    priority: Option<Named>,
    issuetype: Option<Named>,
    project: Option<RawProject>,
    labels: Vec<String>,
    parent: Option<KeyRef>,
    issuelinks: Vec<RawLink>,
    subtasks: Vec<KeyRef>,
    comment: Option<RawComments>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct KeyRef {
    key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawUser {
    name: Option<String>,
    account_id: Option<String>,
    display_name: Option<String>,
    email_address: Option<String>,
}

impl RawUser {
    fn username(&self) -> Option<String> {
        self.name
            .clone()
            .or_else(|| self.account_id.clone())
            .or_else(|| self.email_address.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RawProject {
    key: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLink {
    #[serde(rename = "type")]
    link_type: Named,
    #[serde(default)]
    inward_issue: Option<KeyRef>,
    #[serde(default)]
    outward_issue: Option<KeyRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawComments {
    comments: Vec<RawComment>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    author: Option<RawUser>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    created: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawChangelog {
    histories: Vec<RawHistory>,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    #[serde(default)]
    author: Option<RawUser>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    items: Vec<RawChangeItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChangeItem {
    field: String,
    #[serde(default)]
    from_string: Option<String>,
    #[serde(default)]
    to_string: Option<String>,
}

/// Text of a field that is either a plain string or a rich-text document.
fn plain_text(value: &Value) -> Option<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.push(s.clone()),
            Value::Object(map) => {
                if let Some(Value::String(text)) = map.get("text") {
                    out.push(text.clone());
                }
                if let Some(content) = map.get("content") {
                    collect(content, out);
                }
            }
            Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
            _ => {}
        }
    }

    let mut parts = Vec::new();
    collect(value, &mut parts);
    let text = parts.join(" ").trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Key held by the epic-link field, which is a bare key or a `{key}` object.
fn epic_key(fields: &Value, field: &str) -> Option<String> {
    match fields.get(field)? {
        Value::String(key) if !key.is_empty() => Some(key.clone()),
        Value::Object(map) => map.get("key").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn split_links(links: &[RawLink]) -> (Vec<String>, RelatedIssues) {
    let mut parents = Vec::new();
    let mut related = RelatedIssues::default();

    for link in links {
        let name = link.link_type.name.to_lowercase();
        let inward = link.inward_issue.as_ref().map(|k| k.key.clone());
        let outward = link.outward_issue.as_ref().map(|k| k.key.clone());

        if HIERARCHY_LINKS.contains(&name.as_str()) {
            parents.extend(inward.into_iter().chain(outward));
        } else if name.contains("block") {
            related.blocks.extend(outward);
            related.blocked_by.extend(inward);
        } else {
            related.relates_to.extend(inward.into_iter().chain(outward));
        }
    }

    (parents, related)
}

/// HTTP half of the source, shared with the ancestor resolver.
struct JiraApi {
    client: ServiceClient,
    flavor: SourceFlavor,
    base_url: String,
    epic_link_field: String,
    page_size: usize,
}

impl JiraApi {
    async fn search(
        &self,
        jql: &str,
        start_at: usize,
        max_results: usize,
        fields: &str,
        expand: Option<&str>,
    ) -> Result<SearchPage> {
        let mut spec = RequestSpec::get(SEARCH_PATH)
            .with_query("jql", jql)
            .with_query("startAt", start_at.to_string())
            .with_query("maxResults", max_results.to_string())
            .with_query("fields", fields);
        if let Some(expand) = expand {
            spec = spec.with_query("expand", expand);
        }

        let value = self.client.request(spec).await?;
        serde_json::from_value(value)
            .map_err(|e| IntegrationError::response(self.client.name(), e.to_string()))
    }

    fn activity_fields(&self, include_comments: bool) -> String {
        let mut fields: Vec<&str> = ACTIVITY_FIELDS.to_vec();
        fields.push(&self.epic_link_field);
        if include_comments {
            fields.push("comment");
        }
        fields.join(",")
    }

    fn parse_activity(&self, raw: Value) -> ActivityRecord {
        let key = raw
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let epic = raw
            .get("fields")
            .and_then(|fields| epic_key(fields, &self.epic_link_field));

        let issue: RawIssue = match serde_json::from_value(raw) {
            Ok(issue) => issue,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to process issue");
                return ActivityRecord::failed(key, e.to_string());
            }
        };

        let fields = issue.fields;
        let (linked_parents, mut related) = split_links(&fields.issuelinks);
        related.subtasks = fields.subtasks.into_iter().map(|k| k.key).collect();

        let mut record = ActivityRecord::new(
            &issue.key,
            "issue",
            fields.summary.unwrap_or_default(),
        );
        record.description = fields.description.as_ref().and_then(plain_text);
        record.status = fields.status.map(|s| s.name);
        record.issue_type = fields.issuetype.map(|t| t.name);
        record.priority = fields.priority.map(|p| p.name);
        if let Some(assignee) = fields.assignee {
            record.assignee_username = assignee.username();
            record.assignee = assignee.display_name;
        }
        record.created = fields.created;
        record.updated = fields.updated;
        record.url = Some(format!("{}/browse/{}", self.base_url, issue.key));
        if let Some(project) = fields.project {
            record.project = Some(project.key);
            record.project_name = project.name;
        }
        record.labels = fields.labels;
        record.parent_key = fields.parent.map(|p| p.key);
        record.epic_key = epic;
        record.linked_parents = linked_parents;
        record.related = related;

        record.comments = fields
            .comment
            .map(|c| c.comments)
            .unwrap_or_default()
            .into_iter()
            .map(|c| CommentEntry {
                id: c.id,
                author: c.author.and_then(|a| a.display_name),
                body: c.body.as_ref().and_then(plain_text).unwrap_or_default(),
                created: c.created,
            })
            .collect();

        record.changes = issue
            .changelog
            .map(|c| c.histories)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|history| {
                let author = history.author.and_then(|a| a.display_name);
                let created = history.created;
                history.items.into_iter().map(move |item| ChangeEntry {
                    field: item.field,
                    from: item.from_string,
                    to: item.to_string,
                    author: author.clone(),
                    created: created.clone(),
                })
            })
            .collect();

        record
    }

    fn parse_ancestor(&self, raw: Value) -> Option<IssueRecord> {
        let epic = raw
            .get("fields")
            .and_then(|fields| epic_key(fields, &self.epic_link_field));
        let issue: RawIssue = match serde_json::from_value(raw) {
            Ok(issue) => issue,
            Err(e) => {
                debug!(error = %e, "Skipping malformed ancestor");
                return None;
            }
        };

        let fields = issue.fields;
        let (linked_parents, _) = split_links(&fields.issuelinks);
        Some(IssueRecord {
            key: issue.key,
            summary: fields.summary.unwrap_or_default(),
            issue_type: fields.issuetype.map(|t| t.name).unwrap_or_default(),
            status: fields.status.map(|s| s.name).unwrap_or_default(),
            labels: fields.labels,
            parent_key: fields.parent.map(|p| p.key),
            epic_key: epic,
            linked_parents,
        })
    }
}

#[async_trait]
impl IssueBackend for JiraApi {
    async fn fetch_issues(&self, keys: &[String]) -> hierarchy::Result<Vec<IssueRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut fields: Vec<&str> = ANCESTOR_FIELDS.to_vec();
        fields.push(&self.epic_link_field);

        let jql = jql::keys_query(keys, self.flavor);
        let page = self
            .search(&jql, 0, keys.len(), &fields.join(","), None)
            .await?;

        Ok(page
            .issues
            .into_iter()
            .filter_map(|raw| self.parse_ancestor(raw))
            .collect())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

/// [`ActivitySource`] backed by a tracker's REST API.
pub struct JiraActivitySource {
    api: Arc<JiraApi>,
    resolver: Option<IssueResolver>,
    hierarchy_depth: usize,
}

impl JiraActivitySource {
    /// Build a source from tracker settings and the transport profile to use.
    ///
    /// `client.base_url` and `client.auth` are replaced by values derived
    /// from `settings`.
    pub fn new(settings: TrackerSettings, client: ClientConfig) -> Result<Self> {
        if settings.token.trim().is_empty() {
            return Err(IntegrationError::Configuration(
                "tracker API token is required".to_string(),
            ));
        }

        let flavor = settings.flavor();
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        let mut config = client;
        config.base_url = base_url.clone();
        config.auth = flavor.auth(settings.username.as_deref(), &settings.token);

        let client = ServiceClient::new("tracker", config)?;
        info!(
            base_url = %base_url,
            flavor = %flavor,
            auth = client.config().auth.scheme_name(),
            "Tracker source configured"
        );

        let api = Arc::new(JiraApi {
            client,
            flavor,
            base_url,
            epic_link_field: settings.epic_link_field.clone(),
            page_size: settings.page_size.max(1),
        });
        let resolver = settings.resolve_hierarchy.then(|| {
            IssueResolver::new(
                Arc::clone(&api) as Arc<dyn IssueBackend>,
                settings.cache_ttl,
                settings.cache_capacity,
            )
        });

        Ok(Self {
            api,
            resolver,
            hierarchy_depth: settings.hierarchy_depth,
        })
    }

    pub fn flavor(&self) -> SourceFlavor {
        self.api.flavor
    }

    pub fn client(&self) -> &ServiceClient {
        &self.api.client
    }

    async fn attach_hierarchy(&self, records: &mut [ActivityRecord]) {
        let Some(resolver) = &self.resolver else {
            return;
        };

        let seeds: Vec<IssueRecord> = records
            .iter()
            .filter(|r| !r.is_failed())
            .map(|r| IssueRecord {
                key: r.id.clone(),
                summary: r.title.clone(),
                issue_type: r.issue_type.clone().unwrap_or_default(),
                status: r.status.clone().unwrap_or_default(),
                labels: r.labels.clone(),
                parent_key: r.parent_key.clone(),
                epic_key: r.epic_key.clone(),
                linked_parents: r.linked_parents.clone(),
            })
            .collect();
        if seeds.is_empty() {
            return;
        }

        let hierarchy = resolver.resolve(&seeds, self.hierarchy_depth).await;
        for record in records.iter_mut() {
            record.hierarchy = hierarchy.context(&record.id).cloned();
        }
    }
}

#[async_trait]
impl ActivitySource for JiraActivitySource {
    fn name(&self) -> &str {
        self.api.client.name()
    }

    async fn fetch_activities(&self, query: &ActivityQuery) -> Result<Vec<ActivityRecord>> {
        query.validate()?;

        let jql = jql::activity_query(query, self.api.flavor);
        let fields = self.api.activity_fields(query.include_comments);
        debug!(jql = %jql, "Searching tracker");

        let mut records = Vec::new();
        let mut start_at = 0;
        loop {
            let remaining = query.max_results - records.len();
            let page = self
                .api
                .search(
                    &jql,
                    start_at,
                    remaining.min(self.api.page_size),
                    &fields,
                    Some("changelog"),
                )
                .await?;

            let received = page.issues.len();
            records.extend(page.issues.into_iter().map(|raw| self.api.parse_activity(raw)));
            start_at += received;
            debug!(received = received, total = page.total, "Fetched search page");

            if received == 0 || start_at >= page.total || records.len() >= query.max_results {
                break;
            }
        }

        self.attach_hierarchy(&mut records).await;

        let failed = records.iter().filter(|r| r.is_failed()).count();
        info!(
            members = query.members.len(),
            activities = records.len(),
            failed = failed,
            "Fetched tracker activity"
        );
        Ok(records)
    }

    async fn validate_connection(&self) -> Result<()> {
        let me = self.api.client.get(MYSELF_PATH, &[]).await?;
        let user = me
            .get("displayName")
            .or_else(|| me.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(user = user, "Tracker connection validated");
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.api.client.metrics()
    }

    async fn close(&self) -> bool {
        self.api.client.close().await
    }
}
