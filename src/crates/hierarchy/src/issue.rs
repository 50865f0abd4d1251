//! Issue (story → epic → ...) resolution.

use crate::cache::TtlCache;
use crate::error::Result;
use crate::tree::{HierarchyTree, NodeData, NodeKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const STRATEGY_PREFIXES: &[&str] = &["strategy:", "initiative:"];
const OUTCOME_PREFIXES: &[&str] = &["outcome:", "goal:", "objective:"];

/// The fields of an issue hierarchy resolution cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub key: String,
    pub summary: String,
    pub issue_type: String,
    pub status: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Modern `parent` field.
    #[serde(default)]
    pub parent_key: Option<String>,
    /// Legacy epic-link custom field.
    #[serde(default)]
    pub epic_key: Option<String>,
    /// Targets of hierarchy-typed issue links.
    #[serde(default)]
    pub linked_parents: Vec<String>,
}

impl IssueRecord {
    pub fn new(
        key: impl Into<String>,
        issue_type: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            summary: summary.into(),
            issue_type: issue_type.into(),
            status: String::new(),
            labels: Vec::new(),
            parent_key: None,
            epic_key: None,
            linked_parents: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_key = Some(parent.into());
        self
    }

    pub fn with_epic(mut self, epic: impl Into<String>) -> Self {
        self.epic_key = Some(epic.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// -1 sub-task, 1 epic, 0 everything else.
    pub fn level(&self) -> i8 {
        let issue_type = self.issue_type.to_lowercase();
        if issue_type.contains("subtask") || issue_type.contains("sub-task") {
            -1
        } else if issue_type.contains("epic") {
            1
        } else {
            0
        }
    }

    /// The parent used for the hierarchy path: `parent`, then the epic link.
    pub fn parent_ref(&self) -> Option<&str> {
        self.parent_key.as_deref().or(self.epic_key.as_deref())
    }

    /// Every parent-like reference, for batch collection.
    fn all_parent_refs(&self) -> impl Iterator<Item = &str> {
        self.parent_key
            .as_deref()
            .into_iter()
            .chain(self.epic_key.as_deref())
            .chain(self.linked_parents.iter().map(String::as_str))
    }

    fn to_node(&self) -> NodeData {
        NodeData::new(&self.key, NodeKind::Issue { level: self.level() }, &self.summary)
            .with_attribute("issue_type", &self.issue_type)
            .with_attribute("status", &self.status)
    }
}

/// Batched issue lookup.
#[async_trait]
pub trait IssueBackend: Send + Sync {
    /// Issues for `keys`, fetched with one `key in (...)` query.
    async fn fetch_issues(&self, keys: &[String]) -> Result<Vec<IssueRecord>>;

    fn page_size(&self) -> usize {
        50
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub key: String,
    pub issue_type: String,
    pub title: String,
}

impl From<&IssueRecord> for IssueRef {
    fn from(record: &IssueRecord) -> Self {
        Self {
            key: record.key.clone(),
            issue_type: record.issue_type.clone(),
            title: record.summary.clone(),
        }
    }
}

/// Where one issue sits in its hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyContext {
    pub level: i8,
    /// Top-most resolved ancestor first, the issue itself last.
    pub path: Vec<String>,
    pub parent: Option<IssueRef>,
    pub epic: Option<IssueRef>,
    pub strategies: Vec<String>,
    pub outcomes: Vec<String>,
}

/// Resolved ancestors of a batch of issues.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueHierarchy {
    pub tree: HierarchyTree,
    pub contexts: HashMap<String, HierarchyContext>,
}

impl IssueHierarchy {
    pub fn context(&self, key: &str) -> Option<&HierarchyContext> {
        self.contexts.get(key)
    }

    /// Every issue key in the resolved forest.
    pub fn keys(&self) -> Vec<String> {
        self.tree.ids().map(str::to_string).collect()
    }
}

/// Batch resolver for issue ancestry.
pub struct IssueResolver {
    backend: Arc<dyn IssueBackend>,
    cache: TtlCache<IssueRecord>,
}

impl IssueResolver {
    pub fn new(backend: Arc<dyn IssueBackend>, ttl: Duration, capacity: usize) -> Self {
        Self {
            backend,
            cache: TtlCache::new(ttl, capacity),
        }
    }

    /// Resolve the ancestors of `seeds`, at most `max_depth` levels up.
    ///
    /// Never fails: a batch that cannot be fetched degrades to whatever the
    /// cache holds for it.
    pub async fn resolve(&self, seeds: &[IssueRecord], max_depth: usize) -> IssueHierarchy {
        let mut known: HashMap<String, IssueRecord> = seeds
            .iter()
            .map(|record| (record.key.clone(), record.clone()))
            .collect();
        // Seeds first, then ancestors in fetch order.
        let mut order: Vec<String> = Vec::with_capacity(known.len());
        for seed in seeds {
            if !order.contains(&seed.key) {
                order.push(seed.key.clone());
            }
        }
        let mut requested: HashSet<String> = HashSet::new();

        let mut frontier = collect_refs(seeds.iter(), &known, &mut requested);
        info!(
            issues = seeds.len(),
            references = frontier.len(),
            "Resolving issue hierarchy"
        );

        for level in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            let fetched = self.fetch_cached(&frontier).await;
            debug!(level = level + 1, fetched = fetched.len(), "Fetched ancestor batch");

            for record in &fetched {
                if known.insert(record.key.clone(), record.clone()).is_none() {
                    order.push(record.key.clone());
                }
            }
            frontier = collect_refs(fetched.iter(), &known, &mut requested);
        }

        let contexts = seeds
            .iter()
            .map(|seed| (seed.key.clone(), build_context(seed, &known, max_depth)))
            .collect();

        let links = order
            .iter()
            .filter_map(|key| known.get(key))
            .map(|record| {
                (
                    record.to_node(),
                    record.parent_ref().map(str::to_string),
                )
            })
            .collect();

        IssueHierarchy {
            tree: HierarchyTree::from_parent_links(links),
            contexts,
        }
    }

    async fn fetch_cached(&self, keys: &[String]) -> Vec<IssueRecord> {
        let (mut hits, misses) = self.cache.get_many(keys);
        let mut records: Vec<IssueRecord> =
            keys.iter().filter_map(|key| hits.remove(key)).collect();

        if misses.is_empty() {
            debug!(cached = records.len(), "All ancestors served from cache");
            return records;
        }

        for chunk in misses.chunks(self.backend.page_size().max(1)) {
            match self.backend.fetch_issues(chunk).await {
                Ok(fetched) => {
                    for record in fetched {
                        self.cache.insert(record.key.clone(), record.clone());
                        records.push(record);
                    }
                }
                Err(e) => {
                    warn!(keys = chunk.len(), error = %e, "Ancestor batch fetch failed, using cached data");
                }
            }
        }

        records
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn collect_refs<'a>(
    records: impl Iterator<Item = &'a IssueRecord>,
    known: &HashMap<String, IssueRecord>,
    requested: &mut HashSet<String>,
) -> Vec<String> {
    let mut refs = Vec::new();
    for record in records {
        for parent in record.all_parent_refs() {
            if !known.contains_key(parent) && requested.insert(parent.to_string()) {
                refs.push(parent.to_string());
            }
        }
    }
    refs
}

fn build_context(
    seed: &IssueRecord,
    known: &HashMap<String, IssueRecord>,
    max_depth: usize,
) -> HierarchyContext {
    let mut path = vec![seed.key.clone()];
    let mut visited: HashSet<&str> = HashSet::from([seed.key.as_str()]);
    let (mut strategies, mut outcomes) = extract_tagged_labels(&seed.labels);
    let mut epic = None;

    let parent = seed
        .parent_ref()
        .and_then(|key| known.get(key))
        .map(IssueRef::from);

    let mut current = seed.parent_ref();
    let mut steps = 0;
    while let Some(key) = current {
        if steps >= max_depth || !visited.insert(key) {
            break;
        }
        let Some(record) = known.get(key) else {
            break;
        };

        path.push(record.key.clone());
        if epic.is_none() && record.level() == 1 {
            epic = Some(IssueRef::from(record));
        }
        let (s, o) = extract_tagged_labels(&record.labels);
        merge_unique(&mut strategies, s);
        merge_unique(&mut outcomes, o);

        current = record.parent_ref();
        steps += 1;
    }

    path.reverse();
    HierarchyContext {
        level: seed.level(),
        path,
        parent,
        epic,
        strategies,
        outcomes,
    }
}

fn merge_unique(into: &mut Vec<String>, values: Vec<String>) {
    for value in values {
        if !into.contains(&value) {
            into.push(value);
        }
    }
}

/// Split labels like `strategy: growth` and `goal: retention` into
/// `(strategies, outcomes)`. Prefix matching ignores case.
pub fn extract_tagged_labels(labels: &[String]) -> (Vec<String>, Vec<String>) {
    let mut strategies = Vec::new();
    let mut outcomes = Vec::new();

    for label in labels {
        let lower = label.to_lowercase();
        if let Some(value) = strip_any(label, &lower, STRATEGY_PREFIXES) {
            strategies.push(value);
        }
        if let Some(value) = strip_any(label, &lower, OUTCOME_PREFIXES) {
            outcomes.push(value);
        }
    }

    (strategies, outcomes)
}

fn strip_any(label: &str, lower: &str, prefixes: &[&str]) -> Option<String> {
    prefixes.iter().find_map(|prefix| {
        if lower.starts_with(prefix) {
            let value = label.get(prefix.len()..)?.trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}
