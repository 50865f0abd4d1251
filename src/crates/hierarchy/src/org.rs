//! Organizational (manager → reports) resolution.

use crate::cache::TtlCache;
use crate::error::{HierarchyError, Result};
use crate::mapping::MemberIdentity;
use crate::tree::{HierarchyTree, NodeData, NodeKind, TreeBuilder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Directory username; also the tracker username.
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    /// `uid` of this person's manager.
    #[serde(default)]
    pub manager_uid: Option<String>,
}

impl Person {
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: display_name.into(),
            title: None,
            department: None,
            manager_uid: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_manager(mut self, manager_uid: impl Into<String>) -> Self {
        self.manager_uid = Some(manager_uid.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    fn to_node(&self) -> NodeData {
        let mut data = NodeData::new(&self.uid, NodeKind::Person, &self.display_name);
        if let Some(email) = &self.email {
            data = data.with_attribute("email", email);
        }
        if let Some(title) = &self.title {
            data = data.with_attribute("title", title);
        }
        if let Some(department) = &self.department {
            data = data.with_attribute("department", department);
        }
        data
    }
}

/// Query surface of a people directory.
#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    /// Entries matching an email or uid. More than one hit is ambiguous.
    async fn lookup(&self, identifier: &str) -> Result<Vec<Person>>;

    /// Direct reports of every manager in `manager_uids`, in one filtered
    /// query. Each returned person carries its `manager_uid`.
    async fn direct_reports(&self, manager_uids: &[String]) -> Result<Vec<Person>>;

    /// Largest number of identifiers a single filtered query may carry.
    fn page_size(&self) -> usize {
        50
    }
}

/// Result of expanding a manager into their reporting tree.
#[derive(Debug, Clone, Serialize)]
pub struct Expansion {
    pub root: MemberIdentity,
    /// Everyone in the tree, the root included, without duplicates.
    pub members: Vec<MemberIdentity>,
    pub tree: HierarchyTree,
    /// Partial failures that did not abort the expansion.
    pub warnings: Vec<String>,
}

impl Expansion {
    pub fn usernames(&self) -> Vec<String> {
        self.members.iter().map(|m| m.username.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Batch resolver for manager → reports trees.
pub struct OrgResolver {
    backend: Arc<dyn DirectoryBackend>,
    lookups: TtlCache<Vec<Person>>,
    reports: TtlCache<Vec<Person>>,
}

impl OrgResolver {
    pub fn new(backend: Arc<dyn DirectoryBackend>, ttl: Duration, capacity: usize) -> Self {
        Self {
            backend,
            lookups: TtlCache::new(ttl, capacity),
            reports: TtlCache::new(ttl, capacity),
        }
    }

    /// The unique directory entry for `identifier`.
    pub async fn lookup_person(&self, identifier: &str) -> Result<Person> {
        let key = identifier.trim().to_lowercase();
        let hits = match self.lookups.get(&key) {
            Some(hits) => hits,
            None => {
                let hits = self.backend.lookup(identifier.trim()).await?;
                self.lookups.insert(key, hits.clone());
                hits
            }
        };

        if hits.len() > 1 {
            return Err(HierarchyError::Ambiguous {
                identifier: identifier.to_string(),
                count: hits.len(),
            });
        }
        hits.into_iter()
            .next()
            .ok_or_else(|| HierarchyError::NotFound(identifier.to_string()))
    }

    /// Map an external identifier to a tracker username, falling back to a
    /// flagged guess when the directory cannot answer unambiguously.
    pub async fn map_identity(&self, identifier: &str) -> MemberIdentity {
        match self.lookup_person(identifier).await {
            Ok(person) => MemberIdentity::from_person(&person),
            Err(e) => {
                let identity = MemberIdentity::fallback(identifier);
                warn!(
                    identifier = identifier,
                    username = %identity.username,
                    source = %identity.source,
                    error = %e,
                    "Directory mapping failed, using fallback username"
                );
                identity
            }
        }
    }

    /// Expand `root_identifier` into everyone reporting to them, at most
    /// `max_depth` levels down.
    ///
    /// People already placed are skipped, so cyclic directory data cannot
    /// duplicate parentage; the depth bound guarantees termination.
    pub async fn expand(&self, root_identifier: &str, max_depth: usize) -> Result<Expansion> {
        let root = self.lookup_person(root_identifier).await?;
        info!(root = %root.uid, max_depth = max_depth, "Expanding organization");

        let mut builder = TreeBuilder::new();
        builder.add_root(root.to_node())?;

        let root_identity = MemberIdentity::from_person(&root);
        let mut members = vec![root_identity.clone()];
        let mut warnings = Vec::new();
        let mut frontier = vec![root.uid.clone()];

        for depth in 0..max_depth {
            if frontier.is_empty() {
                break;
            }

            let reports = self.reports_for(&frontier, &mut warnings).await;
            let mut next = Vec::new();

            for manager in &frontier {
                for person in reports.get(manager).map(Vec::as_slice).unwrap_or_default() {
                    if builder.contains(&person.uid) {
                        debug!(uid = %person.uid, manager = %manager, "Already placed, skipping");
                        continue;
                    }
                    builder.add_child(manager, person.to_node())?;
                    members.push(MemberIdentity::from_person(person));
                    next.push(person.uid.clone());
                }
            }

            debug!(depth = depth + 1, added = next.len(), "Resolved organization level");
            frontier = next;
        }

        let tree = builder.build();
        info!(
            root = %root.uid,
            members = members.len(),
            depth = tree.max_depth().unwrap_or(0),
            "Organization expanded"
        );

        Ok(Expansion {
            root: root_identity,
            members,
            tree,
            warnings,
        })
    }

    /// Reports of each manager: cached lists first, then one batched query
    /// per page of misses. Failed pages are recorded in `warnings`.
    async fn reports_for(
        &self,
        managers: &[String],
        warnings: &mut Vec<String>,
    ) -> HashMap<String, Vec<Person>> {
        let (mut resolved, misses) = self.reports.get_many(managers);

        for chunk in misses.chunks(self.backend.page_size().max(1)) {
            match self.backend.direct_reports(chunk).await {
                Ok(people) => {
                    let mut grouped: HashMap<String, Vec<Person>> =
                        chunk.iter().map(|m| (m.clone(), Vec::new())).collect();
                    for person in people {
                        let Some(manager) = person.manager_uid.clone() else {
                            continue;
                        };
                        if let Some(list) = grouped.get_mut(&manager) {
                            list.push(person);
                        }
                    }
                    for (manager, list) in grouped {
                        self.reports.insert(manager.clone(), list.clone());
                        resolved.insert(manager, list);
                    }
                }
                Err(e) => {
                    warn!(managers = chunk.len(), error = %e, "Direct report lookup failed");
                    warnings.push(format!(
                        "could not load direct reports for {}: {}",
                        chunk.join(", "),
                        e
                    ));
                }
            }
        }

        resolved
    }

    pub fn clear_cache(&self) {
        self.lookups.clear();
        self.reports.clear();
    }
}
