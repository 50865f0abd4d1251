//! Arena-backed hierarchy trees.
//!
//! Nodes live in a flat `Vec` and refer to each other by [`NodeId`]. Parent →
//! children edges are recorded once, when the child is added; a finished
//! [`HierarchyTree`] is never patched, only rebuilt.

use crate::error::{HierarchyError, Result};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Index of a node inside its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Person,
    /// `level`: -1 sub-task, 0 story/task, 1 epic, 2 and above portfolio items.
    Issue { level: i8 },
}

/// Payload of a node before it is placed in a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub id: String,
    pub kind: NodeKind,
    pub display_name: String,
    pub attributes: BTreeMap<String, String>,
}

impl NodeData {
    pub fn new(id: impl Into<String>, kind: NodeKind, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// One resolved node.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub id: String,
    pub kind: NodeKind,
    pub display_name: String,
    pub attributes: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
}

impl HierarchyNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Distance from the root of this node's tree; roots are at depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Incrementally assembles a [`HierarchyTree`].
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<HierarchyNode>,
    index: HashMap<String, NodeId>,
    roots: Vec<NodeId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_root(&mut self, data: NodeData) -> Result<NodeId> {
        let id = self.push(data, None, 0)?;
        self.roots.push(id);
        Ok(id)
    }

    /// Place `data` under the node identified by `parent`.
    ///
    /// Fails if `data.id` is already placed: the first placement wins, so a
    /// node can never have two parents.
    pub fn add_child(&mut self, parent: &str, data: NodeData) -> Result<NodeId> {
        let parent_id = *self
            .index
            .get(parent)
            .ok_or_else(|| HierarchyError::UnknownParent(parent.to_string()))?;
        let depth = self.nodes[parent_id.0].depth + 1;
        let id = self.push(data, Some(parent_id), depth)?;
        self.nodes[parent_id.0].children.push(id);
        Ok(id)
    }

    fn push(&mut self, data: NodeData, parent: Option<NodeId>, depth: usize) -> Result<NodeId> {
        if self.index.contains_key(&data.id) {
            return Err(HierarchyError::DuplicateNode(data.id));
        }
        let id = NodeId(self.nodes.len());
        self.index.insert(data.id.clone(), id);
        self.nodes.push(HierarchyNode {
            id: data.id,
            kind: data.kind,
            display_name: data.display_name,
            attributes: data.attributes,
            parent,
            children: Vec::new(),
            depth,
        });
        Ok(id)
    }

    pub fn build(self) -> HierarchyTree {
        HierarchyTree {
            nodes: self.nodes,
            index: self.index,
            roots: self.roots,
        }
    }
}

/// First id that repeats when following `parent_of` links from `start`.
fn cycle_member(start: &str, parent_of: &HashMap<String, String>) -> String {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = start;
    while seen.insert(current) {
        match parent_of.get(current) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current.to_string()
}

/// Immutable forest of resolved nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyTree {
    nodes: Vec<HierarchyNode>,
    index: HashMap<String, NodeId>,
    roots: Vec<NodeId>,
}

impl HierarchyTree {
    /// Build a forest from `(node, parent id)` pairs in any order.
    ///
    /// Nodes whose parent is absent become roots. For each parent cycle, the
    /// first cycle member reached from the earliest unplaced node (in input
    /// order) becomes a root; nodes hanging off the cycle keep their parent.
    /// Every node appears exactly once.
    pub fn from_parent_links(items: Vec<(NodeData, Option<String>)>) -> Self {
        let present: HashSet<String> = items.iter().map(|(data, _)| data.id.clone()).collect();
        let mut order: Vec<String> = Vec::with_capacity(items.len());
        let mut by_id: HashMap<String, NodeData> = HashMap::with_capacity(items.len());
        let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
        let mut parent_of: HashMap<String, String> = HashMap::new();
        let mut root_ids: Vec<String> = Vec::new();

        for (data, parent) in items {
            if by_id.contains_key(&data.id) {
                continue;
            }
            match parent.filter(|p| present.contains(p) && *p != data.id) {
                Some(parent) => {
                    children_of.entry(parent.clone()).or_default().push(data.id.clone());
                    parent_of.insert(data.id.clone(), parent);
                }
                None => root_ids.push(data.id.clone()),
            }
            order.push(data.id.clone());
            by_id.insert(data.id.clone(), data);
        }

        let mut builder = TreeBuilder::new();
        let mut queue: VecDeque<(Option<String>, String)> =
            root_ids.into_iter().map(|id| (None, id)).collect();
        let mut cursor = 0;

        loop {
            while let Some((parent, id)) = queue.pop_front() {
                let Some(data) = by_id.remove(&id) else {
                    continue;
                };
                let placed = match &parent {
                    Some(parent) => builder.add_child(parent, data),
                    None => builder.add_root(data),
                };
                if placed.is_ok() {
                    for child in children_of.get(&id).into_iter().flatten() {
                        queue.push_back((Some(id.clone()), child.clone()));
                    }
                }
            }

            // Whatever is left sits on or below a cycle. Walk up from the
            // earliest leftover until an id repeats and promote that id.
            while cursor < order.len() && !by_id.contains_key(&order[cursor]) {
                cursor += 1;
            }
            let Some(start) = order.get(cursor) else {
                break;
            };
            queue.push_back((None, cycle_member(start, &parent_of)));
        }

        builder.build()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// First root, for single-rooted trees.
    pub fn root(&self) -> Option<&HierarchyNode> {
        self.roots.first().map(|id| &self.nodes[id.0])
    }

    pub fn node(&self, id: NodeId) -> &HierarchyNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: &str) -> Option<&HierarchyNode> {
        self.index.get(id).map(|nid| &self.nodes[nid.0])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn children(&self, id: &str) -> Vec<&HierarchyNode> {
        self.get(id)
            .map(|node| node.children.iter().map(|c| &self.nodes[c.0]).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: &str) -> Option<&HierarchyNode> {
        self.get(id)
            .and_then(|node| node.parent)
            .map(|p| &self.nodes[p.0])
    }

    /// Identifiers from `id` up to its root, `id` first.
    pub fn path_to_root(&self, id: &str) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = self.index.get(id).copied();
        while let Some(nid) = current {
            let node = &self.nodes[nid.0];
            path.push(node.id.clone());
            current = node.parent;
        }
        path
    }

    /// Greatest node depth; a lone root has depth 0, an empty tree `None`.
    pub fn max_depth(&self) -> Option<usize> {
        self.nodes.iter().map(|n| n.depth).max()
    }

    /// Node identifiers in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    /// Pre-order traversal across all roots.
    pub fn walk(&self) -> Vec<&HierarchyNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(nid) = stack.pop() {
            let node = &self.nodes[nid.0];
            out.push(node);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Nested owned view, one entry per root.
    pub fn to_nested(&self) -> Vec<NestedNode> {
        self.roots.iter().map(|r| self.nest(*r)).collect()
    }

    fn nest(&self, id: NodeId) -> NestedNode {
        let node = &self.nodes[id.0];
        NestedNode {
            id: node.id.clone(),
            kind: node.kind.clone(),
            display_name: node.display_name.clone(),
            attributes: node.attributes.clone(),
            children: node.children.iter().map(|c| self.nest(*c)).collect(),
        }
    }
}

/// Serializable nested form of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedNode {
    pub id: String,
    pub kind: NodeKind,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NestedNode>,
}

impl Serialize for HierarchyTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_nested().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str) -> NodeData {
        NodeData::new(id, NodeKind::Person, id.to_uppercase())
    }

    #[test]
    fn test_builder_records_edges_and_depth() {
        let mut builder = TreeBuilder::new();
        builder.add_root(person("boss")).unwrap();
        builder.add_child("boss", person("alice")).unwrap();
        builder.add_child("boss", person("bob")).unwrap();
        builder.add_child("alice", person("carol")).unwrap();
        let tree = builder.build();

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.root().unwrap().id, "boss");
        let kids: Vec<_> = tree.children("boss").iter().map(|n| n.id.clone()).collect();
        assert_eq!(kids, vec!["alice", "bob"]);
        assert_eq!(tree.get("carol").unwrap().depth(), 2);
        assert_eq!(tree.parent("carol").unwrap().id, "alice");
        assert_eq!(tree.path_to_root("carol"), vec!["carol", "alice", "boss"]);
        assert_eq!(tree.max_depth(), Some(2));
    }

    #[test]
    fn test_duplicate_and_unknown_parent_rejected() {
        let mut builder = TreeBuilder::new();
        builder.add_root(person("boss")).unwrap();
        builder.add_child("boss", person("alice")).unwrap();

        assert!(matches!(
            builder.add_child("boss", person("alice")),
            Err(HierarchyError::DuplicateNode(_))
        ));
        assert!(matches!(
            builder.add_child("ghost", person("zed")),
            Err(HierarchyError::UnknownParent(_))
        ));
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_children_only_reference_their_parent() {
        let mut builder = TreeBuilder::new();
        builder.add_root(person("a")).unwrap();
        builder.add_child("a", person("b")).unwrap();
        builder.add_child("a", person("c")).unwrap();
        builder.add_child("b", person("d")).unwrap();
        let tree = builder.build();

        for node in tree.walk() {
            for child in node.children() {
                let child = tree.node(*child);
                assert_eq!(tree.parent(&child.id).unwrap().id, node.id);
            }
        }
    }

    #[test]
    fn test_from_parent_links_builds_forest() {
        let issue = |key: &str, level| NodeData::new(key, NodeKind::Issue { level }, key);
        let tree = HierarchyTree::from_parent_links(vec![
            (issue("STORY-1", 0), Some("EPIC-1".to_string())),
            (issue("STORY-2", 0), Some("EPIC-1".to_string())),
            (issue("EPIC-1", 1), None),
            (issue("TASK-9", 0), Some("MISSING-1".to_string())),
        ]);

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.parent("STORY-1").unwrap().id, "EPIC-1");
        assert!(tree.parent("TASK-9").is_none());
        assert_eq!(tree.max_depth(), Some(1));
    }

    #[test]
    fn test_from_parent_links_breaks_cycles() {
        let tree = HierarchyTree::from_parent_links(vec![
            (person("a"), Some("b".to_string())),
            (person("b"), Some("a".to_string())),
        ]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.root().unwrap().id, "a");
        assert_eq!(tree.parent("b").unwrap().id, "a");
    }

    #[test]
    fn test_nodes_below_a_cycle_keep_their_parent() {
        let link = |id: &str, parent: &str| (person(id), Some(parent.to_string()));
        let orders = [
            vec![link("s-1", "a-1"), link("a-1", "a-2"), link("a-2", "a-1")],
            vec![link("a-1", "a-2"), link("s-1", "a-1"), link("a-2", "a-1")],
            vec![link("a-2", "a-1"), link("a-1", "a-2"), link("s-1", "a-1")],
        ];

        for items in orders {
            let tree = HierarchyTree::from_parent_links(items);
            assert_eq!(tree.len(), 3);
            assert_eq!(tree.roots().len(), 1);
            assert_eq!(tree.parent("s-1").unwrap().id, "a-1");
            assert_ne!(tree.root().unwrap().id, "s-1");
        }
    }

    #[test]
    fn test_serializes_as_nested_structure() {
        let mut builder = TreeBuilder::new();
        builder
            .add_root(person("boss").with_attribute("title", "Director"))
            .unwrap();
        builder.add_child("boss", person("alice")).unwrap();
        let value = serde_json::to_value(builder.build()).unwrap();

        assert_eq!(value[0]["id"], "boss");
        assert_eq!(value[0]["kind"]["type"], "person");
        assert_eq!(value[0]["attributes"]["title"], "Director");
        assert_eq!(value[0]["children"][0]["id"], "alice");
    }
}
