//! Hierarchy resolution for pulse.
//!
//! Remote services only answer single-node lookups or filtered list queries,
//! so trees are reconstructed in batches:
//!
//! 1. **collect** every unresolved reference at the current frontier,
//! 2. **fetch** the cache misses with one `identifier in (...)` query per page,
//! 3. **build** the next level, strictly bounded by `max_depth`.
//!
//! [`OrgResolver`] walks manager → reports downwards; [`IssueResolver`] walks
//! story → epic → initiative upwards. Both produce an arena-backed
//! [`HierarchyTree`].

pub mod cache;
pub mod error;
pub mod issue;
pub mod mapping;
pub mod org;
pub mod tree;

pub use cache::TtlCache;
pub use error::{HierarchyError, Result};
pub use issue::{HierarchyContext, IssueBackend, IssueHierarchy, IssueRecord, IssueResolver};
pub use mapping::{email_local_part, MappingSource, MemberIdentity};
pub use org::{DirectoryBackend, Expansion, OrgResolver, Person};
pub use tree::{HierarchyNode, HierarchyTree, NodeData, NodeId, NodeKind, TreeBuilder};
