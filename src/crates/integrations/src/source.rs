//! Traits the orchestrator drives services through.

use crate::activity::{ActivityQuery, ActivityRecord};
use crate::error::Result;
use async_trait::async_trait;
use hierarchy::{Expansion, MemberIdentity};
use transport::MetricsSnapshot;

/// A system that records work items for people.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    fn name(&self) -> &str;

    /// Activities assigned to `query.members` that changed within the range.
    ///
    /// Items that cannot be normalized come back as records carrying a
    /// `processing_error` instead of failing the whole fetch.
    async fn fetch_activities(&self, query: &ActivityQuery) -> Result<Vec<ActivityRecord>>;

    /// Cheap authenticated call proving the credentials work.
    async fn validate_connection(&self) -> Result<()>;

    fn metrics(&self) -> MetricsSnapshot;

    /// Release pooled connections. Returns `false` when already closed.
    async fn close(&self) -> bool;
}

/// A people directory that knows who reports to whom.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    fn name(&self) -> &str;

    /// Everyone under `manager`, at most `max_depth` levels down.
    async fn expand_manager(&self, manager: &str, max_depth: usize) -> Result<Expansion>;

    /// Tracker username for an email or directory id. Never fails; guesses
    /// are flagged on the returned identity.
    async fn map_identity(&self, identifier: &str) -> MemberIdentity;

    async fn validate_connection(&self) -> Result<()>;

    fn metrics(&self) -> MetricsSnapshot;

    async fn close(&self) -> bool;
}
