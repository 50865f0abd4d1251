//! Service clients that feed the pulse pipeline.
//!
//! Every client owns one [`transport::ServiceClient`], so rate limiting,
//! retries and pooling are handled the same way for all of them.
//!
//! - [`JiraActivitySource`]: issue activity for a set of people, in one of two
//!   [`SourceFlavor`]s picked by [`classify_endpoint`]
//! - [`HttpDirectoryClient`]: people directory used to expand a manager into
//!   their reporting tree

pub mod activity;
pub mod directory;
pub mod error;
pub mod flavor;
pub mod jira;
pub mod jql;
pub mod source;

pub use activity::{
    org_context_for, ActivityQuery, ActivityRecord, ActivityStats, ChangeEntry, CommentEntry,
    DateRange, OrgContext, RelatedIssues,
};
pub use directory::{DirectorySettings, HttpDirectoryClient};
pub use error::{IntegrationError, Result};
pub use flavor::{classify_endpoint, SourceFlavor};
pub use jira::{JiraActivitySource, TrackerSettings};
pub use source::{ActivitySource, DirectorySource};
