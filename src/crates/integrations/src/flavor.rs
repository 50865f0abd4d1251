//! Tracker deployment flavors.

use serde::{Deserialize, Serialize};
use std::fmt;
use transport::{AuthScheme, Url};

/// Host suffixes served by the enterprise deployment.
const ENTERPRISE_DOMAINS: &[&str] = &["redhat.com"];

/// Which tracker deployment an endpoint belongs to.
///
/// The two flavors share an API but differ in authentication and in how
/// query literals are escaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFlavor {
    /// Cloud or self-hosted tracker using basic auth with an API token.
    #[default]
    Standard,
    /// Enterprise tracker using a personal access token as bearer.
    #[serde(rename = "redhat")]
    RedHat,
}

impl SourceFlavor {
    pub fn name(&self) -> &'static str {
        match self {
            SourceFlavor::Standard => "standard",
            SourceFlavor::RedHat => "redhat",
        }
    }

    /// Authentication scheme for this flavor. `Standard` needs a username;
    /// without one the token is sent as bearer.
    pub fn auth(&self, username: Option<&str>, token: &str) -> AuthScheme {
        match (self, username) {
            (SourceFlavor::Standard, Some(user)) if !user.trim().is_empty() => {
                AuthScheme::basic(user.trim(), token)
            }
            _ => AuthScheme::bearer(token),
        }
    }

    /// Whether `-` is escaped inside quoted query literals.
    pub fn escapes_hyphen(&self) -> bool {
        matches!(self, SourceFlavor::Standard)
    }
}

impl fmt::Display for SourceFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decide the flavor of `endpoint` from its host.
///
/// Unparseable URLs and non-HTTP schemes are `Standard`.
pub fn classify_endpoint(endpoint: &str) -> SourceFlavor {
    let Ok(url) = Url::parse(endpoint.trim()) else {
        return SourceFlavor::Standard;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return SourceFlavor::Standard;
    }
    let Some(host) = url.host_str() else {
        return SourceFlavor::Standard;
    };

    let host = host.to_ascii_lowercase();
    let enterprise = ENTERPRISE_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)));

    if enterprise {
        SourceFlavor::RedHat
    } else {
        SourceFlavor::Standard
    }
}
