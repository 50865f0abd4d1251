//! External identifier → tracker username mapping.

use crate::org::Person;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a member's username came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    /// Resolved through a unique directory entry.
    Directory,
    /// Directory lookup failed or was ambiguous; the email's local part was used.
    EmailLocalPart,
    /// Not an email and not in the directory; used as given.
    Verbatim,
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MappingSource::Directory => "directory",
            MappingSource::EmailLocalPart => "email_local_part",
            MappingSource::Verbatim => "verbatim",
        };
        f.write_str(name)
    }
}

/// A team member as the activity source should query them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub source: MappingSource,
}

impl MemberIdentity {
    pub fn from_person(person: &Person) -> Self {
        Self {
            username: person.uid.clone(),
            email: person.email.clone(),
            display_name: Some(person.display_name.clone()),
            source: MappingSource::Directory,
        }
    }

    /// Best-effort identity for an identifier the directory could not resolve.
    pub fn fallback(identifier: &str) -> Self {
        let identifier = identifier.trim();
        match email_local_part(identifier) {
            Some(local) => Self {
                username: local.to_string(),
                email: Some(identifier.to_string()),
                display_name: None,
                source: MappingSource::EmailLocalPart,
            },
            None => Self {
                username: identifier.to_string(),
                email: None,
                display_name: None,
                source: MappingSource::Verbatim,
            },
        }
    }

    /// Whether the username was guessed rather than verified.
    pub fn is_fallback(&self) -> bool {
        self.source != MappingSource::Directory
    }
}

/// `alice` for `alice@example.com`; `None` for anything that is not an email.
pub fn email_local_part(identifier: &str) -> Option<&str> {
    let (local, domain) = identifier.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(local)
}
