//! Error types for the request core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for request operations.
pub type Result<T> = std::result::Result<T, RequestError>;

/// Coarse failure taxonomy shared by every crate in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid settings or credentials. Never retried.
    Configuration,
    /// The remote service rejected our credentials. Never retried.
    Authentication,
    /// The remote service signalled throttling.
    RateLimit,
    /// Any other remote failure.
    Integration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Integration => "integration",
        };
        f.write_str(name)
    }
}

/// Errors produced by a single request.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// HTTP 429.
    #[error("rate limit exceeded{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 401 or 403.
    #[error("authentication failed with status {status}")]
    Authentication { status: u16 },

    /// Any other HTTP status >= 400.
    #[error("request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// The per-call timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established or was dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Invalid client configuration (bad URL, bad header, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The client has been closed.
    #[error("client is closed")]
    Closed,
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {}s", d.as_secs()),
        None => String::new(),
    }
}

/// Anything the retry loop can reason about.
pub trait Classify {
    /// Taxonomy bucket of this failure.
    fn kind(&self) -> ErrorKind;

    /// HTTP status, when the failure came from a response.
    fn status(&self) -> Option<u16> {
        None
    }

    /// Whether the failure is expected to clear up on its own.
    fn is_transient(&self) -> bool {
        false
    }

    /// Server-supplied hint for how long to back off.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Classify for RequestError {
    fn kind(&self) -> ErrorKind {
        match self {
            RequestError::RateLimited { .. } => ErrorKind::RateLimit,
            RequestError::Authentication { .. } => ErrorKind::Authentication,
            RequestError::Configuration(_) => ErrorKind::Configuration,
            RequestError::Http { .. }
            | RequestError::Timeout
            | RequestError::Connection(_)
            | RequestError::Decode(_)
            | RequestError::Closed => ErrorKind::Integration,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            RequestError::RateLimited { .. } => Some(429),
            RequestError::Authentication { status } | RequestError::Http { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            RequestError::RateLimited { .. }
            | RequestError::Timeout
            | RequestError::Connection(_) => true,
            RequestError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RequestError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        // The URL may carry an API key in its query string.
        let err = err.without_url();
        if err.is_timeout() {
            RequestError::Timeout
        } else if err.is_connect() || err.is_request() {
            RequestError::Connection(err.to_string())
        } else if err.is_decode() || err.is_body() {
            RequestError::Decode(err.to_string())
        } else if err.is_builder() {
            RequestError::Configuration(err.to_string())
        } else if let Some(status) = err.status() {
            RequestError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            RequestError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        RequestError::Decode(err.to_string())
    }
}

/// Map a response status to the failure it represents, if any.
///
/// `retry_after` is the raw `Retry-After` header value; only the delta-seconds
/// form is understood.
pub fn classify_status(status: u16, body: &str, retry_after: Option<&str>) -> Option<RequestError> {
    match status {
        429 => Some(RequestError::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        }),
        401 | 403 => Some(RequestError::Authentication { status }),
        s if s >= 400 => Some(RequestError::Http {
            status: s,
            body: body.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_mapping() {
        assert!(classify_status(200, "", None).is_none());
        assert!(classify_status(302, "", None).is_none());

        let err = classify_status(429, "", Some("30")).unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));

        assert_eq!(classify_status(401, "", None).unwrap().kind(), ErrorKind::Authentication);
        assert_eq!(classify_status(403, "", None).unwrap().kind(), ErrorKind::Authentication);

        let not_found = classify_status(404, "missing", None).unwrap();
        assert_eq!(not_found.kind(), ErrorKind::Integration);
        assert!(!not_found.is_transient());

        let unavailable = classify_status(503, "down", None).unwrap();
        assert_eq!(unavailable.kind(), ErrorKind::Integration);
        assert!(unavailable.is_transient());
    }

    #[test]
    fn test_unparseable_retry_after_is_ignored() {
        let err = classify_status(429, "", Some("Wed, 21 Oct 2015 07:28:00 GMT")).unwrap();
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_transient_errors() {
        assert!(RequestError::Timeout.is_transient());
        assert!(RequestError::Connection("reset".into()).is_transient());
        assert!(!RequestError::Decode("bad json".into()).is_transient());
        assert!(!RequestError::Closed.is_transient());
        assert!(!RequestError::Authentication { status: 401 }.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = RequestError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(err.to_string(), "rate limit exceeded, retry after 60s");

        let err = RequestError::Http {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "request failed with status 500: boom");
    }
}
