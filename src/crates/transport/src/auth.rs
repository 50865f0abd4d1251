//! Authentication schemes applied to outgoing requests.

use base64::Engine;
use reqwest::RequestBuilder;
use std::fmt;

/// How a client authenticates every request it sends.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum AuthScheme {
    #[default]
    None,
    /// `Authorization: Basic base64(username:secret)`
    Basic { username: String, secret: String },
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// Key sent in a custom header.
    ApiKeyHeader { header: String, key: String },
    /// Key sent as a query parameter.
    ApiKeyQuery { param: String, key: String },
}

impl AuthScheme {
    pub fn basic(username: impl Into<String>, secret: impl Into<String>) -> Self {
        AuthScheme::Basic {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        AuthScheme::Bearer(token.into())
    }

    pub fn api_key_query(param: impl Into<String>, key: impl Into<String>) -> Self {
        AuthScheme::ApiKeyQuery {
            param: param.into(),
            key: key.into(),
        }
    }

    /// `Authorization`-style header this scheme produces, if any.
    pub fn header(&self) -> Option<(String, String)> {
        match self {
            AuthScheme::Basic { username, secret } => {
                let credentials = format!("{}:{}", username, secret);
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
                Some(("Authorization".to_string(), format!("Basic {}", encoded)))
            }
            AuthScheme::Bearer(token) => {
                Some(("Authorization".to_string(), format!("Bearer {}", token)))
            }
            AuthScheme::ApiKeyHeader { header, key } => Some((header.clone(), key.clone())),
            AuthScheme::None | AuthScheme::ApiKeyQuery { .. } => None,
        }
    }

    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match self.header() {
            Some((name, value)) => request.header(name, value),
            None => request,
        };
        match self {
            AuthScheme::ApiKeyQuery { param, key } => request.query(&[(param, key)]),
            _ => request,
        }
    }

    pub fn scheme_name(&self) -> &'static str {
        match self {
            AuthScheme::None => "none",
            AuthScheme::Basic { .. } => "basic",
            AuthScheme::Bearer(_) => "bearer",
            AuthScheme::ApiKeyHeader { .. } => "api_key_header",
            AuthScheme::ApiKeyQuery { .. } => "api_key_query",
        }
    }
}

// Secrets never reach logs.
impl fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("secret", &"***")
                .finish(),
            AuthScheme::ApiKeyHeader { header, .. } => f
                .debug_struct("ApiKeyHeader")
                .field("header", header)
                .field("key", &"***")
                .finish(),
            AuthScheme::ApiKeyQuery { param, .. } => f
                .debug_struct("ApiKeyQuery")
                .field("param", param)
                .field("key", &"***")
                .finish(),
            other => f.write_str(other.scheme_name()),
        }
    }
}
