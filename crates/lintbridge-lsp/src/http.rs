//! HTTP client descriptors handed to the backend.
//!
//! The backend performs the requests itself; the server only decides which
//! base URL and credentials a connection uses.

use std::fmt;

use serde_json::{json, Value};

const USER_AGENT: &str = concat!("lintbridge-lsp/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, PartialEq, Eq)]
pub struct HttpClient {
    base_url: String,
    token: Option<String>,
}

impl HttpClient {
    /// Value of the `Authorization` header, if the client authenticates.
    pub fn authorization_header(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }

    /// Shape handed back to the backend, which performs the requests.
    pub fn to_json(&self) -> Value {
        json!({
            "baseUrl": self.base_url.trim_end_matches('/'),
            "userAgent": USER_AGENT,
            "authorization": self.authorization_header(),
        })
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientProvider;

impl HttpClientProvider {
    pub fn with_token(self, base_url: impl Into<String>, token: impl Into<String>) -> HttpClient {
        HttpClient {
            base_url: base_url.into(),
            token: Some(token.into()),
        }
    }
}
