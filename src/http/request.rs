//! Request correlation.
//!
//! The inbound `x-request-id` is reused when present so a capture can be
//! matched with the host's own logs; otherwise a UUID v4 is generated.
//! The inbound request itself is never modified.

use axum::http::HeaderMap;
use std::fmt;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation identifier attached to each export.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The inbound id, if the client or an upstream proxy sent a usable one.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
    }

    pub fn from_headers_or_new(headers: &HeaderMap) -> Self {
        Self::from_headers(headers).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn reuses_inbound_id() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        assert_eq!(RequestId::from_headers_or_new(&headers).as_str(), "abc-123");
    }

    #[test]
    fn blank_inbound_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("   "));
        assert!(RequestId::from_headers(&headers).is_none());
        let id = RequestId::from_headers_or_new(&headers);
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }
}
