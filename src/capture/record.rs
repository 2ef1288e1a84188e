//! Capture record wire model.
//!
//! These types are serialized as the JSON body of every export call, so the
//! field names follow the collector's schema rather than Rust conventions.
//! Byte fields travel as base64 strings, `null` when no body was captured.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Normalized header mapping: lower-cased names, multi-values joined with `;`.
pub type HeaderSnapshot = BTreeMap<String, String>;

/// Snapshot of one request/response exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Wall-clock time the inbound request began processing.
    #[serde(rename = "request_timestamp_in_ms")]
    pub captured_at_millis: u64,

    pub request: RequestSnapshot,

    pub response: ResponseSnapshot,
}

impl CaptureRecord {
    /// Start a record stamped with the current wall-clock time.
    pub fn started_now() -> Self {
        Self {
            captured_at_millis: epoch_millis(),
            ..Self::default()
        }
    }

    /// Encode the record into the payload shipped to the collector.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Request half of a [`CaptureRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub headers: HeaderSnapshot,
    /// Taken from `x-forwarded-proto`; empty when the header is absent.
    pub scheme: String,
    pub path: String,
    pub host: String,
    #[serde(with = "base64_body", default)]
    pub body: Option<Bytes>,
    pub source_address: String,
    pub source_port: i32,
}

/// Response half of a [`CaptureRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub headers: HeaderSnapshot,
    #[serde(with = "base64_body", default)]
    pub body: Option<Bytes>,
    /// `scheme://host/path?query` of the original request, empty if any part is missing.
    pub request_url: String,
    /// Transport status, left at 0 for gRPC responses.
    pub status_code: i32,
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

mod base64_body {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Bytes>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| {
                STANDARD
                    .decode(text)
                    .map(Bytes::from)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
