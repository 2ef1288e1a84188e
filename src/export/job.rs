//! Export jobs and the collector target they are addressed to.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use bytes::Bytes;
use std::time::Duration;
use url::Url;

use crate::export::ExportError;
use crate::http::{RequestId, X_REQUEST_ID};

/// Collector route receiving capture records.
pub const CAPTURE_PATH: &str = "/ext_cap/v1/req_res_cap";

// Every identity header is sent in dotted and hyphenated form; header
// handling layers in front of the collector differ in which they keep.
pub const MODULE_NAME_HEADERS: [&str; 2] = ["traceableai.module.name", "traceableai-module-name"];
pub const MODULE_VERSION_HEADERS: [&str; 2] =
    ["traceableai.module.version", "traceableai-module-version"];
pub const SERVICE_NAME_HEADERS: [&str; 2] = ["traceableai.service.name", "traceableai-service-name"];
pub const DURATION_HEADERS: [&str; 2] = [
    "traceableai.total_duration_nanos",
    "traceableai-total-duration-nanos",
];

/// Where and as whom captures are delivered.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    url: Url,
    service_name: HeaderValue,
}

impl ExportTarget {
    pub fn new(tpa_endpoint: &str, service_name: &str) -> Result<Self, ExportError> {
        let endpoint = tpa_endpoint.trim_end_matches('/');
        let url = Url::parse(&format!("{endpoint}{CAPTURE_PATH}")).map_err(|source| {
            ExportError::InvalidEndpoint {
                endpoint: tpa_endpoint.to_string(),
                source,
            }
        })?;
        let service_name = HeaderValue::from_str(service_name).map_err(|source| {
            ExportError::InvalidHeader {
                name: "service_name",
                source,
            }
        })?;
        Ok(Self { url, service_name })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Build the job for one serialized record.
    pub fn job(&self, payload: Bytes, elapsed: Duration, request_id: &RequestId) -> ExportJob {
        let mut headers = HeaderMap::new();
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let duration = HeaderValue::from(nanos);

        for name in SERVICE_NAME_HEADERS {
            headers.insert(HeaderName::from_static(name), self.service_name.clone());
        }
        for name in DURATION_HEADERS {
            headers.insert(HeaderName::from_static(name), duration.clone());
        }
        if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
            headers.insert(HeaderName::from_static(X_REQUEST_ID), value);
        }

        ExportJob {
            url: self.url.clone(),
            headers,
            payload,
            requeued: false,
        }
    }
}

/// One outbound delivery. The payload is immutable and can be re-sent as is.
#[derive(Debug, Clone)]
pub struct ExportJob {
    url: Url,
    headers: HeaderMap,
    payload: Bytes,
    requeued: bool,
}

impl ExportJob {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn is_requeued(&self) -> bool {
        self.requeued
    }

    /// The same job marked for its single retry, or `None` if it already had one.
    pub fn into_requeued(self) -> Option<Self> {
        if self.requeued {
            return None;
        }
        Some(Self {
            requeued: true,
            ..self
        })
    }
}
