//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the capture
//! proxy. All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};

/// Root configuration for the capture proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CaptureProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The service traffic is forwarded to.
    pub upstream: UpstreamConfig,

    /// What gets captured and who it is reported as.
    pub capture: CaptureConfig,

    /// Export queue and worker pool settings.
    pub exporter: ExporterConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream the proxy forwards every request to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, plain HTTP (e.g., "http://127.0.0.1:3000").
    pub url: String,

    /// Total time allowed for one proxied request, in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Capture policy and collector identity.
///
/// The camelCase aliases accept configuration written for other hosts of
/// the same collector.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Bodies are recorded only if `content-type` contains one of these.
    #[serde(alias = "allowedContentTypes")]
    pub allowed_content_types: Vec<String>,

    /// Maximum bytes retained per captured body.
    #[serde(alias = "bodyCaptureSize")]
    pub body_capture_size: usize,

    /// Service identity reported to the collector.
    #[serde(alias = "serviceName")]
    pub service_name: String,

    /// Base URL of the collector.
    #[serde(alias = "tpaEndpoint")]
    pub tpa_endpoint: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            allowed_content_types: vec![
                "json".to_string(),
                "grpc".to_string(),
                "x-www-form-urlencoded".to_string(),
                "xml".to_string(),
            ],
            body_capture_size: 128 * 1024,
            service_name: "traffic-capture".to_string(),
            tpa_endpoint: "http://localhost:5442".to_string(),
        }
    }
}

/// Export pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Pending exports held before new ones are dropped.
    pub queue_capacity: usize,

    /// Concurrent delivery workers (also the idle connection pool size).
    pub workers: usize,

    /// Collector connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Collector request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Module identity sent with every export.
    pub module_name: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            workers: 20,
            connect_timeout_secs: 2,
            request_timeout_secs: 10,
            module_name: "traffic-capture".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
