//! Configuration validation.
//!
//! Serde handles syntax; this checks values. Every problem is reported, not
//! just the first one found.

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::CaptureProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: '{value}' is not a valid URL")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field}: scheme '{scheme}' is not supported")]
    UnsupportedScheme { field: &'static str, scheme: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &CaptureProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_url(&mut errors, "upstream.url", &config.upstream.url, &["http"]);
    check_url(
        &mut errors,
        "capture.tpa_endpoint",
        &config.capture.tpa_endpoint,
        &["http", "https"],
    );

    if config.capture.service_name.trim().is_empty() {
        errors.push(ValidationError::Empty {
            field: "capture.service_name",
        });
    }
    if config.exporter.module_name.trim().is_empty() {
        errors.push(ValidationError::Empty {
            field: "exporter.module_name",
        });
    }

    let positive = [
        ("upstream.timeout_secs", config.upstream.timeout_secs as usize),
        ("exporter.queue_capacity", config.exporter.queue_capacity),
        ("exporter.workers", config.exporter.workers),
        ("exporter.request_timeout_secs", config.exporter.request_timeout_secs as usize),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str, schemes: &[&str]) {
    match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::UnsupportedScheme {
            field,
            scheme: url.scheme().to_string(),
        }),
        Err(_) => errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}
