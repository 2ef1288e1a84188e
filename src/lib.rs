//! HTTP traffic capture library

pub mod capture;
pub mod config;
pub mod export;
pub mod http;
pub mod observability;

pub use capture::{CapturePolicy, CaptureRecord, Interceptor};
pub use config::schema::CaptureProxyConfig;
pub use export::Exporter;
pub use http::HttpServer;
