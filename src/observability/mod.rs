//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! capture and export paths produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Per-export failures log at debug; a dead collector must not flood logs
//! - Metrics are cheap and always recorded

pub mod logging;
pub mod metrics;
