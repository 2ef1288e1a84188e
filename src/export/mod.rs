//! Capture export subsystem.
//!
//! # Data Flow
//! ```text
//! capture record (from the interceptor)
//!     → job.rs (serialize, attach identity and timing headers)
//!     → queue.rs (bounded, non-blocking enqueue; dropped when full)
//!     → worker.rs (N workers, POST to the collector)
//!         → on transport error: one re-queue, then drop
//! ```
//!
//! # Design Decisions
//! - Request latency never depends on collector availability
//! - Delivery is best-effort: records may be dropped, reordered or duplicated
//! - Payloads are immutable `Bytes`, so a retry re-sends exactly the same body
//! - One shared HTTP client; idle pool sized to the worker count

pub mod exporter;
pub mod job;
pub mod queue;
pub mod stats;
mod worker;

pub use exporter::Exporter;
pub use job::{ExportJob, ExportTarget, CAPTURE_PATH};
pub use queue::{EnqueueOutcome, ExportQueue};
pub use stats::ExportStatsSnapshot;

use axum::http::header::InvalidHeaderValue;

/// Errors from building or feeding the export pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to serialize capture record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid collector endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid value for {name} header: {source}")]
    InvalidHeader {
        name: &'static str,
        #[source]
        source: InvalidHeaderValue,
    },

    #[error("failed to build collector client: {0}")]
    Client(#[from] reqwest::Error),
}
