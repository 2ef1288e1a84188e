//! Traffic capture subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → interceptor.rs (orchestrates one exchange)
//!     → snapshot.rs (request half: headers, scheme, source, body)
//!     → downstream handler
//!     → tap.rs (response body streams to client, copy kept)
//!     → snapshot.rs (response half: headers, trailers, status)
//!     → record.rs (CaptureRecord, serialized for export)
//!     → export subsystem (non-blocking enqueue)
//! ```
//!
//! # Design Decisions
//! - Bodies are opaque bytes, captured only for allow-listed content types
//! - Captured bodies are capped; the client always receives the full body
//! - Capture errors never reach the client

pub mod interceptor;
pub mod record;
pub mod snapshot;
pub mod tap;

pub use interceptor::{capture_middleware, Interceptor};
pub use record::{CaptureRecord, HeaderSnapshot, RequestSnapshot, ResponseSnapshot};
pub use snapshot::CapturePolicy;
pub use tap::{tap_request, tap_response, BodyCopy, TapOutcome};

use std::num::ParseIntError;

/// Errors raised while deriving capture fields. Always recovered locally.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("missing port in address '{0}'")]
    MissingPort(String),

    #[error("too many colons in address '{0}'")]
    TooManyColons(String),

    #[error("missing ']' in address '{0}'")]
    UnclosedBracket(String),

    #[error("invalid port in address '{addr}': {source}")]
    InvalidPort {
        addr: String,
        #[source]
        source: ParseIntError,
    },
}
