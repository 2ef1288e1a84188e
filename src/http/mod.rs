//! HTTP hosting subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace layer)
//!     → capture middleware (see `capture`)
//!     → timeout layer
//!     → server.rs forward handler → upstream
//!     → response streams back through the capture tap
//! ```

pub mod request;
pub mod server;

pub use request::{RequestId, X_REQUEST_ID};
pub use server::{shutdown_signal, HttpServer, ServerError};
