//! spectra-types - Data model and wire protocol
//!
//! This crate defines the `Envelope`/`Metric` sum type that crosses the
//! collector -> sender boundary, the raw counter records platform probes
//! produce, and the collector traits platform-specific code implements.
//! No I/O and no delta/rate logic live here.

mod envelope;
mod metrics;
mod raw;
mod traits;

pub use envelope::Envelope;
pub use metrics::*;
pub use raw::*;
pub use traits::*;

use thiserror::Error;

/// Error types for metrics collection.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation not supported on this platform.
    #[error("operation not supported on this platform")]
    NotSupported,

    /// Permission denied.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Resource not found.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Platform-specific error.
    #[error("platform error: {0}")]
    Platform(String),
}

/// Result type alias for metrics operations.
pub type Result<T> = std::result::Result<T, Error>;
