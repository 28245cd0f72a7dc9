//! Error types for pmp-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for pmp-ap module
#[derive(Error, Debug)]
pub enum Error {
    /// Playback engine transport command failed
    #[error("Engine error: {0}")]
    Engine(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation was cancelled before it finished
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Convenience Result type using pmp-ap Error
pub type Result<T> = std::result::Result<T, Error>;
