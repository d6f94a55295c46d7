//! Shared error type across mimic crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, MimicError>;

/// Unified error type used by core and engine.
///
/// Parse and reload failures are contained at the reload boundary (logged,
/// prior state retained); these variants exist for the loading entry points
/// and the seams where the host injects its own implementations.
#[derive(Debug, Error)]
pub enum MimicError {
    #[error("config: {0}")]
    Config(String),
    #[error("io: {0}")]
    Io(String),
    #[error("feed: {0}")]
    Feed(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<std::io::Error> for MimicError {
    fn from(e: std::io::Error) -> Self {
        MimicError::Io(e.to_string())
    }
}
