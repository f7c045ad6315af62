//! Crate-wide error types.
//!
//! Each subsystem gets its own variant set rather than a single flat enum.
//! `BridgeError` is the umbrella type returned across module boundaries
//! inside the library;
//! `main()` in each binary still collapses to `Box<dyn std::error::Error>`
//! at the outermost layer.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("injector error: {0}")]
    Injector(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("session already active")]
    SessionActive,

    #[error("envelope exceeds maximum size of {max} bytes")]
    EnvelopeTooLarge { max: usize },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file integrity mismatch: declared {declared}, computed {computed}")]
    IntegrityMismatch { declared: String, computed: String },

    #[error("negotiation timed out")]
    NegotiationTimeout,
}

impl BridgeError {
    pub fn operation(msg: impl Into<String>) -> Self {
        BridgeError::Operation(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        BridgeError::Protocol(msg.into())
    }
}
