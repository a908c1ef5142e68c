//! Error types for the jitter engine

use thiserror::Error;

/// Result type alias for jitter operations
pub type Result<T> = std::result::Result<T, JitterError>;

/// Errors surfaced to callers of the jitter engine.
///
/// Lookup misses are never errors: a miss resolves to a deterministic
/// default jitter and the loop keeps going. Only malformed inputs and
/// I/O failures end up here.
#[derive(Error, Debug)]
pub enum JitterError {
    /// Buffer had the wrong size (headers, RPC frames)
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// Golden nonce hunt produced no candidate result
    #[error("No valid result: candidate list produced no result")]
    NoValidResult,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Training-frame data could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Frame index outside the knowledge base
    #[error("Frame not found: {0}")]
    FrameNotFound(usize),
}

impl From<serde_json::Error> for JitterError {
    fn from(err: serde_json::Error) -> Self {
        JitterError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for JitterError {
    fn from(err: toml::de::Error) -> Self {
        JitterError::Config(err.to_string())
    }
}
