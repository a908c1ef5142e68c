//! Error types for the jitter RPC endpoint

use hasher_jitter::JitterError;
use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised by the RPC server and client.
///
/// A connection-level error ends that connection only.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request started with an unknown protocol version byte
    #[error("Unsupported protocol version: 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// Request body had the wrong size
    #[error("Malformed request: expected {expected} bytes, got {actual}")]
    Malformed {
        /// Expected body length
        expected: usize,
        /// Received body length
        actual: usize,
    },

    /// Engine or loader failure
    #[error(transparent)]
    Jitter(#[from] JitterError),
}
