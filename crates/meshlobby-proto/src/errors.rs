//! Protocol error types.

use thiserror::Error;

/// Result alias for wire operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload exceeds [`crate::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual size in bytes
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// Payload was empty.
    #[error("empty payload")]
    Empty,

    /// Bytes were left over after a complete item was decoded.
    #[error("{count} trailing bytes after payload")]
    TrailingBytes {
        /// Number of unread bytes
        count: usize,
    },

    /// CBOR decoding failed or the value is not a known variant.
    #[error("CBOR decode failed: {0}")]
    Decode(String),

    /// CBOR encoding failed.
    #[error("CBOR encode failed: {0}")]
    Encode(String),
}
