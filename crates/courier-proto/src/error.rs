//! Wire errors.

use thiserror::Error;

/// Errors from envelope framing and decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared frame length exceeds [`crate::MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Declared body size.
        size: usize,
        /// Maximum accepted body size.
        max: usize,
    },

    /// Buffer ended before the declared frame length.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// CBOR encoding failed.
    #[error("CBOR encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("CBOR decode error: {0}")]
    Decode(String),

    /// Peer speaks a different envelope version.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
}
