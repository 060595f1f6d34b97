//! Stream error types

use thiserror::Error;

/// Errors produced by [`crate::Reader`] and [`crate::Writer`] operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A read ran past the end of the underlying buffer.
    #[error("read past end of stream: wanted {wanted} bytes at offset {offset}, buffer is {len} bytes")]
    Eof {
        /// Offset the read was attempted at.
        offset: usize,
        /// Number of bytes the read wanted.
        wanted: usize,
        /// Total length of the underlying buffer.
        len: usize,
    },

    /// A 4CC magic did not match what the caller expected.
    #[error("magic mismatch at offset {offset}: expected {expected:?}, got {got:?}")]
    MagicMismatch {
        /// Offset the magic was read from.
        offset: usize,
        /// The magic the caller required.
        expected: [u8; 4],
        /// The magic actually present.
        got: [u8; 4],
    },

    /// A `seek_to`/`pop_pos` target fell outside the buffer.
    #[error("invalid seek to offset {offset}, buffer is {len} bytes")]
    InvalidSeek {
        /// The requested offset.
        offset: usize,
        /// Total length of the underlying buffer.
        len: usize,
    },

    /// `pop_pos` was called with no matching `push_pos`.
    #[error("position stack underflow")]
    PositionStackUnderflow,

    /// Data was structurally present but violated a format invariant.
    #[error("malformed data at {site}: {why}")]
    Malformed {
        /// Where in the format (section/field) the violation was found.
        site: String,
        /// Human-readable explanation.
        why: String,
    },

    /// An enum-like byte field held a value with no known meaning.
    #[error("invalid enum value {value} for {name} at offset {offset}")]
    InvalidEnumValue {
        /// Name of the field/enum being decoded.
        name: String,
        /// The raw value encountered.
        value: u32,
        /// Offset the value was read from.
        offset: usize,
    },
}

/// Result type used throughout the stream primitives.
pub type StreamResult<T> = Result<T, StreamError>;
