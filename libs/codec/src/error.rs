//! Codec-level errors
//!
//! Framing errors carry enough context to explain what arrived. They never
//! describe socket failures; those belong to the transport error type.

use thiserror::Error;

/// Errors produced while encoding or decoding frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes than a full header were supplied
    #[error("Truncated header: need {need} bytes, got {got}")]
    TruncatedHeader { need: usize, got: usize },

    /// The `type` field holds a value outside the known message types
    #[error("Unknown message type {value:#010x}")]
    UnknownMessageType { value: u32 },

    /// Declared payload length does not fit in this platform's address space
    #[error("Payload length {length} cannot be addressed on this platform")]
    LengthOverflow { length: u64 },

    /// Header length and supplied payload disagree
    #[error("Length mismatch: header declares {declared} bytes, payload has {actual}")]
    LengthMismatch { declared: u64, actual: usize },

    /// Buffer for the payload could not be reserved
    #[error("Cannot allocate {length} bytes for payload")]
    AllocationFailed { length: usize },
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
