//! Message Header Implementation
//!
//! Fixed 16-byte header preceding every payload.
//!
//! ```text
//! ┌──────────┬──────────────────┬──────────┬─────────────────────┐
//! │ type u32 │ length u64       │ flags u32│ payload (length B)  │
//! │ bytes 0-3│ bytes 4-11       │ 12-15    │                     │
//! └──────────┴──────────────────┴──────────┴─────────────────────┘
//! ```
//!
//! The in-memory [`MessageHeader`] holds host-order integers. The wire image
//! is a separate packed struct of big-endian fields, so byte order is fixed by
//! the type system rather than by remembering to swap.

use crate::error::{CodecError, Result};
use bytes::BufMut;
use zerocopy::byteorder::{NetworkEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Exact number of bytes that precede every payload on the wire
pub const HEADER_SIZE: usize = 16;

/// Wire image of the header: every field big-endian, alignment 1, no padding
#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
struct WireHeader {
    message_type: U32<NetworkEndian>,
    length: U64<NetworkEndian>,
    flags: U32<NetworkEndian>,
}

/// Decoded message header in host byte order
///
/// `message_type` and `flags` are raw values: anything representable in 32
/// bits survives a round trip, known or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageHeader {
    /// Message type discriminant (see [`crate::MessageType`])
    pub message_type: u32,
    /// Payload size in bytes
    pub length: u64,
    /// Advisory flag bits (see [`crate::MessageFlags`])
    pub flags: u32,
}

impl MessageHeader {
    /// Header size in bytes
    pub const SIZE: usize = HEADER_SIZE;

    pub fn new(message_type: u32, length: u64, flags: u32) -> Self {
        Self {
            message_type,
            length,
            flags,
        }
    }

    /// Serialize to wire byte order
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let wire = WireHeader {
            message_type: U32::new(self.message_type),
            length: U64::new(self.length),
            flags: U32::new(self.flags),
        };
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(wire.as_bytes());
        out
    }

    /// Append the wire image to a buffer
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.to_bytes());
    }

    /// Deserialize from wire byte order
    ///
    /// Reads the first [`HEADER_SIZE`] bytes of `bytes`; anything after is
    /// ignored. Fewer than 16 bytes means the header is corrupt.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::TruncatedHeader {
                need: HEADER_SIZE,
                got: bytes.len(),
            });
        }

        let wire = WireHeader::read_from(&bytes[..HEADER_SIZE]).ok_or(
            CodecError::TruncatedHeader {
                need: HEADER_SIZE,
                got: bytes.len(),
            },
        )?;

        Ok(Self {
            message_type: wire.message_type.get(),
            length: wire.length.get(),
            flags: wire.flags.get(),
        })
    }

    /// Payload length as a platform size
    pub fn payload_len(&self) -> Result<usize> {
        usize::try_from(self.length).map_err(|_| CodecError::LengthOverflow {
            length: self.length,
        })
    }
}
