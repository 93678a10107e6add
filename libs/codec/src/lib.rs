//! # Framelink Protocol Codec
//!
//! ## Purpose
//!
//! The "rules" layer of the framelink transport: how a message looks on the
//! wire, independent of whatever socket or TLS session carries it.
//!
//! ```text
//! offset 0  : uint32 type     (1=TEXT, 3=ACK, 4=ERROR)
//! offset 4  : uint64 length   (payload byte count)
//! offset 12 : uint32 flags    (bit0=COMPRESSED, bit1=ENCRYPTED, bit2=FINAL)
//! offset 16 : payload[length]
//! ```
//!
//! All multi-byte integers are big-endian. Exactly [`HEADER_SIZE`] bytes
//! precede every payload.
//!
//! ## What This Crate Contains
//! - [`MessageHeader`] with exact serialize/deserialize inverses
//! - [`Message`] construction for TEXT, ACK and ERROR frames
//! - [`FrameDecoder`] for reassembling frames from a non-blocking byte stream
//!
//! ## What This Crate Does NOT Contain
//! - Socket management or TLS (belongs in `framelink-network`)
//! - Validation of `type`/`flags` membership: unknown values pass through
//!   and higher layers decide how to react

pub mod decoder;
pub mod error;
pub mod header;
pub mod message;

pub use decoder::FrameDecoder;
pub use error::{CodecError, Result};
pub use header::{MessageHeader, HEADER_SIZE};
pub use message::{Message, MessageFlags, MessageType};
