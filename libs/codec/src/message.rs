//! Message construction
//!
//! A [`Message`] is one header plus its payload. Constructors copy the
//! payload into a shared [`Bytes`] buffer; an empty payload never allocates.
//! Dropping the message releases the payload.

use crate::error::{CodecError, Result};
use crate::header::{MessageHeader, HEADER_SIZE};
use bitflags::bitflags;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Known message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum MessageType {
    /// Text message
    Text = 0x01,
    /// Acknowledgment
    Ack = 0x03,
    /// Error message
    Error = 0x04,
}

bitflags! {
    /// Message flags
    ///
    /// Advisory only: no code path changes behavior based on these bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageFlags: u32 {
        /// Payload is compressed
        const COMPRESSED = 0x01;
        /// Payload is encrypted
        const ENCRYPTED = 0x02;
        /// Final message in sequence
        const FINAL = 0x04;
    }
}

/// Complete framed message
///
/// Invariant: `header().length == payload().len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: MessageHeader,
    payload: Bytes,
}

impl Message {
    /// Build a message of the given type, copying `payload`
    pub fn new(message_type: MessageType, payload: &[u8]) -> Self {
        let payload = if payload.is_empty() {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(payload)
        };
        Self {
            header: MessageHeader::new(message_type.into(), payload.len() as u64, 0),
            payload,
        }
    }

    /// Create a text message
    pub fn text(text: impl AsRef<[u8]>) -> Self {
        Self::new(MessageType::Text, text.as_ref())
    }

    /// Create an ACK message (always empty)
    pub fn ack() -> Self {
        Self::new(MessageType::Ack, &[])
    }

    /// Create an error message
    pub fn error(description: impl AsRef<[u8]>) -> Self {
        Self::new(MessageType::Error, description.as_ref())
    }

    /// Reassemble a message from a decoded header and the payload read after it
    pub fn from_parts(header: MessageHeader, payload: Bytes) -> Result<Self> {
        if header.length != payload.len() as u64 {
            return Err(CodecError::LengthMismatch {
                declared: header.length,
                actual: payload.len(),
            });
        }
        Ok(Self { header, payload })
    }

    /// Replace the advisory flag bits
    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.header.flags = flags.bits();
        self
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// Typed view of the header's `type` field
    pub fn message_type(&self) -> Result<MessageType> {
        MessageType::try_from(self.header.message_type).map_err(|_| {
            CodecError::UnknownMessageType {
                value: self.header.message_type,
            }
        })
    }

    /// True when the `type` field is ACK
    pub fn is_ack(&self) -> bool {
        self.header.message_type == u32::from(MessageType::Ack)
    }

    /// Flag bits, unknown bits retained
    pub fn flags(&self) -> MessageFlags {
        MessageFlags::from_bits_retain(self.header.flags)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Header plus payload size in bytes
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_copies_payload() {
        let source = String::from("hello");
        let msg = Message::text(&source);
        drop(source);

        assert_eq!(msg.message_type().unwrap(), MessageType::Text);
        assert_eq!(msg.header().length, 5);
        assert_eq!(msg.payload(), b"hello");
        assert_eq!(msg.total_size(), 21);
    }

    #[test]
    fn test_ack_is_empty() {
        let ack = Message::ack();
        assert!(ack.is_ack());
        assert_eq!(ack.header().length, 0);
        assert_eq!(ack.payload_len(), 0);
        assert_eq!(ack.total_size(), HEADER_SIZE);
    }

    #[test]
    fn test_empty_text_is_permitted() {
        let msg = Message::text("");
        assert_eq!(msg.header().message_type, 0x01);
        assert_eq!(msg.payload_len(), 0);
    }

    #[test]
    fn test_error_message_type() {
        let msg = Message::error("boom");
        assert_eq!(msg.header().message_type, 0x04);
        assert_eq!(msg.payload(), b"boom");
    }

    #[test]
    fn test_unknown_type_is_reported_not_rejected() {
        let header = MessageHeader::new(0x02, 0, 0);
        let msg = Message::from_parts(header, Bytes::new()).unwrap();
        assert_eq!(
            msg.message_type().unwrap_err(),
            CodecError::UnknownMessageType { value: 0x02 }
        );
        assert!(!msg.is_ack());
    }

    #[test]
    fn test_from_parts_enforces_length_invariant() {
        let header = MessageHeader::new(0x01, 4, 0);
        let err = Message::from_parts(header, Bytes::from_static(b"abc")).unwrap_err();
        assert_eq!(
            err,
            CodecError::LengthMismatch {
                declared: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_flags_are_advisory_and_preserved() {
        let msg = Message::text("x").with_flags(MessageFlags::FINAL | MessageFlags::COMPRESSED);
        assert_eq!(msg.header().flags, 0x05);
        assert!(msg.flags().contains(MessageFlags::FINAL));

        let odd = Message::from_parts(MessageHeader::new(1, 0, 0x80), Bytes::new()).unwrap();
        assert_eq!(odd.flags().bits(), 0x80);
    }
}
