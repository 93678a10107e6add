//! Incremental frame reassembly
//!
//! Non-blocking readers receive whatever the socket has, which may be half a
//! header or several frames at once. [`FrameDecoder`] buffers bytes until a
//! complete frame is present and only then yields a [`Message`]; a handler
//! never sees a partial payload.
//!
//! Payload memory grows with bytes actually received rather than with the
//! declared length, so a peer cannot make the server reserve a huge buffer
//! by sending a header alone.

use crate::error::Result;
use crate::header::{MessageHeader, HEADER_SIZE};
use crate::message::Message;
use bytes::{Buf, BytesMut};

/// Buffers stream bytes and extracts complete frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Header of the frame currently being assembled
    pending: Option<(MessageHeader, usize)>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and extract every frame they complete
    ///
    /// Incomplete data stays buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Message>> {
        self.buf.extend_from_slice(bytes);
        let mut messages = Vec::new();

        loop {
            let (header, len) = match self.pending {
                Some(pending) => pending,
                None => {
                    if self.buf.len() < HEADER_SIZE {
                        break;
                    }
                    let header = MessageHeader::from_bytes(&self.buf)?;
                    let len = header.payload_len()?;
                    self.buf.advance(HEADER_SIZE);
                    self.pending = Some((header, len));
                    (header, len)
                }
            };

            if self.buf.len() < len {
                break;
            }

            let payload = self.buf.split_to(len).freeze();
            self.pending = None;
            messages.push(Message::from_parts(header, payload)?);
        }

        Ok(messages)
    }

    /// True when a frame has been started but not finished
    pub fn has_partial(&self) -> bool {
        self.pending.is_some() || !self.buf.is_empty()
    }

    /// Bytes buffered toward the current frame
    pub fn buffered(&self) -> usize {
        self.buf.len() + self.pending.map_or(0, |_| HEADER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn encode(msg: &Message) -> Vec<u8> {
        let mut out = msg.header().to_bytes().to_vec();
        out.extend_from_slice(msg.payload());
        out
    }

    #[test]
    fn test_single_frame() {
        let msg = Message::text("ping");
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&encode(&msg)).unwrap();
        assert_eq!(frames, vec![msg]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_byte_at_a_time_yields_only_complete_frames() {
        let msg = Message::text("fragmented payload");
        let wire = encode(&msg);
        let mut decoder = FrameDecoder::new();

        for (i, byte) in wire.iter().enumerate() {
            let frames = decoder.feed(std::slice::from_ref(byte)).unwrap();
            if i + 1 < wire.len() {
                assert!(frames.is_empty(), "frame delivered early at byte {i}");
                assert!(decoder.has_partial());
            } else {
                assert_eq!(frames, vec![msg.clone()]);
            }
        }
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let a = Message::text("a");
        let b = Message::ack();
        let c = Message::error("c");
        let mut wire = encode(&a);
        wire.extend(encode(&b));
        wire.extend(encode(&c));

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&wire).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].message_type().unwrap(), MessageType::Ack);
        assert_eq!(frames[2].payload(), b"c");
    }

    #[test]
    fn test_header_only_does_not_reserve_declared_length() {
        let header = MessageHeader::new(1, 1 << 40, 0);
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&header.to_bytes()).unwrap();
        assert!(frames.is_empty());
        assert_eq!(decoder.buffered(), HEADER_SIZE);
    }
}
