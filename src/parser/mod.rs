//! Resumable RFC 6455 frame parser.
//!
//! [`FrameParser`] turns a byte stream into complete messages. It keeps its
//! position inside the current frame between calls, so a message spread over
//! any number of reads is reassembled without re-reading consumed bytes.
//!
//! At most one data message (text or binary, possibly fragmented) and one
//! control message may be open at a time. Control frames may arrive between
//! the fragments of a data message and are returned as soon as they are
//! complete.

pub mod error;
pub mod stage;

use bytes::{Buf, BytesMut};
pub use error::{ProtocolError, ReadError};
pub use stage::Stage;
use tokio_util::codec::Decoder;

use crate::{
    frame::{FrameHeader, MAX_CONTROL_PAYLOAD, MAX_MESSAGE_SIZE, Opcode},
    message::{Message, MessageBuffer},
};

/// Incremental frame parser for one connection.
///
/// # Examples
///
/// ```
/// use wiresocket::parser::FrameParser;
///
/// let mut parser = FrameParser::new();
/// // "Hello" from the RFC 6455 examples, masked with 37 fa 21 3d.
/// let wire = [
///     0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
/// ];
///
/// let mut head = &wire[..4];
/// assert!(parser.parse(&mut head).expect("valid prefix").is_none());
///
/// let mut tail = &wire[4..];
/// let message = parser
///     .parse(&mut tail)
///     .expect("valid frame")
///     .expect("message complete");
/// assert_eq!(message.as_text(), Some("Hello"));
/// ```
#[derive(Debug)]
pub struct FrameParser {
    stage: Stage,
    data: Option<MessageBuffer>,
    control: Option<MessageBuffer>,
}

impl Default for FrameParser {
    fn default() -> Self { Self::new() }
}

impl FrameParser {
    /// Create a parser waiting for the first frame header.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: Stage::Flags,
            data: None,
            control: None,
        }
    }

    /// Current position within the frame being read.
    #[must_use]
    pub fn stage(&self) -> Stage { self.stage }

    /// Whether a fragmented data message is waiting for more frames.
    #[must_use]
    pub fn has_open_message(&self) -> bool { self.data.is_some() }

    /// Consume bytes from `src` until a message completes or input runs out.
    ///
    /// Returns `Ok(None)` when every available byte was consumed without
    /// completing a message. Bytes following a completed message are left in
    /// `src` for the next call.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] on the first framing, size or encoding
    /// violation. The parser is reset afterwards; the connection is expected
    /// to close.
    pub fn parse<B: Buf>(&mut self, src: &mut B) -> Result<Option<Message>, ProtocolError> {
        let result = self.advance(src);
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Drop any partial message and return to the frame start.
    pub fn reset(&mut self) {
        self.stage = Stage::Flags;
        self.data = None;
        self.control = None;
    }

    fn advance<B: Buf>(&mut self, src: &mut B) -> Result<Option<Message>, ProtocolError> {
        loop {
            if let Stage::Payload {
                header,
                key,
                consumed,
            } = self.stage
            {
                if consumed < header.payload_len {
                    if !src.has_remaining() {
                        return Ok(None);
                    }
                    let taken = self.consume_payload(src, header, key, consumed)?;
                    self.stage = Stage::Payload {
                        header,
                        key,
                        consumed: consumed + taken,
                    };
                    continue;
                }

                self.stage = Stage::Flags;
                if header.fin {
                    return self.finish(header.opcode).map(Some);
                }
                continue;
            }

            if !src.has_remaining() {
                return Ok(None);
            }
            let starting_frame = self.stage == Stage::Flags;
            let next = self.stage.step(src.get_u8(), self.data.is_some())?;
            if starting_frame && let Stage::PayloadLen1 { opcode, .. } = next {
                self.open(opcode);
            }
            if let Stage::Payload { header, .. } = next
                && !header.opcode.is_control()
                && let Some(data) = &self.data
            {
                data.check_room(header.payload_len)?;
            }
            self.stage = next;
        }
    }

    fn open(&mut self, opcode: Opcode) {
        if opcode.is_data() {
            self.data = Some(MessageBuffer::with_limit(opcode, MAX_MESSAGE_SIZE));
        } else if opcode.is_control() {
            self.control = Some(MessageBuffer::with_limit(opcode, MAX_CONTROL_PAYLOAD));
        }
    }

    fn consume_payload<B: Buf>(
        &mut self,
        src: &mut B,
        header: FrameHeader,
        key: [u8; 4],
        consumed: u64,
    ) -> Result<u64, ProtocolError> {
        let chunk = src.chunk();
        let wanted = header.payload_len - consumed;
        let take = usize::try_from(wanted).map_or(chunk.len(), |wanted| wanted.min(chunk.len()));
        self.open_buffer(header.opcode)?
            .append_masked(&chunk[..take], key, consumed)?;
        src.advance(take);
        Ok(take as u64)
    }

    fn open_buffer(&mut self, opcode: Opcode) -> Result<&mut MessageBuffer, ProtocolError> {
        let slot = if opcode.is_control() {
            &mut self.control
        } else {
            &mut self.data
        };
        slot.as_mut().ok_or(ProtocolError::NoMessageOpen)
    }

    fn finish(&mut self, opcode: Opcode) -> Result<Message, ProtocolError> {
        let slot = if opcode.is_control() {
            self.control.take()
        } else {
            self.data.take()
        };
        slot.ok_or(ProtocolError::NoMessageOpen)?.verify()
    }
}

impl Decoder for FrameParser {
    type Item = Message;
    type Error = ReadError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.parse(src)?)
    }
}
