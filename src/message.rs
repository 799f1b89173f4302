//! Message buffers and verified messages.
//!
//! A [`MessageBuffer`] accumulates the unmasked payload of one message while
//! its frames arrive. Once the final frame is in, [`MessageBuffer::verify`]
//! compacts the bytes and converts them into a [`Message`] whose payload is
//! either validated UTF-8 text or raw bytes.

use bytes::{Bytes, BytesMut};

use crate::{
    frame::{MAX_MESSAGE_SIZE, Opcode, apply_mask},
    parser::ProtocolError,
};

/// Capacity-bounded accumulator for one in-progress message.
#[derive(Debug)]
pub struct MessageBuffer {
    opcode: Opcode,
    data: BytesMut,
    limit: usize,
}

impl MessageBuffer {
    /// Create an empty buffer for a message opened by `opcode`, capped at
    /// [`MAX_MESSAGE_SIZE`].
    #[must_use]
    pub fn new(opcode: Opcode) -> Self { Self::with_limit(opcode, MAX_MESSAGE_SIZE) }

    /// Create an empty buffer with an explicit size cap.
    #[must_use]
    pub fn with_limit(opcode: Opcode, limit: usize) -> Self {
        Self {
            opcode,
            data: BytesMut::new(),
            limit,
        }
    }

    /// Opcode of the frame that opened the message.
    #[must_use]
    pub const fn opcode(&self) -> Opcode { self.opcode }

    /// Bytes accumulated so far.
    #[must_use]
    pub fn len(&self) -> usize { self.data.len() }

    /// Whether nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// Check that `additional` more bytes fit under the cap without
    /// allocating them.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooBig`] if the message would exceed
    /// its limit.
    pub fn check_room(&self, additional: u64) -> Result<(), ProtocolError> {
        self.checked_size(additional).map(drop)
    }

    /// Append unmasked payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooBig`] if the message would exceed
    /// its limit. Nothing is appended in that case.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), ProtocolError> {
        self.checked_size(chunk.len() as u64)?;
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    /// Append masked payload bytes, unmasking them in place.
    ///
    /// `position` is the index of `chunk[0]` within the frame payload, so a
    /// frame split across reads unmasks with the right key rotation.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooBig`] if the message would exceed
    /// its limit. Nothing is appended in that case.
    pub fn append_masked(
        &mut self,
        chunk: &[u8],
        key: [u8; 4],
        position: u64,
    ) -> Result<(), ProtocolError> {
        self.checked_size(chunk.len() as u64)?;
        let start = self.data.len();
        self.data.extend_from_slice(chunk);
        #[expect(clippy::cast_possible_truncation, reason = "value is below 4")]
        let offset = (position % 4) as usize;
        apply_mask(&mut self.data[start..], key, offset);
        Ok(())
    }

    fn checked_size(&self, additional: u64) -> Result<usize, ProtocolError> {
        let size = (self.data.len() as u64).saturating_add(additional);
        match usize::try_from(size) {
            Ok(size) if size <= self.limit => Ok(size),
            _ => Err(ProtocolError::MessageTooBig {
                size,
                max: self.limit,
            }),
        }
    }

    /// Compact the buffer and run type-specific verification.
    ///
    /// Text payloads must be valid UTF-8; every other payload is passed
    /// through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidUtf8`] for a text message that is not
    /// valid UTF-8.
    pub fn verify(self) -> Result<Message, ProtocolError> {
        let bytes = self.data.freeze();
        let payload = match self.opcode {
            Opcode::Text => {
                let text =
                    String::from_utf8(Vec::from(bytes)).map_err(|_| ProtocolError::InvalidUtf8)?;
                Payload::Text(text)
            }
            _ => Payload::Binary(bytes),
        };
        Ok(Message::new(self.opcode, payload))
    }
}

/// Verified payload representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Decoded UTF-8 text.
    Text(String),
    /// Raw bytes (binary data and control payloads).
    Binary(Bytes),
}

impl Payload {
    /// Raw bytes of the payload, encoding text as UTF-8.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Text(text) => Bytes::from(text),
            Self::Binary(bytes) => bytes,
        }
    }
}

/// A complete, verified message.
///
/// Close, ping and pong are single-frame messages with binary payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    opcode: Opcode,
    payload: Payload,
}

impl Message {
    /// Build a message from its parts.
    #[must_use]
    pub fn new(opcode: Opcode, payload: Payload) -> Self { Self { opcode, payload } }

    /// Convenience constructor for a text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, Payload::Text(text.into()))
    }

    /// Convenience constructor for a binary-payload message with `opcode`.
    #[must_use]
    pub fn binary(opcode: Opcode, data: impl Into<Bytes>) -> Self {
        Self::new(opcode, Payload::Binary(data.into()))
    }

    /// Opcode that opened the message.
    #[must_use]
    pub const fn opcode(&self) -> Opcode { self.opcode }

    /// Borrow the verified payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload { &self.payload }

    /// Text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    /// Raw payload bytes regardless of representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.payload {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.as_bytes().len() }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Consume the message, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Payload { self.payload }
}
