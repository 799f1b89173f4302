//! Rejections raised while parsing inbound frames.
//!
//! Every variant maps to the close status sent back to the peer; the
//! `Display` text doubles as the close reason.

use std::io;

use thiserror::Error;

use crate::close::CloseCode;

/// Framing, size and encoding violations detected by the parser.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// One of RSV1-RSV3 was set without a negotiated extension.
    #[error("reserved bits must be zero")]
    ReservedBitsSet,
    /// The opcode nibble is reserved.
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),
    /// A text or binary frame arrived while another data message was open.
    #[error("received a new data frame while a message is still open")]
    DataMessageOpen,
    /// A continuation frame arrived with no data message open.
    #[error("continuation frame without an open message")]
    NoMessageOpen,
    /// A control frame had FIN clear.
    #[error("control frames cannot be fragmented")]
    FragmentedControlFrame,
    /// The MASK bit was clear on an inbound frame.
    #[error("frames must be masked")]
    UnmaskedFrame,
    /// A control frame declared more than 125 payload bytes.
    #[error("maximum control frame size is 125 bytes")]
    ControlFrameTooLarge {
        /// Declared payload length.
        len: u64,
    },
    /// The most significant bit of a 64-bit length was set.
    #[error("payload length must not set the most significant bit")]
    LengthHighBitSet,
    /// The message grew past the size cap.
    #[error("message of {size} bytes exceeds the maximum of {max} bytes")]
    MessageTooBig {
        /// Size the message would have reached.
        size: u64,
        /// Configured cap.
        max: usize,
    },
    /// A text message was not valid UTF-8.
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Status code sent to the peer when this error closes the connection.
    #[must_use]
    pub const fn close_code(&self) -> CloseCode {
        match self {
            Self::MessageTooBig { .. } => CloseCode::MessageTooBig,
            Self::InvalidUtf8 => CloseCode::InvalidFramePayloadData,
            _ => CloseCode::ProtocolError,
        }
    }
}

/// Error surfaced by the [`tokio_util::codec::Decoder`] implementation.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The peer violated the protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Reading from the socket failed.
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}
