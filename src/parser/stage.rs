//! Header stages of the frame parser as pure transitions.
//!
//! [`Stage::step`] consumes one header byte and yields the next stage. It
//! touches no buffers, so the header grammar can be exercised byte by byte.
//! Payload bytes are consumed in bulk by [`FrameParser`](super::FrameParser)
//! once [`Stage::Payload`] is reached.

use super::ProtocolError;
use crate::frame::{
    FIN_BIT,
    FrameHeader,
    LEN_MARKER_16,
    LEN_MARKER_64,
    LEN_MASK,
    MASK_BIT,
    MAX_CONTROL_PAYLOAD,
    MAX_MESSAGE_SIZE,
    OPCODE_MASK,
    Opcode,
    RSV_BITS,
};

/// Position of the parser within the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Expecting the FIN/RSV/opcode byte.
    Flags,
    /// Expecting the MASK/length byte.
    PayloadLen1 {
        /// FIN flag of the frame.
        fin: bool,
        /// Frame opcode.
        opcode: Opcode,
    },
    /// Collecting an extended length one byte at a time.
    PayloadLen2 {
        /// FIN flag of the frame.
        fin: bool,
        /// Frame opcode.
        opcode: Opcode,
        /// Whether this is the 64-bit form.
        wide: bool,
        /// Length bytes still expected.
        remaining: u8,
        /// Length accumulated so far.
        len: u64,
    },
    /// Collecting the 4-byte masking key.
    MaskingKey {
        /// Resolved frame header.
        header: FrameHeader,
        /// Key bytes collected so far.
        key: [u8; 4],
        /// Number of key bytes filled.
        filled: u8,
    },
    /// Consuming payload bytes.
    Payload {
        /// Resolved frame header.
        header: FrameHeader,
        /// Masking key.
        key: [u8; 4],
        /// Payload bytes consumed so far.
        consumed: u64,
    },
}

impl Stage {
    /// Advance the header state machine by one byte.
    ///
    /// `data_open` reports whether a fragmented data message is in progress.
    /// Calling this in [`Stage::Payload`] returns the stage unchanged.
    ///
    /// # Errors
    ///
    /// Returns the [`ProtocolError`] describing the first violated framing
    /// rule.
    pub fn step(self, byte: u8, data_open: bool) -> Result<Self, ProtocolError> {
        match self {
            Self::Flags => flags(byte, data_open),
            Self::PayloadLen1 { fin, opcode } => payload_len_1(fin, opcode, byte),
            Self::PayloadLen2 {
                fin,
                opcode,
                wide,
                remaining,
                len,
            } => {
                let len = (len << 8) | u64::from(byte);
                if remaining > 1 {
                    return Ok(Self::PayloadLen2 {
                        fin,
                        opcode,
                        wide,
                        remaining: remaining - 1,
                        len,
                    });
                }
                if wide && len & (1 << 63) != 0 {
                    return Err(ProtocolError::LengthHighBitSet);
                }
                resolve_length(fin, opcode, len)
            }
            Self::MaskingKey {
                header,
                mut key,
                filled,
            } => {
                key[usize::from(filled)] = byte;
                let filled = filled + 1;
                if usize::from(filled) == key.len() {
                    Ok(Self::Payload {
                        header,
                        key,
                        consumed: 0,
                    })
                } else {
                    Ok(Self::MaskingKey {
                        header,
                        key,
                        filled,
                    })
                }
            }
            Self::Payload { .. } => Ok(self),
        }
    }
}

fn flags(byte: u8, data_open: bool) -> Result<Stage, ProtocolError> {
    if byte & RSV_BITS != 0 {
        return Err(ProtocolError::ReservedBitsSet);
    }
    let fin = byte & FIN_BIT != 0;
    let nibble = byte & OPCODE_MASK;
    let opcode = Opcode::from_u8(nibble).ok_or(ProtocolError::UnknownOpcode(nibble))?;

    if opcode.is_data() && data_open {
        return Err(ProtocolError::DataMessageOpen);
    }
    if opcode.is_control() && !fin {
        return Err(ProtocolError::FragmentedControlFrame);
    }
    if opcode == Opcode::Continuation && !data_open {
        return Err(ProtocolError::NoMessageOpen);
    }
    Ok(Stage::PayloadLen1 { fin, opcode })
}

fn payload_len_1(fin: bool, opcode: Opcode, byte: u8) -> Result<Stage, ProtocolError> {
    if byte & MASK_BIT == 0 {
        return Err(ProtocolError::UnmaskedFrame);
    }
    match byte & LEN_MASK {
        LEN_MARKER_16 => Ok(Stage::PayloadLen2 {
            fin,
            opcode,
            wide: false,
            remaining: 2,
            len: 0,
        }),
        LEN_MARKER_64 => Ok(Stage::PayloadLen2 {
            fin,
            opcode,
            wide: true,
            remaining: 8,
            len: 0,
        }),
        len => resolve_length(fin, opcode, u64::from(len)),
    }
}

fn resolve_length(fin: bool, opcode: Opcode, len: u64) -> Result<Stage, ProtocolError> {
    if len > MAX_MESSAGE_SIZE as u64 {
        return Err(ProtocolError::MessageTooBig {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    if opcode.is_control() && len > MAX_CONTROL_PAYLOAD as u64 {
        return Err(ProtocolError::ControlFrameTooLarge { len });
    }
    Ok(Stage::MaskingKey {
        header: FrameHeader {
            fin,
            opcode,
            payload_len: len,
        },
        key: [0; 4],
        filled: 0,
    })
}
