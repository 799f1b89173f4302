//! RFC 6455 wire primitives.
//!
//! This module collects the pieces shared by the inbound parser and the
//! outbound sender: the opcode table, the fixed protocol limits, payload
//! masking, the payload length forms and server-side header encoding.
//!
//! ```text
//! byte 0: FIN(1) RSV1-3(3) OPCODE(4)
//! byte 1: MASK(1) PAYLOAD_LEN(7)
//!   PAYLOAD_LEN == 126: 16-bit big-endian length follows
//!   PAYLOAD_LEN == 127: 64-bit big-endian length follows (high bit clear)
//! masking key: 4 bytes, inbound frames only
//! payload: XOR-masked with the key cyclically
//! ```

pub mod header;
pub mod length;
pub mod mask;
pub mod opcode;

pub use header::{FrameHeader, encode_header, encoded_header_len};
pub use length::PayloadLength;
pub use mask::apply_mask;
pub use opcode::Opcode;

/// Largest message payload accepted from a peer, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 2_097_152;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Size of the outbound frame buffer.
pub const FRAME_BUFFER_SIZE: usize = 8192;

/// Header budget reserved inside the outbound frame buffer.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest payload written into a single outbound frame.
pub const MAX_FRAME_PAYLOAD: usize = FRAME_BUFFER_SIZE - FRAME_HEADER_SIZE;

/// FIN flag in the first header byte.
pub(crate) const FIN_BIT: u8 = 0x80;
/// RSV1-RSV3 flags in the first header byte.
pub(crate) const RSV_BITS: u8 = 0x70;
/// Opcode nibble in the first header byte.
pub(crate) const OPCODE_MASK: u8 = 0x0F;
/// MASK flag in the second header byte.
pub(crate) const MASK_BIT: u8 = 0x80;
/// 7-bit length field in the second header byte.
pub(crate) const LEN_MASK: u8 = 0x7F;
/// Length marker announcing a 16-bit extended length.
pub(crate) const LEN_MARKER_16: u8 = 126;
/// Length marker announcing a 64-bit extended length.
pub(crate) const LEN_MARKER_64: u8 = 127;
