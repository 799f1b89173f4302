//! Frame header metadata and server-side header encoding.

use bytes::BufMut;

use super::{FIN_BIT, Opcode, PayloadLength};

/// Decoded header of the frame currently being read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Whether this frame ends its message.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Declared payload length.
    pub payload_len: u64,
}

/// Number of header bytes an unmasked frame with `payload_len` bytes needs.
#[must_use]
pub fn encoded_header_len(payload_len: usize) -> usize {
    2 + PayloadLength::of(payload_len).extension_len()
}

/// Append an unmasked frame header to `dst`.
///
/// Server frames never carry a masking key. The 7-bit form is used up to
/// 125 bytes and the 16-bit form up to 65535; larger payloads use the 64-bit
/// form.
///
/// ```
/// use bytes::BytesMut;
/// use wiresocket::frame::{Opcode, encode_header};
///
/// let mut dst = BytesMut::new();
/// encode_header(&mut dst, true, Opcode::Text, 5);
/// assert_eq!(&dst[..], &[0x81, 0x05]);
/// ```
pub fn encode_header(dst: &mut impl BufMut, fin: bool, opcode: Opcode, payload_len: usize) {
    let first = if fin { FIN_BIT } else { 0 } | opcode.as_u8();
    dst.put_u8(first);
    PayloadLength::of(payload_len).put(dst, false);
}
