//! Payload length forms of a frame header.
//!
//! The 7-bit length field either holds the length itself or announces a
//! 16-bit or 64-bit network-order extension.

use bytes::BufMut;

use super::{LEN_MARKER_16, LEN_MARKER_64, MASK_BIT, MAX_CONTROL_PAYLOAD};

/// How a payload length is carried on the wire.
///
/// ```
/// use wiresocket::frame::PayloadLength;
///
/// let len = PayloadLength::of(300);
/// assert_eq!(len, PayloadLength::Extended16(300));
/// let mut wire = Vec::new();
/// len.put(&mut wire, true);
/// assert_eq!(wire, [0xFE, 0x01, 0x2C]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadLength {
    /// Up to 125 bytes, held in the 7-bit field.
    Short(u8),
    /// 126 to 65535 bytes, in a 16-bit extension.
    Extended16(u16),
    /// Anything longer, in a 64-bit extension.
    Extended64(u64),
}

impl PayloadLength {
    /// Smallest form able to carry `len`.
    #[must_use]
    pub fn of(len: usize) -> Self {
        if len <= MAX_CONTROL_PAYLOAD {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "guarded by the 125-byte bound"
            )]
            return Self::Short(len as u8);
        }
        match u16::try_from(len) {
            Ok(len) => Self::Extended16(len),
            Err(_) => Self::Extended64(len as u64),
        }
    }

    /// The length itself.
    #[must_use]
    pub const fn get(self) -> u64 {
        match self {
            Self::Short(len) => len as u64,
            Self::Extended16(len) => len as u64,
            Self::Extended64(len) => len,
        }
    }

    /// Value of the 7-bit length field.
    #[must_use]
    pub const fn marker(self) -> u8 {
        match self {
            Self::Short(len) => len,
            Self::Extended16(_) => LEN_MARKER_16,
            Self::Extended64(_) => LEN_MARKER_64,
        }
    }

    /// Bytes following the second header byte, masking key excluded.
    #[must_use]
    pub const fn extension_len(self) -> usize {
        match self {
            Self::Short(_) => 0,
            Self::Extended16(_) => 2,
            Self::Extended64(_) => 8,
        }
    }

    /// Write the second header byte and any extension to `dst`.
    pub fn put(self, dst: &mut impl BufMut, masked: bool) {
        let mask = if masked { MASK_BIT } else { 0 };
        dst.put_u8(mask | self.marker());
        match self {
            Self::Short(_) => {}
            Self::Extended16(len) => dst.put_u16(len),
            Self::Extended64(len) => dst.put_u64(len),
        }
    }
}
