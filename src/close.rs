//! Close status codes and close-frame payloads (RFC 6455 section 7).
//!
//! A close payload is either empty or a 2-byte big-endian status code
//! followed by optional UTF-8 reason text.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frame::MAX_CONTROL_PAYLOAD;

/// Longest reason text that fits in a close frame next to its status code.
pub const MAX_REASON_LEN: usize = MAX_CONTROL_PAYLOAD - 2;

/// Status code carried by a close frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000: normal closure.
    Normal,
    /// 1001: endpoint going away.
    GoingAway,
    /// 1002: protocol error.
    ProtocolError,
    /// 1003: unsupported data type.
    UnsupportedData,
    /// 1005: no status present. Never sent on the wire.
    NoStatusReceived,
    /// 1006: abnormal closure. Never sent on the wire.
    Abnormal,
    /// 1007: payload data inconsistent with the message type.
    InvalidFramePayloadData,
    /// 1008: policy violation.
    PolicyViolation,
    /// 1009: message too big to process.
    MessageTooBig,
    /// 1010: client expected an extension the server did not negotiate.
    MandatoryExtension,
    /// 1011: unexpected server condition.
    InternalServerError,
    /// 1015: TLS handshake failure. Never sent on the wire.
    TlsHandshake,
    /// Any other registered or application-defined code.
    Other(u16),
}

impl CloseCode {
    /// Whether this code may appear in a close frame.
    #[must_use]
    pub const fn is_sendable(self) -> bool {
        !matches!(
            self,
            Self::NoStatusReceived | Self::Abnormal | Self::TlsHandshake
        )
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        match value {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::ProtocolError,
            1003 => Self::UnsupportedData,
            1005 => Self::NoStatusReceived,
            1006 => Self::Abnormal,
            1007 => Self::InvalidFramePayloadData,
            1008 => Self::PolicyViolation,
            1009 => Self::MessageTooBig,
            1010 => Self::MandatoryExtension,
            1011 => Self::InternalServerError,
            1015 => Self::TlsHandshake,
            other => Self::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::NoStatusReceived => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidFramePayloadData => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalServerError => 1011,
            CloseCode::TlsHandshake => 1015,
            CloseCode::Other(value) => value,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

/// Errors raised while decoding a close payload.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CloseReasonError {
    /// A single byte cannot hold a status code.
    #[error("close payload of 1 byte cannot carry a status code")]
    Truncated,
    /// The reason text was not valid UTF-8.
    #[error("close reason is not valid UTF-8")]
    InvalidUtf8,
}

/// Decoded close payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloseReason {
    /// Status code, absent for an empty payload.
    pub code: Option<CloseCode>,
    /// Reason text following the status code.
    pub text: String,
}

impl CloseReason {
    /// Build a reason from a status code and text.
    #[must_use]
    pub fn new(code: CloseCode, text: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            text: text.into(),
        }
    }

    /// Decode a close frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`CloseReasonError::Truncated`] for a 1-byte payload and
    /// [`CloseReasonError::InvalidUtf8`] when the reason is not UTF-8.
    pub fn parse(payload: &[u8]) -> Result<Self, CloseReasonError> {
        match payload {
            [] => Ok(Self::default()),
            [_] => Err(CloseReasonError::Truncated),
            [hi, lo, rest @ ..] => {
                let text = std::str::from_utf8(rest).map_err(|_| CloseReasonError::InvalidUtf8)?;
                Ok(Self {
                    code: Some(CloseCode::from(u16::from_be_bytes([*hi, *lo]))),
                    text: text.to_owned(),
                })
            }
        }
    }

    /// Encode as a close frame payload.
    ///
    /// Reason text beyond [`MAX_REASON_LEN`] bytes is cut at the nearest
    /// character boundary so the frame stays within the control-frame limit.
    ///
    /// ```
    /// use wiresocket::close::{CloseCode, CloseReason};
    ///
    /// let payload = CloseReason::new(CloseCode::InternalServerError, "too many messages").encode();
    /// assert_eq!(&payload[..2], &[0x03, 0xF3]);
    /// assert_eq!(&payload[2..], b"too many messages");
    /// ```
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let Some(code) = self.code else {
            return Bytes::new();
        };
        let text = truncate_reason(&self.text);
        let mut buf = BytesMut::with_capacity(2 + text.len());
        buf.put_u16(code.into());
        buf.put_slice(text.as_bytes());
        buf.freeze()
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) if self.text.is_empty() => write!(f, "{code}"),
            Some(code) => write!(f, "{code} ({})", self.text),
            None => f.write_str("no status"),
        }
    }
}

fn truncate_reason(text: &str) -> &str {
    if text.len() <= MAX_REASON_LEN {
        return text;
    }
    let mut end = MAX_REASON_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
