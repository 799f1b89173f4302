//! Frame opcode table.

use std::fmt;

/// WebSocket frame opcode (low nibble of the first header byte).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented data message.
    Continuation = 0x0,
    /// UTF-8 text data.
    Text = 0x1,
    /// Binary data.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Liveness probe.
    Ping = 0x9,
    /// Answer to a ping.
    Pong = 0xA,
}

impl Opcode {
    /// Decode an opcode nibble, returning `None` for reserved values.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Return the on-wire nibble.
    #[must_use]
    pub const fn as_u8(self) -> u8 { self as u8 }

    /// Close, ping and pong frames.
    #[must_use]
    pub const fn is_control(self) -> bool { matches!(self, Self::Close | Self::Ping | Self::Pong) }

    /// Text and binary frames that open a new data message.
    #[must_use]
    pub const fn is_data(self) -> bool { matches!(self, Self::Text | Self::Binary) }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Continuation => "CONTINUATION",
            Self::Text => "TEXT",
            Self::Binary => "BINARY",
            Self::Close => "CLOSE",
            Self::Ping => "PING",
            Self::Pong => "PONG",
        };
        f.write_str(name)
    }
}
