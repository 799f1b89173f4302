//! Builders for masked client frames and a decoder for server output.

use wiresocket::frame::{Opcode, PayloadLength, apply_mask};

/// Masking key used by [`ClientFrame`] unless overridden.
pub const TEST_MASK: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

/// A client-to-server frame, masked by default.
///
/// ```
/// use wiresocket_testing::ClientFrame;
///
/// let wire = ClientFrame::text("Hello").encode();
/// assert_eq!(
///     wire,
///     [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
/// );
/// ```
#[derive(Clone, Debug)]
pub struct ClientFrame {
    fin: bool,
    rsv: u8,
    opcode: u8,
    masked: bool,
    key: [u8; 4],
    payload: Vec<u8>,
}

impl ClientFrame {
    /// A final frame carrying `opcode` and `payload`.
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            rsv: 0,
            opcode: opcode.as_u8(),
            masked: true,
            key: TEST_MASK,
            payload: payload.into(),
        }
    }

    /// A text frame.
    pub fn text(text: &str) -> Self { Self::new(Opcode::Text, text.as_bytes()) }

    /// A binary frame.
    pub fn binary(data: &[u8]) -> Self { Self::new(Opcode::Binary, data) }

    /// A continuation frame.
    pub fn continuation(data: &[u8]) -> Self { Self::new(Opcode::Continuation, data) }

    /// A ping frame.
    pub fn ping(data: &[u8]) -> Self { Self::new(Opcode::Ping, data) }

    /// A pong frame.
    pub fn pong(data: &[u8]) -> Self { Self::new(Opcode::Pong, data) }

    /// A close frame with a status code and reason.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(reason.as_bytes());
        Self::new(Opcode::Close, payload)
    }

    /// Set or clear FIN.
    #[must_use]
    pub fn fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Set RSV bits (`0x70` mask applied).
    #[must_use]
    pub fn rsv(mut self, bits: u8) -> Self {
        self.rsv = bits & 0x70;
        self
    }

    /// Replace the opcode nibble with an arbitrary value.
    #[must_use]
    pub fn raw_opcode(mut self, nibble: u8) -> Self {
        self.opcode = nibble & 0x0F;
        self
    }

    /// Send the payload without a mask, as a misbehaving client would.
    #[must_use]
    pub fn unmasked(mut self) -> Self {
        self.masked = false;
        self
    }

    /// Use `key` instead of [`TEST_MASK`].
    #[must_use]
    pub fn key(mut self, key: [u8; 4]) -> Self {
        self.key = key;
        self
    }

    /// Encode the frame as a client would put it on the wire.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![(u8::from(self.fin) << 7) | self.rsv | self.opcode];
        PayloadLength::of(self.payload.len()).put(&mut out, self.masked);
        let mut body = self.payload.clone();
        if self.masked {
            out.extend_from_slice(&self.key);
            apply_mask(&mut body, self.key, 0);
        }
        out.extend_from_slice(&body);
        out
    }
}

/// Concatenate the encodings of `frames`.
pub fn encode_all(frames: &[ClientFrame]) -> Vec<u8> {
    frames.iter().flat_map(ClientFrame::encode).collect()
}

/// A decoded server-to-client frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerFrame {
    /// FIN flag.
    pub fin: bool,
    /// Raw opcode nibble.
    pub opcode: u8,
    /// Unmasked payload.
    pub payload: Vec<u8>,
}

impl ServerFrame {
    /// Whether this is a close frame.
    pub fn is_close(&self) -> bool { self.opcode == Opcode::Close.as_u8() }

    /// Status code of a close frame, if present.
    pub fn close_code(&self) -> Option<u16> {
        match self.payload.as_slice() {
            [hi, lo, ..] if self.is_close() => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    /// Reason text of a close frame.
    ///
    /// # Panics
    ///
    /// Panics if the reason is not UTF-8.
    pub fn close_reason(&self) -> &str {
        let reason = self.payload.get(2..).unwrap_or_default();
        std::str::from_utf8(reason).expect("close reason is UTF-8")
    }
}

/// Decode the first complete server frame in `bytes`.
///
/// Returns the frame and the number of bytes it occupied, or `None` if more
/// bytes are needed.
///
/// # Panics
///
/// Panics if the frame is masked; servers never mask.
pub fn split_server_frame(bytes: &[u8]) -> Option<(ServerFrame, usize)> {
    let [first, second, rest @ ..] = bytes else {
        return None;
    };
    assert_eq!(second & 0x80, 0, "server frames are never masked");
    let (len, header) = match second & 0x7F {
        126 => {
            let [hi, lo, ..] = rest else { return None };
            (usize::from(u16::from_be_bytes([*hi, *lo])), 4)
        }
        127 => {
            let raw: [u8; 8] = rest.get(..8)?.try_into().ok()?;
            (usize::try_from(u64::from_be_bytes(raw)).ok()?, 10)
        }
        short => (usize::from(short), 2),
    };
    let payload = bytes.get(header..header + len)?;
    let frame = ServerFrame {
        fin: first & 0x80 != 0,
        opcode: first & 0x0F,
        payload: payload.to_vec(),
    };
    Some((frame, header + len))
}

/// Decode every complete frame written by the server.
///
/// # Panics
///
/// Panics if a frame is masked or truncated; servers never produce either.
pub fn decode_server_frames(mut bytes: &[u8]) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        let (frame, used) = split_server_frame(bytes).expect("truncated server frame");
        frames.push(frame);
        bytes = &bytes[used..];
    }
    frames
}
