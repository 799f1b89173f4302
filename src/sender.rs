//! Outbound helper that splits messages into server frames.
//!
//! [`FrameSender`] cuts a payload into frames no larger than the configured
//! maximum frame payload, tags them with the right opcodes and FIN flag, and
//! queues them on a [`Transport`]. All frames of one logical message are
//! queued under a per-session lock so concurrent senders never interleave.

use std::{
    io,
    num::NonZeroUsize,
    sync::{Mutex, PoisonError},
};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    frame::{MAX_FRAME_PAYLOAD, Opcode, encode_header, encoded_header_len},
    transport::Transport,
};

/// Default frame payload cap: the frame buffer minus the header budget.
pub const DEFAULT_MAX_FRAME_PAYLOAD: NonZeroUsize =
    NonZeroUsize::MIN.saturating_add(MAX_FRAME_PAYLOAD - 1);

/// One outbound frame before encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundFrame {
    fin: bool,
    opcode: Opcode,
    payload: Bytes,
}

impl OutboundFrame {
    /// Whether this frame ends its message.
    #[must_use]
    pub const fn fin(&self) -> bool { self.fin }

    /// Opcode carried by this frame.
    #[must_use]
    pub const fn opcode(&self) -> Opcode { self.opcode }

    /// Payload slice carried by this frame.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Encode header and payload into one buffer.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let len = self.payload.len();
        let mut buf = BytesMut::with_capacity(encoded_header_len(len) + len);
        encode_header(&mut buf, self.fin, self.opcode, len);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Splits and queues outbound messages for one session.
#[derive(Debug)]
pub struct FrameSender {
    max_frame_payload: NonZeroUsize,
    lock: Mutex<()>,
}

impl Default for FrameSender {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_PAYLOAD) }
}

impl FrameSender {
    /// Create a sender that caps frame payloads at `max_frame_payload` bytes.
    #[must_use]
    pub const fn new(max_frame_payload: NonZeroUsize) -> Self {
        Self {
            max_frame_payload,
            lock: Mutex::new(()),
        }
    }

    /// Return the maximum frame payload size in bytes.
    #[must_use]
    pub const fn max_frame_payload(&self) -> NonZeroUsize { self.max_frame_payload }

    /// Split `payload` into frames for a message opened by `opcode`.
    ///
    /// The first frame carries `opcode`, later frames carry
    /// [`Opcode::Continuation`] and only the last frame has FIN set. An empty
    /// payload still yields one frame.
    ///
    /// ```
    /// use std::num::NonZeroUsize;
    ///
    /// use bytes::Bytes;
    /// use wiresocket::{frame::Opcode, sender::FrameSender};
    ///
    /// let sender = FrameSender::new(NonZeroUsize::new(4).expect("non-zero"));
    /// let frames = sender.fragment(Opcode::Text, Bytes::from_static(b"abcdefghij"));
    /// assert_eq!(frames.len(), 3);
    /// assert_eq!(frames[0].opcode(), Opcode::Text);
    /// assert_eq!(frames[2].opcode(), Opcode::Continuation);
    /// assert!(frames[2].fin());
    /// ```
    #[must_use]
    pub fn fragment(&self, opcode: Opcode, payload: Bytes) -> Vec<OutboundFrame> {
        let max = self.max_frame_payload.get();
        if payload.is_empty() {
            return vec![OutboundFrame {
                fin: true,
                opcode,
                payload,
            }];
        }

        let total = payload.len();
        let mut frames = Vec::with_capacity(total.div_ceil(max));
        let mut offset = 0usize;
        while offset < total {
            let end = (offset + max).min(total);
            frames.push(OutboundFrame {
                fin: end == total,
                opcode: if offset == 0 {
                    opcode
                } else {
                    Opcode::Continuation
                },
                payload: payload.slice(offset..end),
            });
            offset = end;
        }
        frames
    }

    /// Encode every frame of one message and queue them on `transport`.
    ///
    /// Returns the number of payload bytes queued.
    ///
    /// # Errors
    ///
    /// Propagates the first [`Transport::queue_write`] failure. Frames queued
    /// before the failure are not withdrawn.
    pub fn send(
        &self,
        transport: &dyn Transport,
        opcode: Opcode,
        payload: Bytes,
    ) -> io::Result<usize> {
        self.send_if(transport, opcode, payload, || true)
            .map(Option::unwrap_or_default)
    }

    /// Like [`send`](Self::send), but `admit` decides under the send lock
    /// whether the message goes out at all.
    ///
    /// Returns `Ok(None)` without queuing anything when `admit` refuses, so a
    /// state check made in `admit` cannot be overtaken by a concurrent send.
    ///
    /// # Errors
    ///
    /// Propagates the first [`Transport::queue_write`] failure.
    pub fn send_if(
        &self,
        transport: &dyn Transport,
        opcode: Opcode,
        payload: Bytes,
        admit: impl FnOnce() -> bool,
    ) -> io::Result<Option<usize>> {
        let len = payload.len();
        let frames = self.fragment(opcode, payload);
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !admit() {
            return Ok(None);
        }
        for frame in &frames {
            transport.queue_write(frame.encode())?;
        }
        Ok(Some(len))
    }
}
