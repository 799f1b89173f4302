//! Per-connection WebSocket session state machine.
//!
//! A [`Session`] tracks the lifecycle of one upgraded connection
//! (CONNECTING → OPEN → CLOSING → CLOSED), executes completed messages
//! handed over by the dispatch queue, answers control frames and exposes the
//! outbound API used by message handlers.
//!
//! Sends never block: frames are encoded and queued on the session's
//! [`Transport`]. A failed send closes the transport; the read loop then
//! finishes the session.

mod state;

use std::{
    fmt,
    hash::{Hash, Hasher},
    num::NonZeroUsize,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use log::{debug, warn};
pub use state::SessionState;
use state::StateCell;

use crate::{
    close::{CloseCode, CloseReason},
    frame::Opcode,
    handler::MessageHandler,
    message::{Message, Payload},
    sender::{DEFAULT_MAX_FRAME_PAYLOAD, FrameSender},
    stats::{NoopStats, StatsSink},
    transport::Transport,
};

/// Close reason sent when a message with an unexpected opcode is executed.
pub const INVALID_OPCODE_REASON: &str = "received frame with invalid opcode";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing session identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self { Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(self) -> u64 { self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SessionId({})", self.0) }
}

/// Snapshot of a session's traffic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Data messages delivered to the handler.
    pub messages_in: u64,
    /// Payload bytes of delivered data messages.
    pub bytes_in: u64,
    /// Logical messages sent, control frames included.
    pub messages_out: u64,
    /// Payload bytes sent.
    pub bytes_out: u64,
}

#[derive(Debug, Default)]
struct Counters {
    messages_in: AtomicU64,
    bytes_in: AtomicU64,
    messages_out: AtomicU64,
    bytes_out: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionCounters {
        SessionCounters {
            messages_in: self.messages_in.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    id: SessionId,
    state: StateCell,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn MessageHandler>,
    stats: Arc<dyn StatsSink>,
    sender: FrameSender,
    pinging: AtomicBool,
    opened: AtomicBool,
    close_notified: AtomicBool,
    counters: Counters,
}

/// Cheaply cloneable handle to one WebSocket session.
///
/// Equality and hashing use the [`SessionId`] only.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    transport: Arc<dyn Transport>,
    handler: Arc<dyn MessageHandler>,
    stats: Arc<dyn StatsSink>,
    max_frame_payload: NonZeroUsize,
}

impl SessionBuilder {
    /// Report statistics to `stats` instead of discarding them.
    #[must_use]
    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    /// Cap outbound frame payloads at `max` bytes.
    #[must_use]
    pub fn max_frame_payload(mut self, max: NonZeroUsize) -> Self {
        self.max_frame_payload = max;
        self
    }

    /// Build the session in the CONNECTING state.
    #[must_use]
    pub fn build(self) -> Session {
        Session {
            inner: Arc::new(Inner {
                id: SessionId::next(),
                state: StateCell::new(SessionState::Connecting),
                transport: self.transport,
                handler: self.handler,
                stats: self.stats,
                sender: FrameSender::new(self.max_frame_payload),
                pinging: AtomicBool::new(false),
                opened: AtomicBool::new(false),
                close_notified: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }
}

impl Session {
    /// Start building a session bound to `transport` and `handler`.
    #[must_use]
    pub fn builder(
        transport: Arc<dyn Transport>,
        handler: Arc<dyn MessageHandler>,
    ) -> SessionBuilder {
        SessionBuilder {
            transport,
            handler,
            stats: Arc::new(NoopStats),
            max_frame_payload: DEFAULT_MAX_FRAME_PAYLOAD,
        }
    }

    /// Build a session with default settings.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, handler: Arc<dyn MessageHandler>) -> Self {
        Self::builder(transport, handler).build()
    }

    /// Unique identifier of this session.
    #[must_use]
    pub fn id(&self) -> SessionId { self.inner.id }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState { self.inner.state.get() }

    /// Whether a ping is awaiting its pong.
    #[must_use]
    pub fn is_pinging(&self) -> bool { self.inner.pinging.load(Ordering::Acquire) }

    /// Snapshot of the traffic counters.
    #[must_use]
    pub fn counters(&self) -> SessionCounters { self.inner.counters.snapshot() }

    /// Transport this session writes to.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> { &self.inner.transport }

    /// Non-owning handle that does not keep the session alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakSession { WeakSession(Arc::downgrade(&self.inner)) }

    /// Complete the transport switch: CONNECTING → OPEN.
    ///
    /// Records the new session and runs the handler's `on_open`. Returns
    /// `false` if the session was not CONNECTING.
    pub async fn open(&self) -> bool {
        if !self
            .inner
            .state
            .transition(SessionState::Connecting, SessionState::Open)
        {
            return false;
        }
        self.inner.opened.store(true, Ordering::Release);
        self.inner.stats.add_new_session();
        debug!("session opened: id={}", self.id());
        self.inner.handler.on_open(self).await;
        true
    }

    /// Execute one complete inbound message.
    pub async fn execute(&self, message: Message) {
        match message.opcode() {
            Opcode::Text | Opcode::Binary => self.deliver(message).await,
            Opcode::Close => self.on_close_frame(message).await,
            Opcode::Ping => {
                self.send_pong(message.into_payload().into_bytes());
            }
            Opcode::Pong => {
                let _ = self.inner.pinging.compare_exchange(
                    true,
                    false,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            Opcode::Continuation => {
                warn!(
                    "closing session on unexpected opcode: id={}, opcode={}",
                    self.id(),
                    message.opcode()
                );
                self.send_close(CloseCode::InternalServerError, INVALID_OPCODE_REASON);
            }
        }
    }

    async fn deliver(&self, message: Message) {
        if self.state() != SessionState::Open {
            return;
        }
        let len = message.len();
        let counters = &self.inner.counters;
        counters.messages_in.fetch_add(1, Ordering::Relaxed);
        counters.bytes_in.fetch_add(len as u64, Ordering::Relaxed);
        self.inner.stats.add_incoming_message(len);

        match message.into_payload() {
            Payload::Text(text) => self.inner.handler.on_text(&text, self).await,
            Payload::Binary(data) => self.inner.handler.on_binary(&data, self).await,
        }
    }

    async fn on_close_frame(&self, message: Message) {
        match CloseReason::parse(message.as_bytes()) {
            Ok(reason) => debug!("peer sent close: id={}, reason={reason}", self.id()),
            Err(e) => debug!("peer sent malformed close: id={}, error={e}", self.id()),
        }

        if self
            .inner
            .state
            .transition(SessionState::Open, SessionState::Closing)
        {
            // Echo the peer's status to complete the handshake.
            self.send_frame(Opcode::Close, message.into_payload().into_bytes(), false, || true);
        } else {
            self.finish();
        }
        self.notify_close().await;
    }

    /// Start a server-initiated close and release the transport.
    ///
    /// Sends a close frame carrying `code` and `reason` (cut to fit a control
    /// frame) and moves to CLOSED once it is queued. Returns `false` without
    /// sending if a close already started.
    pub fn send_close(&self, code: CloseCode, reason: &str) -> bool {
        if self.inner.state.begin_closing().is_none() {
            return false;
        }
        tracing::debug!(session = %self.id(), %code, reason, "sending close");
        let payload = CloseReason::new(code, reason).encode();
        self.send_frame(Opcode::Close, payload, true, || true)
    }

    /// Send a ping and mark a probe as outstanding. Only sent when OPEN.
    pub fn send_ping(&self, data: impl Into<Bytes>) -> bool {
        self.send_frame(Opcode::Ping, data.into(), false, || {
            let open = self.state() == SessionState::Open;
            if open {
                self.inner.pinging.store(true, Ordering::Release);
            }
            open
        })
    }

    /// Send a pong. Refused once a close has started.
    pub fn send_pong(&self, data: impl Into<Bytes>) -> bool {
        self.send_frame(Opcode::Pong, data.into(), false, || {
            !self.state().is_closing_or_closed()
        })
    }

    /// Send a binary message. Only sent when OPEN.
    pub fn send_binary_data(&self, data: impl Into<Bytes>) -> bool {
        self.send_frame(Opcode::Binary, data.into(), false, || self.is_open())
    }

    /// Send a text message. Only sent when OPEN.
    pub fn send_text_data(&self, text: &str) -> bool {
        if !self.is_open() {
            return false;
        }
        let payload = Bytes::copy_from_slice(text.as_bytes());
        self.send_frame(Opcode::Text, payload, false, || self.is_open())
    }

    fn is_open(&self) -> bool { self.state() == SessionState::Open }

    /// Finish a session whose transport is gone.
    ///
    /// Moves to CLOSED, releases the transport and runs `on_close` if it has
    /// not run yet.
    pub async fn terminate(&self) {
        self.finish();
        self.notify_close().await;
    }

    /// Queue one message. `admit` runs under the send lock so a close queued
    /// by another worker cannot be followed by a data frame.
    fn send_frame(
        &self,
        opcode: Opcode,
        payload: Bytes,
        close_after: bool,
        admit: impl FnOnce() -> bool,
    ) -> bool {
        let len = payload.len();
        let transport = &*self.inner.transport;
        match self.inner.sender.send_if(transport, opcode, payload, admit) {
            Ok(None) => false,
            Ok(Some(_)) => {
                let counters = &self.inner.counters;
                counters.messages_out.fetch_add(1, Ordering::Relaxed);
                counters.bytes_out.fetch_add(len as u64, Ordering::Relaxed);
                self.inner.stats.add_outgoing_message(len);
                if close_after {
                    self.finish();
                } else {
                    transport.switch_to_read();
                }
                true
            }
            Err(e) => {
                warn!(
                    "websocket send failed, closing transport: id={}, opcode={opcode}, error={e}",
                    self.id()
                );
                transport.close();
                if close_after {
                    self.finish();
                }
                false
            }
        }
    }

    fn finish(&self) {
        let previous = self.inner.state.close();
        if previous == SessionState::Closed {
            return;
        }
        self.inner.transport.close();
        if self.inner.opened.load(Ordering::Acquire) {
            self.inner.stats.add_closed_session();
        }
        debug!("session closed: id={}, previous={previous}", self.id());
    }

    async fn notify_close(&self) {
        if !self.inner.opened.load(Ordering::Acquire)
            || self.inner.close_notified.swap(true, Ordering::AcqRel)
        {
            return;
        }
        self.inner.handler.on_close(self).await;
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool { self.inner.id == other.inner.id }
}

impl Eq for Session {}

impl Hash for Session {
    fn hash<H: Hasher>(&self, state: &mut H) { self.inner.id.hash(state); }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("pinging", &self.is_pinging())
            .finish_non_exhaustive()
    }
}

/// Weak counterpart of [`Session`].
#[derive(Clone, Debug, Default)]
pub struct WeakSession(Weak<Inner>);

impl WeakSession {
    /// Recover the session if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Session> { self.0.upgrade().map(|inner| Session { inner }) }

    /// Whether the session has been dropped.
    #[must_use]
    pub fn is_dead(&self) -> bool { self.0.strong_count() == 0 }
}
