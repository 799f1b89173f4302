//! Session lifecycle states and their atomic storage.

use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Upgraded, waiting for the transport switch.
    Connecting,
    /// Normal operation.
    Open,
    /// A close handshake is underway.
    Closing,
    /// Terminal; the transport has been released.
    Closed,
}

impl SessionState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Whether a close has started or finished.
    #[must_use]
    pub const fn is_closing_or_closed(self) -> bool { matches!(self, Self::Closing | Self::Closed) }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        })
    }
}

/// [`SessionState`] shared between workers, updated with compare-and-set.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new(state: SessionState) -> Self { Self(AtomicU8::new(state.as_u8())) }

    pub(crate) fn get(&self) -> SessionState { SessionState::from_u8(self.0.load(Ordering::Acquire)) }

    /// Move from `from` to `to`; returns `false` if the state was not `from`.
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter CLOSING unless a close already started. Returns the prior state
    /// on success.
    pub(crate) fn begin_closing(&self) -> Option<SessionState> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                if SessionState::from_u8(raw).is_closing_or_closed() {
                    None
                } else {
                    Some(SessionState::Closing.as_u8())
                }
            })
            .ok()
            .map(SessionState::from_u8)
    }

    /// Enter CLOSED, returning the prior state.
    pub(crate) fn close(&self) -> SessionState {
        SessionState::from_u8(self.0.swap(SessionState::Closed.as_u8(), Ordering::AcqRel))
    }
}
