//! Session statistics collection.
//!
//! Sessions report lifecycle and traffic events to a [`StatsSink`]. The
//! embedding server decides where they go; [`MetricsStats`] forwards them to
//! the `metrics` facade and [`NoopStats`] discards them.

use crate::metrics::{self, Direction};

/// Receiver for per-session statistics events.
///
/// Implementations are shared between worker tasks and must be cheap to call;
/// they run on the message execution path.
pub trait StatsSink: Send + Sync + 'static {
    /// A session reached OPEN.
    fn add_new_session(&self);

    /// A session reached CLOSED.
    fn add_closed_session(&self);

    /// A complete message of `bytes` payload bytes was received.
    fn add_incoming_message(&self, bytes: usize);

    /// A complete message of `bytes` payload bytes was sent.
    fn add_outgoing_message(&self, bytes: usize);
}

/// Sink recording through the helpers in [`crate::metrics`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsStats;

impl StatsSink for MetricsStats {
    fn add_new_session(&self) { metrics::inc_sessions(); }

    fn add_closed_session(&self) { metrics::dec_sessions(); }

    fn add_incoming_message(&self, bytes: usize) {
        metrics::record_message(Direction::Inbound, bytes);
    }

    fn add_outgoing_message(&self, bytes: usize) {
        metrics::record_message(Direction::Outbound, bytes);
    }
}

/// Sink that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn add_new_session(&self) {}

    fn add_closed_session(&self) {}

    fn add_incoming_message(&self, _bytes: usize) {}

    fn add_outgoing_message(&self, _bytes: usize) {}
}
