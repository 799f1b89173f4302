//! Metric helpers for `wiresocket`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open sessions.
pub const SESSIONS_ACTIVE: &str = "wiresocket_sessions_active";
/// Name of the counter tracking sessions ever opened.
pub const SESSIONS_OPENED: &str = "wiresocket_sessions_opened_total";
/// Name of the counter tracking sessions that reached CLOSED.
pub const SESSIONS_CLOSED: &str = "wiresocket_sessions_closed_total";
/// Name of the counter tracking messages, labelled by direction.
pub const MESSAGES_TOTAL: &str = "wiresocket_messages_total";
/// Name of the counter tracking payload bytes, labelled by direction.
pub const MESSAGE_BYTES_TOTAL: &str = "wiresocket_message_bytes_total";
/// Name of the counter tracking connections closed on a protocol error.
pub const PROTOCOL_ERRORS_TOTAL: &str = "wiresocket_protocol_errors_total";
/// Name of the counter tracking units rejected by a full dispatch queue.
pub const REJECTED_TOTAL: &str = "wiresocket_dispatch_rejected_total";
/// Name of the counter tracking panics caught while executing messages.
pub const HANDLER_PANICS_TOTAL: &str = "wiresocket_handler_panics_total";

/// Direction of message flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Messages received from a peer.
    Inbound,
    /// Messages sent to a peer.
    Outbound,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record a newly opened session.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    {
        gauge!(SESSIONS_ACTIVE).increment(1.0);
        counter!(SESSIONS_OPENED).increment(1);
    }
}

/// Record a session reaching CLOSED.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    {
        gauge!(SESSIONS_ACTIVE).decrement(1.0);
        counter!(SESSIONS_CLOSED).increment(1);
    }
}

/// Record one message of `bytes` payload bytes in `direction`.
pub fn record_message(direction: Direction, bytes: usize) {
    #[cfg(feature = "metrics")]
    {
        counter!(MESSAGES_TOTAL, "direction" => direction.as_str()).increment(1);
        counter!(MESSAGE_BYTES_TOTAL, "direction" => direction.as_str()).increment(bytes as u64);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, bytes);
}

/// Record a connection closed because the peer violated the protocol.
pub fn inc_protocol_errors() {
    #[cfg(feature = "metrics")]
    counter!(PROTOCOL_ERRORS_TOTAL).increment(1);
}

/// Record a unit rejected by a full dispatch queue.
pub fn inc_rejected() {
    #[cfg(feature = "metrics")]
    counter!(REJECTED_TOTAL).increment(1);
}

/// Record a panic caught while executing a message.
pub fn inc_handler_panics() {
    #[cfg(feature = "metrics")]
    counter!(HANDLER_PANICS_TOTAL).increment(1);
}

/// Install a Prometheus exporter serving `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns the exporter's build error if the listener cannot be bound or a
/// global recorder is already installed.
#[cfg(feature = "metrics")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}
