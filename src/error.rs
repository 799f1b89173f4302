//! Canonical error and result types for the crate.
//!
//! Each module reports its own error enum; [`WebSocketError`] aggregates
//! them for callers that want a single error surface.

use thiserror::Error;

use crate::{
    close::CloseReasonError,
    config::ConfigError,
    dispatch::DispatchError,
    parser::{ProtocolError, ReadError},
};

/// Top-level error type exposed by `wiresocket`.
#[derive(Debug, Error)]
pub enum WebSocketError {
    /// The peer violated the WebSocket protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// A close payload could not be decoded.
    #[error("invalid close payload: {0}")]
    CloseReason(#[from] CloseReasonError),
    /// A unit could not be admitted to the dispatch queue.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    /// A configuration value was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// An error in the underlying transport.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ReadError> for WebSocketError {
    fn from(error: ReadError) -> Self {
        match error {
            ReadError::Protocol(e) => Self::Protocol(e),
            ReadError::Io(e) => Self::Io(e),
        }
    }
}

impl WebSocketError {
    /// Close status to send to the peer for this error, if one applies.
    #[must_use]
    pub fn close_code(&self) -> Option<crate::close::CloseCode> {
        match self {
            Self::Protocol(e) => Some(e.close_code()),
            Self::CloseReason(_) => Some(crate::close::CloseCode::ProtocolError),
            Self::Dispatch(_) => Some(crate::close::CloseCode::InternalServerError),
            Self::Config(_) | Self::Io(_) => None,
        }
    }
}

/// Canonical result alias used by `wiresocket` public APIs.
pub type Result<T> = std::result::Result<T, WebSocketError>;

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;
    use crate::close::CloseCode;

    #[rstest]
    #[case::protocol(ProtocolError::UnmaskedFrame.into(), Some(CloseCode::ProtocolError))]
    #[case::utf8(ProtocolError::InvalidUtf8.into(), Some(CloseCode::InvalidFramePayloadData))]
    #[case::queue(DispatchError::QueueFull.into(), Some(CloseCode::InternalServerError))]
    #[case::io(io::Error::from(io::ErrorKind::BrokenPipe).into(), None)]
    fn close_code_follows_error_kind(
        #[case] error: WebSocketError,
        #[case] expected: Option<CloseCode>,
    ) {
        assert_eq!(error.close_code(), expected);
    }

    #[test]
    fn read_errors_keep_their_kind() {
        let err = WebSocketError::from(ReadError::Protocol(ProtocolError::ReservedBitsSet));
        assert!(matches!(err, WebSocketError::Protocol(ProtocolError::ReservedBitsSet)));
        assert_eq!(err.to_string(), "protocol error: reserved bits must be zero");
    }
}
