//! Test support for `wiresocket`.
//!
//! Provides a masked client frame builder, a decoder for server output, an
//! in-memory recording [`Transport`](wiresocket::transport::Transport),
//! handlers that record or block, and a serialised logger fixture.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use wiresocket::session::Session;
//! use wiresocket_testing::{RecordingHandler, RecordingTransport};
//!
//! let transport = Arc::new(RecordingTransport::new());
//! let handler = Arc::new(RecordingHandler::new());
//! let session = Session::new(transport.clone(), handler.clone());
//! assert!(!session.send_text_data("not open yet"));
//! assert!(transport.written().is_empty());
//! ```

pub mod client;
pub mod frames;
pub mod handler;
pub mod logging;
pub mod transport;

pub use client::TestClient;
pub use frames::{
    ClientFrame,
    ServerFrame,
    TEST_MASK,
    decode_server_frames,
    encode_all,
    split_server_frame,
};
pub use handler::{Event, GatedHandler, RecordingHandler};
pub use logging::{LoggerHandle, logger};
pub use transport::RecordingTransport;

/// Result alias for tests that propagate any error with `?`.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
