#![doc(html_root_url = "https://docs.rs/wiresocket/latest")]
//! Public API for the `wiresocket` library.
//!
//! This crate implements the server side of the WebSocket protocol
//! (RFC 6455) for connections that have already been upgraded: a resumable
//! frame parser, message reassembly and verification, the session state
//! machine with its close/ping/pong handling, a fragmenting frame sender and
//! a bounded dispatch queue that runs message handlers off the read path.

pub mod close;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod parser;
pub mod registry;
pub mod sender;
pub mod service;
pub mod session;
pub mod stats;
mod test_helpers;
pub mod transport;

pub use close::{CloseCode, CloseReason};
pub use config::EngineConfig;
pub use connection::{Connection, ReadStatus};
pub use dispatch::{DispatchConfig, DispatchError, DispatchQueue};
pub use error::{Result, WebSocketError};
pub use frame::Opcode;
pub use handler::MessageHandler;
pub use message::{Message, Payload};
pub use parser::{FrameParser, ProtocolError};
pub use registry::SessionRegistry;
pub use service::WebSocketService;
pub use session::{Session, SessionId, SessionState};
pub use stats::{MetricsStats, NoopStats, StatsSink};
pub use transport::{StreamTransport, Transport};
