//! Read side of one upgraded connection.
//!
//! A [`Connection`] owns the receive buffer and the frame parser for one
//! socket. Bytes are parsed synchronously as they arrive and every completed
//! message is handed to the [`DispatchQueue`]; handling never runs on the
//! read path. Protocol violations are answered with a close frame carrying
//! the matching status code and the connection stops reading.

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::{
    dispatch::DispatchQueue,
    metrics,
    parser::{FrameParser, ProtocolError},
    session::{Session, SessionState},
};

/// Outcome of feeding bytes to [`Connection::on_read`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// Keep reading.
    Continue,
    /// The connection is finished; stop reading.
    Closed,
}

/// Parser, receive buffer and routing for one connection.
pub struct Connection {
    parser: FrameParser,
    session: Session,
    queue: DispatchQueue,
    buffer: Box<[u8]>,
}

impl Connection {
    /// Create a connection serving `session` with a `read_buffer_size` byte
    /// receive buffer.
    #[must_use]
    pub fn new(session: Session, queue: DispatchQueue, read_buffer_size: usize) -> Self {
        Self {
            parser: FrameParser::new(),
            session,
            queue,
            buffer: vec![0; read_buffer_size.max(1)].into_boxed_slice(),
        }
    }

    /// Session currently served.
    #[must_use]
    pub fn session(&self) -> &Session { &self.session }

    /// Parser state, for diagnostics.
    #[must_use]
    pub fn parser(&self) -> &FrameParser { &self.parser }

    /// Serve a different session through a different queue.
    ///
    /// Parser state is kept, so a partially received message continues.
    pub fn reassociate(&mut self, session: Session, queue: DispatchQueue) {
        self.session = session;
        self.queue = queue;
    }

    /// Parse `data` and queue every message it completes.
    ///
    /// Never blocks. Returns [`ReadStatus::Closed`] once a protocol error,
    /// a rejected unit or a closed session ends the connection.
    pub fn on_read(&mut self, mut data: &[u8]) -> ReadStatus {
        loop {
            if self.is_finished() {
                return ReadStatus::Closed;
            }
            match self.parser.parse(&mut data) {
                Ok(Some(message)) => {
                    if self.queue.queue(&self.session, message).is_err() {
                        return ReadStatus::Closed;
                    }
                }
                Ok(None) => return ReadStatus::Continue,
                Err(err) => {
                    self.reject(&err);
                    return ReadStatus::Closed;
                }
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.session.state() == SessionState::Closed || self.session.transport().is_closed()
    }

    fn reject(&self, err: &ProtocolError) {
        let id = self.session.id();
        let code = err.close_code();
        metrics::inc_protocol_errors();
        warn!("closing session on protocol error: session={id}, code={code}, error={err}");
        tracing::warn!(session = %id, %code, error = %err, "protocol error");
        if !self.session.send_close(code, &err.to_string()) {
            // A close was already underway; tear down without a second frame.
            self.session.transport().close();
        }
    }

    /// Read from `reader` until EOF, a read error, `stop` or a finished
    /// session, then terminate the session.
    pub async fn run<R>(&mut self, mut reader: R, stop: &CancellationToken)
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = std::mem::take(&mut self.buffer);
        loop {
            let read = tokio::select! {
                biased;

                () = stop.cancelled() => break,

                read = reader.read(&mut buffer) => read,
            };
            match read {
                Ok(0) => {
                    debug!("peer closed connection: session={}", self.session.id());
                    break;
                }
                Ok(n) => {
                    if self.on_read(&buffer[..n]) == ReadStatus::Closed {
                        break;
                    }
                }
                Err(e) => {
                    warn!("websocket read failed: session={}, error={e}", self.session.id());
                    break;
                }
            }
        }
        self.buffer = buffer;
        self.session.terminate().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session", &self.session)
            .field("stage", &self.parser.stage())
            .field("buffer_len", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use rstest::{fixture, rstest};
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        dispatch::DispatchConfig,
        test_helpers::{Quiet, SinkTransport},
    };

    const KEY: [u8; 4] = [1, 2, 3, 4];

    fn masked(first: u8, payload: &[u8]) -> Vec<u8> {
        let len = u8::try_from(payload.len()).expect("short payload");
        let mut wire = vec![first, 0x80 | len];
        wire.extend_from_slice(&KEY);
        wire.extend(payload.iter().zip(KEY.iter().cycle()).map(|(b, k)| b ^ k));
        wire
    }

    #[fixture]
    fn transport() -> Arc<SinkTransport> {
        // Fresh transport per test
        Arc::new(SinkTransport::default())
    }

    async fn opened(transport: &Arc<SinkTransport>) -> Session {
        let dyn_transport: Arc<dyn crate::transport::Transport> = transport.clone();
        let session = Session::new(dyn_transport, Arc::new(Quiet));
        session.open().await;
        session
    }

    async fn wait_for_output(transport: &SinkTransport) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while transport.written().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("output written");
    }

    /// Protocol violations are logged with the close code sent to the peer.
    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn protocol_error_is_logged_and_closes(transport: Arc<SinkTransport>) {
        let session = opened(&transport).await;
        let queue = DispatchQueue::start(DispatchConfig::default());
        let mut connection = Connection::new(session.clone(), queue.clone(), 64);

        assert_eq!(connection.on_read(&[0x81, 0x01, b'x']), ReadStatus::Closed);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(&transport.written()[..4], &[0x88, 0x17, 0x03, 0xEA]);
        assert!(logs_contain("protocol error"));
        assert!(logs_contain("code=1002"));
        queue.shutdown().await;
    }

    #[rstest]
    #[tokio::test]
    async fn reads_stop_once_session_closed(transport: Arc<SinkTransport>) {
        let session = opened(&transport).await;
        let queue = DispatchQueue::start(DispatchConfig::default());
        let mut connection = Connection::new(session.clone(), queue.clone(), 64);

        session.send_close(crate::close::CloseCode::Normal, "");
        assert_eq!(connection.on_read(&masked(0x89, b"hi")), ReadStatus::Closed);
        assert_eq!(connection.parser().stage(), crate::parser::Stage::Flags);
        queue.shutdown().await;
    }

    #[rstest]
    #[tokio::test]
    async fn partial_frame_waits_for_more(transport: Arc<SinkTransport>) {
        let session = opened(&transport).await;
        let queue = DispatchQueue::start(DispatchConfig::default());
        let mut connection = Connection::new(session, queue.clone(), 64);

        let wire = masked(0x89, b"hello");
        assert_eq!(connection.on_read(&wire[..3]), ReadStatus::Continue);
        assert_eq!(connection.on_read(&wire[3..]), ReadStatus::Continue);
        wait_for_output(&transport).await;
        assert_eq!(transport.written(), b"\x8a\x05hello");
        queue.shutdown().await;
    }

    #[rstest]
    #[tokio::test]
    async fn reassociated_connection_continues_message(transport: Arc<SinkTransport>) {
        let first = opened(&Arc::new(SinkTransport::default())).await;
        let second = opened(&transport).await;
        let queue = DispatchQueue::start(DispatchConfig::default());
        let mut connection = Connection::new(first, queue.clone(), 64);

        let wire = masked(0x89, b"moved");
        assert_eq!(connection.on_read(&wire[..8]), ReadStatus::Continue);
        connection.reassociate(second.clone(), queue.clone());
        assert_eq!(connection.session(), &second);
        assert_eq!(connection.on_read(&wire[8..]), ReadStatus::Continue);

        wait_for_output(&transport).await;
        assert_eq!(transport.written(), b"\x8a\x05moved");
        queue.shutdown().await;
    }

    #[rstest]
    #[tokio::test]
    async fn run_terminates_session_on_eof(transport: Arc<SinkTransport>) {
        let session = opened(&transport).await;
        let queue = DispatchQueue::start(DispatchConfig::default());
        let mut connection = Connection::new(session.clone(), queue.clone(), 64);

        connection
            .run(&b""[..], &CancellationToken::new())
            .await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(transport.close_count(), 1);
        queue.shutdown().await;
    }

    #[rstest]
    #[tokio::test]
    async fn run_stops_when_cancelled(transport: Arc<SinkTransport>) {
        let session = opened(&transport).await;
        let queue = DispatchQueue::start(DispatchConfig::default());
        let mut connection = Connection::new(session.clone(), queue.clone(), 64);
        let (_client, server) = tokio::io::duplex(64);
        let stop = CancellationToken::new();
        stop.cancel();

        connection.run(server, &stop).await;
        assert_eq!(session.state(), SessionState::Closed);
        queue.shutdown().await;
    }
}
