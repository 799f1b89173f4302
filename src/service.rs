//! Composition root for serving upgraded WebSocket connections.
//!
//! [`WebSocketService`] ties a [`MessageHandler`] to a shared
//! [`DispatchQueue`]. The HTTP layer performs the upgrade handshake and then
//! hands the raw stream to [`WebSocketService::serve`] (or
//! [`WebSocketService::spawn`]), which builds the transport, session and
//! connection and runs them to completion.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use log::error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::task::TaskTracker;

use crate::{
    config::EngineConfig,
    connection::Connection,
    dispatch::DispatchQueue,
    handler::MessageHandler,
    metrics,
    panic::format_panic,
    registry::SessionRegistry,
    session::Session,
    stats::{MetricsStats, StatsSink},
    transport::{StreamTransport, Transport},
};

/// Serves upgraded connections for one endpoint.
pub struct WebSocketService {
    handler: Arc<dyn MessageHandler>,
    queue: DispatchQueue,
    config: EngineConfig,
    stats: Arc<dyn StatsSink>,
    registry: Arc<SessionRegistry>,
}

impl WebSocketService {
    /// Create a service dispatching through `queue`.
    ///
    /// Statistics go to [`MetricsStats`] and the default
    /// [`EngineConfig`] is used until overridden.
    #[must_use]
    pub fn new(handler: Arc<dyn MessageHandler>, queue: DispatchQueue) -> Self {
        Self {
            handler,
            queue,
            config: EngineConfig::default(),
            stats: Arc::new(MetricsStats),
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    /// Use `config`, normalised, for new connections.
    ///
    /// The dispatch section is ignored here; it applies when the queue is
    /// started.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config.normalized();
        self
    }

    /// Report session statistics to `stats`.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    /// Sessions currently served.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> { &self.registry }

    /// Queue shared by this service's connections.
    #[must_use]
    pub fn queue(&self) -> &DispatchQueue { &self.queue }

    /// Configuration applied to new connections.
    #[must_use]
    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Serve an already-upgraded stream until the connection ends.
    ///
    /// Returns the finished session so callers can inspect its counters.
    pub async fn serve<S>(&self, stream: S) -> Session
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let transport = StreamTransport::spawn(
            writer,
            self.config.frame_buffer_size,
            self.config.write_limit,
        );
        let session = Session::builder(Arc::new(transport.clone()), Arc::clone(&self.handler))
            .stats(Arc::clone(&self.stats))
            .max_frame_payload(self.config.max_frame_payload())
            .build();

        self.registry.insert(&session);
        session.open().await;

        let mut connection = Connection::new(
            session.clone(),
            self.queue.clone(),
            self.config.read_buffer_size,
        );
        connection.run(reader, &transport.close_token()).await;

        self.registry.remove(&session.id());
        transport.close();
        transport.finished().await;
        session
    }

    /// Serve `stream` on a task tracked by `tracker`, logging and discarding
    /// any panic.
    pub fn spawn<S>(self: &Arc<Self>, stream: S, tracker: &TaskTracker)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let service = Arc::clone(self);
        tracker.spawn(async move {
            let fut = AssertUnwindSafe(service.serve(stream)).catch_unwind();
            if let Err(panic) = fut.await {
                metrics::inc_handler_panics();
                let panic_msg = format_panic(&panic);
                // Emit via both `log` and `tracing` for tests that capture either.
                error!("connection task panicked: panic={panic_msg}");
                tracing::error!(panic = %panic_msg, "connection task panicked");
            }
        });
    }
}

impl std::fmt::Debug for WebSocketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketService")
            .field("queue", &self.queue)
            .field("config", &self.config)
            .field("sessions", &self.registry.len())
            .finish_non_exhaustive()
    }
}
