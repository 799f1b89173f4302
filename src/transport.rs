//! Byte-level transport seam between a session and its socket.
//!
//! Sessions never touch the socket directly. They queue encoded frames on a
//! [`Transport`], ask it to return to read-ready mode after a send, and close
//! it when the connection is finished.
//!
//! [`StreamTransport`] is the tokio implementation: every frame goes over an
//! ordered channel to a single writer task that owns the write half, so
//! frames are emitted in queue order and no lock is held across I/O. Bytes
//! waiting for the writer are counted against a fixed limit: a peer that
//! stops reading gets its writes refused instead of growing the queue.

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        Weak,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use log::warn;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

/// Operations a session needs from the underlying connection.
///
/// All methods are non-blocking.
pub trait Transport: Send + Sync + 'static {
    /// Queue encoded bytes for writing, in order.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`io::ErrorKind::NotConnected`] once the
    /// transport is closed, [`io::ErrorKind::WouldBlock`] if the bytes do not
    /// fit in the outbound queue, or the underlying failure if the write path
    /// has broken.
    fn queue_write(&self, bytes: Bytes) -> io::Result<()>;

    /// Finish the current send and resume waiting for inbound data.
    fn switch_to_read(&self);

    /// Close the connection. Bytes queued before the call are still written.
    ///
    /// Calling `close` more than once has no further effect.
    fn close(&self);

    /// Whether [`close`](Self::close) has been called or the write path
    /// failed.
    fn is_closed(&self) -> bool;
}

enum Command {
    Write(Bytes),
    Flush,
}

struct Inner {
    sender: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    pending: Arc<AtomicUsize>,
    write_limit: usize,
    closed: AtomicBool,
    close_token: CancellationToken,
    done: CancellationToken,
}

impl Inner {
    fn send(&self, command: Command) -> io::Result<()> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(not_connected());
        };
        sender.send(command).map_err(|_| not_connected())
    }

    fn write(&self, bytes: Bytes) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(not_connected());
        }
        let len = bytes.len();
        let reserved = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                queued
                    .checked_add(len)
                    .filter(|total| *total <= self.write_limit)
            });
        if let Err(queued) = reserved {
            tracing::debug!(queued, len, limit = self.write_limit, "outbound queue full");
            return Err(queue_full());
        }
        self.send(Command::Write(bytes)).inspect_err(|_| {
            self.pending.fetch_sub(len, Ordering::AcqRel);
        })
    }

    fn mark_closed(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Dropping the sender lets the writer drain what is queued, then stop.
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.close_token.cancel();
        true
    }
}

fn not_connected() -> io::Error { io::Error::from(io::ErrorKind::NotConnected) }

fn queue_full() -> io::Error {
    io::Error::new(io::ErrorKind::WouldBlock, "outbound queue limit reached")
}

/// [`Transport`] over any tokio [`AsyncWrite`] half.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<Inner>,
}

impl StreamTransport {
    /// Spawn the writer task for `writer` and return a handle to it.
    ///
    /// Output is buffered in a `buffer_size` byte buffer and flushed on
    /// [`Transport::switch_to_read`] and before shutdown. At most
    /// `write_limit` bytes may wait for the writer; writes beyond that are
    /// refused until the peer reads. Must be called from within a tokio
    /// runtime.
    pub fn spawn<W>(writer: W, buffer_size: usize, write_limit: usize) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(Inner {
            sender: Mutex::new(Some(tx)),
            pending: pending.clone(),
            write_limit,
            closed: AtomicBool::new(false),
            close_token: CancellationToken::new(),
            done: CancellationToken::new(),
        });
        tokio::spawn(write_loop(
            BufWriter::with_capacity(buffer_size, writer),
            rx,
            pending,
            Arc::downgrade(&inner),
            inner.done.clone(),
        ));
        Self { inner }
    }

    /// Token cancelled as soon as the transport is closed.
    ///
    /// Read loops select on it to stop reading from a closed connection.
    #[must_use]
    pub fn close_token(&self) -> CancellationToken { self.inner.close_token.clone() }

    /// Wait until the writer task has flushed and shut the stream down.
    pub async fn finished(&self) { self.inner.done.cancelled().await; }

    /// Bytes queued but not yet handed to the stream.
    #[must_use]
    pub fn pending_bytes(&self) -> usize { self.inner.pending.load(Ordering::Acquire) }
}

impl Transport for StreamTransport {
    fn queue_write(&self, bytes: Bytes) -> io::Result<()> { self.inner.write(bytes) }

    fn switch_to_read(&self) {
        // Nothing to flush once the writer has gone away.
        let _ = self.inner.send(Command::Flush);
    }

    fn close(&self) { self.inner.mark_closed(); }

    fn is_closed(&self) -> bool { self.inner.closed.load(Ordering::Acquire) }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn write_loop<W>(
    mut writer: BufWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    pending: Arc<AtomicUsize>,
    inner: Weak<Inner>,
    done: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let result: io::Result<()> = async {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Write(bytes) => {
                    writer.write_all(&bytes).await?;
                    pending.fetch_sub(bytes.len(), Ordering::AcqRel);
                }
                Command::Flush => writer.flush().await?,
            }
        }
        writer.flush().await?;
        writer.shutdown().await
    }
    .await;

    if let Err(e) = result {
        warn!("websocket write failed: error={e}");
        tracing::debug!(error = %e, "transport writer stopped");
    }
    // The channel also ends when every handle is dropped without a close.
    if let Some(inner) = inner.upgrade() {
        inner.mark_closed();
    }
    done.cancel();
}
