//! Bounded dispatch queue that runs message handling off the read path.
//!
//! The read path hands every completed message to [`DispatchQueue::queue`],
//! which never waits: the unit either fits in the bounded queue or the
//! session is shed with a close frame. A pool of worker tasks pulls units and
//! runs [`Session::execute`]. The pool grows on demand up to `max_workers`
//! and idle workers above `min_workers` retire after `idle_timeout`.
//!
//! Units of one session may be executed by different workers at the same
//! time, so handling order within a session is not guaranteed. Frame
//! emission stays serialised per session by the session's send lock.
//!
//! The queue is an explicitly constructed service: create it once with
//! [`DispatchQueue::start`] and pass clones to every connection.

pub mod config;
pub mod error;
mod worker;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

pub use config::DispatchConfig;
pub use error::DispatchError;
use log::warn;
use tokio::sync::{
    Mutex,
    mpsc::{self, error::TrySendError},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{close::CloseCode, message::Message, metrics, session::Session};

/// Close reason sent to a session shed by a full queue.
pub const QUEUE_FULL_REASON: &str = "too many messages";
/// Close reason sent to sessions still queued at shutdown.
pub const SHUTDOWN_REASON: &str = "server shutting down";

/// One execution unit: a message and the session that received it.
pub(crate) struct Unit {
    session: Session,
    message: Message,
}

pub(crate) struct Shared {
    tx: mpsc::Sender<Unit>,
    rx: Mutex<mpsc::Receiver<Unit>>,
    config: DispatchConfig,
    workers: AtomicUsize,
    idle: AtomicUsize,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Shared {
    /// Reserve a worker slot and spawn a worker into it.
    fn spawn_worker(self: &Arc<Self>) -> bool {
        let max = self.config.max_workers;
        let reserved = self
            .workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok();
        if reserved {
            self.tracker.spawn(worker::run(Arc::clone(self)));
        }
        reserved
    }
}

/// Cancels the pool once the last [`DispatchQueue`] handle is dropped.
struct Owner(Arc<Shared>);

impl Drop for Owner {
    fn drop(&mut self) { self.0.shutdown.cancel(); }
}

/// Cloneable handle to a running dispatch queue.
#[derive(Clone)]
pub struct DispatchQueue {
    owner: Arc<Owner>,
}

impl DispatchQueue {
    /// Start the queue and its minimum set of workers.
    ///
    /// `config` is normalised first. Must be called from within a tokio
    /// runtime.
    #[must_use]
    pub fn start(config: DispatchConfig) -> Self {
        let config = config.normalized();
        let (tx, rx) = mpsc::channel(config.capacity);
        let shared = Arc::new(Shared {
            tx,
            rx: Mutex::new(rx),
            config,
            workers: AtomicUsize::new(0),
            idle: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });
        for _ in 0..config.min_workers {
            shared.spawn_worker();
        }
        Self {
            owner: Arc::new(Owner(shared)),
        }
    }

    fn shared(&self) -> &Arc<Shared> { &self.owner.0 }

    /// Configuration in effect after normalisation.
    #[must_use]
    pub fn config(&self) -> DispatchConfig { self.shared().config }

    /// Admit `message` for execution on `session` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueFull`] when the queue is at capacity and
    /// [`DispatchError::ShutDown`] after [`shutdown`](Self::shutdown). The
    /// session is sent a close frame in both cases; the unit is not silently
    /// dropped.
    pub fn queue(&self, session: &Session, message: Message) -> Result<(), DispatchError> {
        let shared = self.shared();
        if shared.shutdown.is_cancelled() {
            session.send_close(CloseCode::GoingAway, SHUTDOWN_REASON);
            return Err(DispatchError::ShutDown);
        }

        let unit = Unit {
            session: session.clone(),
            message,
        };
        match shared.tx.try_send(unit) {
            Ok(()) => {
                if shared.idle.load(Ordering::Acquire) == 0 {
                    shared.spawn_worker();
                }
                Ok(())
            }
            Err(TrySendError::Full(unit)) => {
                let id = unit.session.id();
                metrics::inc_rejected();
                warn!(
                    "dispatch queue full, shedding session: session={id}, capacity={}",
                    shared.config.capacity
                );
                tracing::warn!(session = %id, "dispatch queue full");
                unit.session
                    .send_close(CloseCode::InternalServerError, QUEUE_FULL_REASON);
                Err(DispatchError::QueueFull)
            }
            Err(TrySendError::Closed(unit)) => {
                unit.session.send_close(CloseCode::GoingAway, SHUTDOWN_REASON);
                Err(DispatchError::ShutDown)
            }
        }
    }

    /// Number of live workers.
    #[must_use]
    pub fn worker_count(&self) -> usize { self.shared().workers.load(Ordering::Acquire) }

    /// Number of workers waiting for a unit.
    #[must_use]
    pub fn idle_workers(&self) -> usize { self.shared().idle.load(Ordering::Acquire) }

    /// Units waiting for a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        let tx = &self.shared().tx;
        tx.max_capacity() - tx.capacity()
    }

    /// Stop all workers and wait for them to finish their current unit.
    ///
    /// Units still queued are not executed; their sessions are closed with
    /// GOING_AWAY.
    pub async fn shutdown(&self) {
        let shared = self.shared();
        shared.shutdown.cancel();
        shared.tracker.close();
        shared.tracker.wait().await;

        let mut rx = shared.rx.lock().await;
        while let Ok(unit) = rx.try_recv() {
            unit.session.send_close(CloseCode::GoingAway, SHUTDOWN_REASON);
        }
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("config", &self.config())
            .field("workers", &self.worker_count())
            .field("idle", &self.idle_workers())
            .field("pending", &self.pending())
            .finish()
    }
}
