//! Worker task that executes queued units.

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, atomic::Ordering},
};

use futures::FutureExt;
use log::error;
use tokio::time::timeout;

use super::{Shared, Unit};
use crate::{metrics, panic::format_panic};

enum Next {
    Unit(Unit),
    Idle,
    Stop,
}

/// Pull and execute units until shutdown or idle retirement.
pub(super) async fn run(shared: Arc<Shared>) {
    loop {
        shared.idle.fetch_add(1, Ordering::AcqRel);
        let next = tokio::select! {
            biased;

            () = shared.shutdown.cancelled() => Next::Stop,

            received = timeout(shared.config.idle_timeout, recv(&shared)) => match received {
                Ok(Some(unit)) => Next::Unit(unit),
                Ok(None) => Next::Stop,
                Err(_) => Next::Idle,
            },
        };
        shared.idle.fetch_sub(1, Ordering::AcqRel);

        match next {
            Next::Unit(unit) => execute(unit).await,
            Next::Idle if retire(&shared) => return,
            Next::Idle => {}
            Next::Stop => {
                shared.workers.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        }
    }
}

async fn recv(shared: &Shared) -> Option<Unit> { shared.rx.lock().await.recv().await }

/// Give up this worker's slot if the pool is above its minimum.
fn retire(shared: &Shared) -> bool {
    let min = shared.config.min_workers;
    shared
        .workers
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            if n > min { Some(n - 1) } else { None }
        })
        .is_ok()
}

async fn execute(unit: Unit) {
    let Unit { session, message } = unit;
    let id = session.id();
    let opcode = message.opcode();
    if let Err(panic) = AssertUnwindSafe(session.execute(message))
        .catch_unwind()
        .await
    {
        metrics::inc_handler_panics();
        let panic_msg = format_panic(&panic);
        // Emit via both `log` and `tracing` for tests that capture either.
        error!("message execution panicked: panic={panic_msg}, session={id}, opcode={opcode}");
        tracing::error!(panic = %panic_msg, session = %id, %opcode, "message execution panicked");
    }
}
