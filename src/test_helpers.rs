#![cfg(test)]
//! Test-only helpers for shared test utilities.

use std::{
    io,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bytes::Bytes;

use crate::{handler::MessageHandler, transport::Transport};

/// In-memory transport that keeps every queued write.
#[derive(Debug, Default)]
pub(crate) struct SinkTransport {
    writes: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
    closes: AtomicUsize,
}

impl SinkTransport {
    /// Every byte written so far.
    pub(crate) fn written(&self) -> Vec<u8> {
        self.writes
            .lock()
            .expect("writes lock")
            .iter()
            .flat_map(|chunk| chunk.iter().copied())
            .collect()
    }

    /// Individual write calls, in order.
    pub(crate) fn chunks(&self) -> Vec<Bytes> { self.writes.lock().expect("writes lock").clone() }

    /// Number of effective closes.
    pub(crate) fn close_count(&self) -> usize { self.closes.load(Ordering::SeqCst) }
}

impl Transport for SinkTransport {
    fn queue_write(&self, bytes: Bytes) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        self.writes.lock().expect("writes lock").push(bytes);
        Ok(())
    }

    fn switch_to_read(&self) {}

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }
}

/// Handler that ignores every callback.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Quiet;

impl MessageHandler for Quiet {}
