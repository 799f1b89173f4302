//! In-memory [`Transport`] that records everything a session does.

use std::{
    io,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use wiresocket::transport::Transport;

use crate::frames::{ServerFrame, decode_server_frames};

/// Records writes, flushes and closes instead of touching a socket.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    writes: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    switches: AtomicUsize,
    fail_writes: AtomicBool,
}

impl RecordingTransport {
    /// Create an open transport.
    pub fn new() -> Self { Self::default() }

    /// Make every later write fail with `BrokenPipe`.
    pub fn fail_writes(&self) { self.fail_writes.store(true, Ordering::SeqCst); }

    /// Every byte queued so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the writes lock is poisoned.
    pub fn written(&self) -> Vec<u8> {
        self.writes
            .lock()
            .expect("writes lock")
            .iter()
            .flat_map(|chunk| chunk.iter().copied())
            .collect()
    }

    /// Frames decoded from everything queued so far.
    pub fn frames(&self) -> Vec<ServerFrame> { decode_server_frames(&self.written()) }

    /// How many times [`Transport::close`] took effect (at most one).
    pub fn close_count(&self) -> usize { self.close_calls.load(Ordering::SeqCst) }

    /// How many times [`Transport::switch_to_read`] was called.
    pub fn switch_count(&self) -> usize { self.switches.load(Ordering::SeqCst) }
}

impl Transport for RecordingTransport {
    fn queue_write(&self, bytes: Bytes) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.writes.lock().expect("writes lock").push(bytes);
        Ok(())
    }

    fn switch_to_read(&self) { self.switches.fetch_add(1, Ordering::SeqCst); }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }
}
