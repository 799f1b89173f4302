//! [`MessageHandler`] implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Notify, Semaphore};
use wiresocket::{handler::MessageHandler, session::Session};

/// Callback observed by a [`RecordingHandler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// `on_open`.
    Open,
    /// `on_text` with the text received.
    Text(String),
    /// `on_binary` with the bytes received.
    Binary(Vec<u8>),
    /// `on_close`.
    Close,
}

/// Records every callback and can echo data messages back.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
    echo: bool,
    changed: Notify,
}

impl RecordingHandler {
    /// A handler that only records.
    pub fn new() -> Self { Self::default() }

    /// A handler that records and echoes text and binary messages.
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Callbacks seen so far.
    ///
    /// # Panics
    ///
    /// Panics if the events lock is poisoned.
    pub fn events(&self) -> Vec<Event> { self.events.lock().expect("events lock").clone() }

    /// Number of `on_close` calls seen.
    pub fn close_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Event::Close)
            .count()
    }

    /// Wait until at least `count` callbacks have been recorded.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.changed.notified();
            if self.events.lock().expect("events lock").len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, event: Event) {
        self.events.lock().expect("events lock").push(event);
        self.changed.notify_waiters();
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn on_open(&self, _session: &Session) { self.record(Event::Open); }

    async fn on_text(&self, text: &str, session: &Session) {
        self.record(Event::Text(text.to_owned()));
        if self.echo {
            session.send_text_data(text);
        }
    }

    async fn on_binary(&self, data: &Bytes, session: &Session) {
        self.record(Event::Binary(data.to_vec()));
        if self.echo {
            session.send_binary_data(data.clone());
        }
    }

    async fn on_close(&self, _session: &Session) { self.record(Event::Close); }
}

/// Blocks inside `on_text` and `on_binary` until released.
///
/// Lets tests hold every worker busy to saturate a dispatch queue.
#[derive(Debug)]
pub struct GatedHandler {
    entered: Semaphore,
    gate: Semaphore,
}

impl GatedHandler {
    /// A handler whose gate starts closed.
    pub fn new() -> Self {
        Self {
            entered: Semaphore::new(0),
            gate: Semaphore::new(0),
        }
    }

    /// Wait until `count` handler calls are blocked at the gate.
    ///
    /// # Panics
    ///
    /// Panics if the semaphore has been closed.
    pub async fn wait_entered(&self, count: u32) {
        self.entered
            .acquire_many(count)
            .await
            .expect("entered semaphore open")
            .forget();
    }

    /// Let `count` blocked calls proceed.
    pub fn release(&self, count: usize) { self.gate.add_permits(count); }

    async fn pass(&self) {
        self.entered.add_permits(1);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl MessageHandler for GatedHandler {
    async fn on_text(&self, _text: &str, _session: &Session) { self.pass().await; }

    async fn on_binary(&self, _data: &Bytes, _session: &Session) { self.pass().await; }
}

impl Default for GatedHandler {
    fn default() -> Self { Self::new() }
}
