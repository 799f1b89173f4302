//! In-process client driving a [`WebSocketService`] over a duplex pipe.

use std::{io, sync::Arc};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex},
    task::JoinHandle,
};
use wiresocket::{WebSocketService, session::Session};

use crate::frames::{ClientFrame, ServerFrame, encode_all, split_server_frame};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Client end of a connection served by [`WebSocketService::serve`].
pub struct TestClient {
    stream: DuplexStream,
    pending: Vec<u8>,
}

impl TestClient {
    /// Connect to `service`; the handle resolves to the finished session.
    pub fn connect(service: &Arc<WebSocketService>) -> (Self, JoinHandle<Session>) {
        let (client, server) = duplex(PIPE_CAPACITY);
        let service = Arc::clone(service);
        let served = tokio::spawn(async move { service.serve(server).await });
        let client = Self {
            stream: client,
            pending: Vec::new(),
        };
        (client, served)
    }

    /// Write `frames` back to back.
    ///
    /// # Errors
    ///
    /// Returns any error from the pipe.
    pub async fn send(&mut self, frames: &[ClientFrame]) -> io::Result<()> {
        self.send_raw(&encode_all(frames)).await
    }

    /// Write raw bytes.
    ///
    /// # Errors
    ///
    /// Returns any error from the pipe.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Read the next server frame, or `None` once the server has hung up.
    ///
    /// # Errors
    ///
    /// Returns any error from the pipe.
    pub async fn next_frame(&mut self) -> io::Result<Option<ServerFrame>> {
        loop {
            if let Some((frame, used)) = split_server_frame(&self.pending) {
                self.pending.drain(..used);
                return Ok(Some(frame));
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read frames until the server hangs up.
    ///
    /// # Errors
    ///
    /// Returns any error from the pipe.
    pub async fn remaining(&mut self) -> io::Result<Vec<ServerFrame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame().await? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Stop writing; the server sees EOF.
    ///
    /// # Errors
    ///
    /// Returns any error from the pipe.
    pub async fn hang_up(&mut self) -> io::Result<()> { self.stream.shutdown().await }
}
