//! Session (C2): the lifecycle of a single client connection.
//!
//! A `Session` owns the write half of a client's WebSocket and the
//! activity bookkeeping the idle/ping loops need. The read half is split
//! off and driven separately by the Gateway Handler's read-loop, so a
//! `Session` can be written to concurrently by the ping loop, the idle
//! loop, and the Response Router without any of them blocking the
//! read-loop.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use log::{debug, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::constants::{IDLE_CHECK_INTERVAL, IDLE_TIMEOUT, PING_INTERVAL, WRITE_DEADLINE, WRITE_RETRY_INTERVAL};
use crate::error::WriteError;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A single client connection's write side plus activity tracking.
#[derive(Debug)]
pub struct Session {
    pub client_id: String,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    last_activity_ms: AtomicI64,
    cancel: CancellationToken,
}

impl Session {
    #[must_use]
    pub fn new(client_id: String, sink: SplitSink<WebSocket, Message>) -> Arc<Self> {
        Arc::new(Self {
            client_id,
            sink: Mutex::new(sink),
            last_activity_ms: AtomicI64::new(now_millis()),
            cancel: CancellationToken::new(),
        })
    }

    /// Record activity (an inbound frame, or a successful pong).
    pub fn touch(&self) {
        self.last_activity_ms.store(now_millis(), Ordering::Relaxed);
    }

    /// Time since the last recorded activity.
    #[must_use]
    pub fn last_seen(&self) -> Duration {
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        let elapsed_ms = (now_millis() - last).max(0);
        Duration::from_millis(elapsed_ms as u64)
    }

    /// Has this session been asked to close?
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Write a frame to the client, retrying on failure at
    /// `WRITE_RETRY_INTERVAL` until either the write succeeds, the per-write
    /// deadline is hit, or the session is cancelled.
    ///
    /// The cancellation check happens before each lock acquisition (never
    /// while holding the sink lock), so `close()` can cancel and then take
    /// the lock itself without waiting behind a retrying writer.
    pub async fn write(&self, message: Message) -> Result<(), WriteError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(WriteError::Closed);
            }

            let attempt = {
                let mut sink = self.sink.lock().await;
                tokio::time::timeout(WRITE_DEADLINE, sink.send(message.clone())).await
            };

            match attempt {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => {
                    warn!(target: "gateway::session", "write failed for {}: {e}", self.client_id);
                    return Err(WriteError::Socket(Box::new(e)));
                }
                Err(_) => {
                    debug!(target: "gateway::session", "write timed out for {}, retrying", self.client_id);
                    tokio::select! {
                        () = tokio::time::sleep(WRITE_RETRY_INTERVAL) => {}
                        () = self.cancel.cancelled() => return Err(WriteError::Closed),
                    }
                }
            }
        }
    }

    /// Close the session: cancel outstanding waiters, then best-effort send
    /// a close frame. Idempotent.
    pub async fn close(&self, code: u16, reason: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }));
        let mut sink = self.sink.lock().await;
        let _ = tokio::time::timeout(WRITE_DEADLINE, sink.send(frame)).await;
        let _ = sink.close().await;
    }

    /// Periodically send a ping until cancelled.
    pub async fn ping_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(PING_INTERVAL) => {}
                () = self.cancel.cancelled() => return,
            }
            if self.write(Message::Ping(Bytes::new())).await.is_err() {
                return;
            }
        }
    }

    /// Periodically check activity; close the session once it exceeds
    /// `IDLE_TIMEOUT` with no inbound frame or pong.
    pub async fn idle_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {}
                () = self.cancel.cancelled() => return,
            }
            if self.last_seen() >= IDLE_TIMEOUT {
                debug!(target: "gateway::session", "closing idle session {}", self.client_id);
                self.close(1000, "idle timeout").await;
                return;
            }
        }
    }
}
