//! Production `BusClient` over Redis pub/sub.
//!
//! Mirrors `original_source/websocket-pooler/broker/redis.go`: publish
//! retries transient connection failures with exponential backoff, and
//! `subscribe` only returns once Redis has replied to the `SUBSCRIBE`
//! command, which is itself the broker's ack that the subscription is
//! active.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use log::warn;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;

use super::{BusClient, Subscription};
use crate::constants::{PUBLISH_MAX_RETRIES, PUBLISH_RETRY_CAP, PUBLISH_RETRY_INITIAL};
use crate::envelope::Envelope;
use crate::error::{SubscribeError, TransportError};

/// Redis-backed bus client.
///
/// Holds one `ConnectionManager` reused across every `publish` call — it
/// multiplexes commands over a single connection and reconnects on its own,
/// so publish only needs to retry the command itself, not re-dial Redis on
/// every frame. `subscribe` still opens a dedicated pub/sub connection per
/// call, since a subscribed connection cannot also run ordinary commands.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus").finish_non_exhaustive()
    }
}

impl RedisBus {
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let client = redis::Client::open(addr)
            .map_err(|e| TransportError::Transport(Box::new(e)))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| TransportError::Transport(Box::new(e)))?;
        Ok(Self { client, manager })
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let scaled = PUBLISH_RETRY_INITIAL.saturating_mul(1u32 << attempt.min(16));
        scaled.min(PUBLISH_RETRY_CAP)
    }
}

#[async_trait]
impl BusClient for RedisBus {
    async fn publish(&self, channel: &str, envelope: Envelope) -> Result<(), TransportError> {
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| TransportError::Transport(Box::new(e)))?;

        let mut conn = self.manager.clone();
        let mut last_err: Option<redis::RedisError> = None;
        for attempt in 0..=PUBLISH_MAX_RETRIES {
            match conn.publish::<_, _, i64>(channel, &payload).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < PUBLISH_MAX_RETRIES {
                        let delay = Self::backoff_delay(attempt);
                        warn!(target: "gateway::bus::redis", "publish to {channel} failed (attempt {attempt}), retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(TransportError::PublishFailed {
            channel: channel.to_string(),
            attempts: PUBLISH_MAX_RETRIES + 1,
            source: Box::new(last_err.expect("loop always sets last_err before exiting")),
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, SubscribeError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| SubscribeError::Failed(channel.to_string(), Box::new(e)))?;

        // `subscribe` on the pubsub connection only returns once Redis has
        // replied to the SUBSCRIBE command, which is itself the broker's
        // ack that the subscription is active — no separate round trip
        // needed before handing the subscription back to the caller.
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| SubscribeError::Failed(channel.to_string(), Box::new(e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let channel_name = channel.to_string();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(target: "gateway::bus::redis", "non-string payload on {channel_name}: {e}");
                        continue;
                    }
                };
                match serde_json::from_str::<Envelope>(&payload) {
                    Ok(envelope) => {
                        if tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(target: "gateway::bus::redis", "dropping malformed envelope on {channel_name}: {e}");
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn close(&self) {
        // `redis::Client` connections are dropped with their owning tasks;
        // nothing to explicitly tear down here.
    }
}
