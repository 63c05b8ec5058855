//! In-process `BusClient` backed by `tokio::sync::broadcast`.
//!
//! Used by the test suite and by the demo worker's "local" mode. There is
//! nothing transient to retry here, so `publish` never fails for
//! transport reasons; it only fails if the channel has no subscribers yet
//! and the caller cares (it doesn't — a channel with no receivers simply
//! drops the message, matching at-most-once bus semantics).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::trace;
use tokio::sync::{broadcast, mpsc};

use super::{BusClient, Subscription};
use crate::envelope::Envelope;
use crate::error::{SubscribeError, TransportError};

const CHANNEL_CAPACITY: usize = 1024;

/// In-memory pub/sub bus. Cheap to clone; channels live for the lifetime
/// of the `InMemoryBus` instance they were created through.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    channels: Arc<DashMap<String, broadcast::Sender<Envelope>>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<Envelope> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl BusClient for InMemoryBus {
    async fn publish(&self, channel: &str, envelope: Envelope) -> Result<(), TransportError> {
        let sender = self.sender_for(channel);
        // No subscribers is not an error: matches a broker where the
        // message is delivered to whoever happens to be listening.
        let _ = sender.send(envelope);
        trace!(target: "gateway::bus::memory", "published to {channel}");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, SubscribeError> {
        let sender = self.sender_for(channel);
        let mut broadcast_rx = sender.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(envelope) => {
                        if tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!(target: "gateway::bus::memory", "subscriber lagged, skipped {skipped} messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }

    async fn close(&self) {
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;

    #[tokio::test]
    async fn test_publish_then_subscribe_does_not_see_old_messages() {
        let bus = InMemoryBus::new();
        bus.publish("ch", Envelope::new("c1", Payload::Text("before".into())))
            .await
            .unwrap();

        let mut sub = bus.subscribe("ch").await.unwrap();
        bus.publish("ch", Envelope::new("c1", Payload::Text("after".into())))
            .await
            .unwrap();

        let received = sub.recv().await.unwrap();
        assert_eq!(received.data, Payload::Text("after".into()));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_get_the_message() {
        let bus = InMemoryBus::new();
        let mut sub_a = bus.subscribe("ch").await.unwrap();
        let mut sub_b = bus.subscribe("ch").await.unwrap();

        bus.publish("ch", Envelope::new("c1", Payload::Text("hi".into())))
            .await
            .unwrap();

        assert_eq!(sub_a.recv().await.unwrap().data, Payload::Text("hi".into()));
        assert_eq!(sub_b.recv().await.unwrap().data, Payload::Text("hi".into()));
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers_does_not_error() {
        let bus = InMemoryBus::new();
        let result = bus
            .publish("ch", Envelope::new("c1", Payload::Text("hi".into())))
            .await;
        assert!(result.is_ok());
    }
}
