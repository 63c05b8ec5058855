//! Demo worker: a minimal peer exercising the gateway's bus contract.
//!
//! Grounded in `backend/handlers.go` and `backend/event.go` of the original
//! system. Not part of the gateway's core — it exists so the round-trip
//! scenarios (echo, `get_online_users`, presence tracking) are testable
//! end to end against a real peer.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use serde::Deserialize;
use tokio::sync::Mutex;

use ws_pooler_gateway::bus::memory::InMemoryBus;
use ws_pooler_gateway::bus::redis::RedisBus;
use ws_pooler_gateway::bus::BusClient;
use ws_pooler_gateway::envelope::{channels, presence, Envelope, Payload};

#[derive(Debug, Parser)]
#[command(name = "worker")]
#[command(about = "Demo backend worker for the gateway's pub/sub bus")]
struct Args {
    /// "memory" to attach to an in-process bus (only useful for tests run
    /// in the same binary), "redis" for the production backend.
    #[arg(long, default_value = "redis", env = "GATEWAY_BUS_BACKEND")]
    backend: String,

    #[arg(long, default_value = "redis://127.0.0.1:6379", env = "GATEWAY_BUS_ADDR")]
    bus_addr: String,
}

#[derive(Debug, Default)]
struct OnlineUsers {
    users: Mutex<HashSet<String>>,
}

impl OnlineUsers {
    async fn add(&self, client_id: &str) {
        self.users.lock().await.insert(client_id.to_string());
    }

    async fn remove(&self, client_id: &str) {
        self.users.lock().await.remove(client_id);
    }

    async fn list(&self) -> Vec<String> {
        self.users.lock().await.iter().cloned().collect()
    }
}

#[derive(Debug, Deserialize)]
struct RequestPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bus: Arc<dyn BusClient> = if args.backend == "memory" {
        Arc::new(InMemoryBus::new())
    } else {
        Arc::new(RedisBus::connect(&args.bus_addr).await?)
    };

    let store = Arc::new(OnlineUsers::default());

    let requests = tokio::spawn(listen_for_requests(bus.clone(), store.clone()));
    let presence_events = tokio::spawn(listen_for_presence(bus.clone(), store.clone()));

    let _ = tokio::join!(requests, presence_events);
    Ok(())
}

async fn listen_for_requests(bus: Arc<dyn BusClient>, store: Arc<OnlineUsers>) {
    let mut subscription = match bus.subscribe(channels::BACKEND_REQUESTS).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!("failed to subscribe to {}: {e}", channels::BACKEND_REQUESTS);
            return;
        }
    };
    info!("subscribed to '{}'", channels::BACKEND_REQUESTS);

    while let Some(envelope) = subscription.recv().await {
        let Payload::Text(ref text) = envelope.data else {
            // Already-structured payloads arrive only on backend-responses
            // in this system; echo anything unexpected here unchanged.
            publish_response(&bus, &envelope.client_id, envelope.data.clone()).await;
            continue;
        };

        let payload: Option<RequestPayload> = serde_json::from_str(text).ok();
        match payload.and_then(|p| p.kind) {
            Some(kind) if kind == "get_online_users" => {
                info!("handling get_online_users for {}", envelope.client_id);
                let users = store.list().await;
                let response = serde_json::json!({ "type": "online_users_list", "users": users });
                publish_response(&bus, &envelope.client_id, Payload::Value(response)).await;
            }
            Some(kind) => {
                info!("unknown request type '{kind}', echoing back");
                publish_response(&bus, &envelope.client_id, envelope.data.clone()).await;
            }
            None => {
                info!("message is not structured JSON, echoing back");
                publish_response(&bus, &envelope.client_id, envelope.data.clone()).await;
            }
        }
    }
}

async fn publish_response(bus: &Arc<dyn BusClient>, client_id: &str, data: Payload) {
    let envelope = Envelope::new(client_id, data);
    if let Err(e) = bus.publish(channels::BACKEND_RESPONSES, envelope).await {
        warn!("failed to publish response for {client_id}: {e}");
    }
}

async fn listen_for_presence(bus: Arc<dyn BusClient>, store: Arc<OnlineUsers>) {
    let mut subscription = match bus.subscribe(channels::PRESENCE_EVENTS).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!("failed to subscribe to {}: {e}", channels::PRESENCE_EVENTS);
            return;
        }
    };
    info!("subscribed to '{}'", channels::PRESENCE_EVENTS);

    while let Some(envelope) = subscription.recv().await {
        match envelope.kind.as_deref() {
            Some(presence::USER_CONNECTED) => {
                info!("user connected: {}", envelope.client_id);
                store.add(&envelope.client_id).await;
            }
            Some(presence::USER_DISCONNECTED) => {
                info!("user disconnected: {}", envelope.client_id);
                store.remove(&envelope.client_id).await;
            }
            other => warn!("unknown presence event type: {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_online_users_add_remove_is_idempotent() {
        let store = OnlineUsers::default();
        store.add("a").await;
        store.add("a").await;
        assert_eq!(store.list().await, vec!["a".to_string()]);

        store.remove("a").await;
        store.remove("a").await;
        assert!(store.list().await.is_empty());
    }
}
