//! Response Router (C6): subscribes to `backend-responses` and dispatches
//! each envelope to the session matching its `client_id`. A write failure
//! closes the offending session with `INTERNAL_ERR` (1011) and removes it
//! from the registry; other sessions are unaffected.

use std::sync::Arc;

use axum::extract::ws::Message;
use log::{debug, warn};

use crate::bus::BusClient;
use crate::envelope::{channels, Payload};
use crate::registry::SessionRegistry;

/// Runs until the bus subscription ends (broker shutdown or `close()`).
/// Intended to be spawned once by the Supervisor.
pub async fn run(bus: Arc<dyn BusClient>, registry: Arc<SessionRegistry>) {
    let mut subscription = match bus.subscribe(channels::BACKEND_RESPONSES).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(target: "gateway::router", "failed to subscribe to {}: {e}", channels::BACKEND_RESPONSES);
            return;
        }
    };

    while let Some(envelope) = subscription.recv().await {
        let Some(session) = registry.get(&envelope.client_id) else {
            debug!(target: "gateway::router", "dropping response for unknown client {}", envelope.client_id);
            continue;
        };

        let message = match envelope.data {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Value(value) => match serde_json::to_string(&value) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => {
                    warn!(target: "gateway::router", "failed to encode response for {}: {e}", envelope.client_id);
                    continue;
                }
            },
        };

        if let Err(e) = session.write(message).await {
            warn!(target: "gateway::router", "failed to deliver response to {}: {e}, closing session", envelope.client_id);
            session.close(1011, "internal error").await;
            // Identity-checked: a reconnect may have already installed a new
            // session under this id between the `get` above and now.
            registry.remove_if_current(&envelope.client_id, &session);
        }
    }

    debug!(target: "gateway::router", "response subscription ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::InMemoryBus;
    use crate::envelope::Envelope;

    #[tokio::test]
    async fn test_drops_response_for_unknown_client() {
        let bus: Arc<dyn BusClient> = Arc::new(InMemoryBus::new());
        let registry = SessionRegistry::new();

        let router_bus = bus.clone();
        let router_registry = registry.clone();
        let handle = tokio::spawn(run(router_bus, router_registry));

        // Give the router a moment to subscribe before publishing.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        bus.publish(
            channels::BACKEND_RESPONSES,
            Envelope::new("ghost", Payload::Text("hi".into())),
        )
        .await
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(registry.len(), 0);
        handle.abort();
    }
}
