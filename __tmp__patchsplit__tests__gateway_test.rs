//! End-to-end tests driving the gateway as a real WebSocket client, over
//! the in-memory bus, against an `axum` server bound to an ephemeral port.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use tokio::net::TcpListener;

use ws_pooler_gateway::auth::{AuthVerifier, Claims};
use ws_pooler_gateway::bus::memory::InMemoryBus;
use ws_pooler_gateway::bus::BusClient;
use ws_pooler_gateway::config::{BusBackend, Config};
use ws_pooler_gateway::envelope::{channels, presence, Envelope, Payload};
use ws_pooler_gateway::gateway::{router, AppState};
use ws_pooler_gateway::registry::SessionRegistry;
use ws_pooler_gateway::ws::{self, WsMessage};

const SIGNING_KEY: &[u8] = b"integration-test-signing-key";

fn token_for(sub: &str) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let claims = Claims {
        sub: sub.to_string(),
        iat: now,
        exp: now + 3600,
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SIGNING_KEY)).unwrap()
}

async fn spawn_server() -> (String, Arc<InMemoryBus>, Arc<SessionRegistry>) {
    let bus = Arc::new(InMemoryBus::new());
    let registry = SessionRegistry::new();
    let config = Arc::new(Config {
        listen_addr: "127.0.0.1:0".to_string(),
        bus_backend: BusBackend::Memory,
        bus_addr: String::new(),
        signing_key: String::from_utf8_lossy(SIGNING_KEY).to_string(),
        environment: ws_pooler_gateway::env::Environment::Production,
    });

    let state = AppState {
        registry: registry.clone(),
        bus: bus.clone() as Arc<dyn BusClient>,
        auth: AuthVerifier::new(SIGNING_KEY),
        config,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("ws://{addr}/ws", addr = addr), bus, registry)
}

#[tokio::test]
async fn test_connect_requires_bearer_token() {
    let (url, ..) = spawn_server().await;
    let result = ws::connect(&url, &[]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_connect_rejects_expired_token() {
    let (url, ..) = spawn_server().await;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let claims = Claims {
        sub: "client-1".to_string(),
        iat: now - 7200,
        exp: now - 3600,
    };
    let expired = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SIGNING_KEY)).unwrap();

    let auth_header = format!("Bearer {expired}");
    let result = ws::connect(&url, &[("Authorization", &auth_header)]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_connect_with_valid_token_succeeds_and_publishes_presence() {
    let (url, bus, _registry) = spawn_server().await;
    let mut presence_sub = bus.subscribe(channels::PRESENCE_EVENTS).await.unwrap();

    let token = token_for("client-1");
    let auth_header = format!("Bearer {token}");
    let (_writer, _reader) = ws::connect(&url, &[("Authorization", &auth_header)]).await.unwrap();

    let event = presence_sub.recv().await.unwrap();
    assert_eq!(event.client_id, "client-1");
    assert_eq!(event.kind.as_deref(), Some(presence::USER_CONNECTED));
}

#[tokio::test]
async fn test_text_frame_is_published_to_backend_requests() {
    let (url, bus, _registry) = spawn_server().await;
    let mut requests_sub = bus.subscribe(channels::BACKEND_REQUESTS).await.unwrap();

    let token = token_for("client-2");
    let auth_header = format!("Bearer {token}");
    let (mut writer, _reader) = ws::connect(&url, &[("Authorization", &auth_header)]).await.unwrap();

    writer.send_text("hello world").await.unwrap();

    let envelope = requests_sub.recv().await.unwrap();
    assert_eq!(envelope.client_id, "client-2");
    assert_eq!(envelope.data, Payload::Text("hello world".to_string()));
}

#[tokio::test]
async fn test_worker_response_is_delivered_to_matching_client() {
    let (url, bus, registry) = spawn_server().await;

    let token = token_for("client-3");
    let auth_header = format!("Bearer {token}");
    let (_writer, mut reader) = ws::connect(&url, &[("Authorization", &auth_header)]).await.unwrap();

    // Wait until the session is actually registered before routing a
    // response at it, otherwise the router would (correctly) drop it.
    for _ in 0..50 {
        if registry.get("client-3").is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let router_bus = bus.clone() as Arc<dyn BusClient>;
    let router_registry = registry.clone();
    tokio::spawn(ws_pooler_gateway::router::run(router_bus, router_registry));

    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = Envelope::new(
        "client-3",
        Payload::Value(serde_json::json!({"type": "online_users_list", "users": ["client-3"]})),
    );
    bus.publish(channels::BACKEND_RESPONSES, response).await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), reader.recv())
        .await
        .expect("timed out waiting for routed response")
        .expect("stream ended")
        .unwrap();

    match message {
        WsMessage::Text(text) => {
            let value: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "online_users_list");
        }
        other => panic!("expected a text frame, got {other:?}"),
    }
}

