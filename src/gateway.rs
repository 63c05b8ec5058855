//! Gateway Handler (C5): the `axum` HTTP surface — the WebSocket upgrade
//! route and (in development only) a token-minting convenience route.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{AuthVerifier, Claims};
use crate::bus::BusClient;
use crate::config::Config;
use crate::constants::PUBLISH_DEADLINE;
use crate::envelope::{channels, presence, Envelope, Payload};
use crate::registry::SessionRegistry;
use crate::session::Session;

/// Shared state every route handler needs.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub bus: Arc<dyn BusClient>,
    pub auth: AuthVerifier,
    pub config: Arc<Config>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

/// Build the gateway's `axum::Router`. Mounts `GET /ws` always, and
/// `GET /token` only when the dev token endpoint is enabled.
#[must_use]
pub fn router(state: AppState) -> Router {
    let mut router = Router::new().route("/ws", get(ws_handler));
    if state.config.dev_token_endpoint_enabled() {
        router = router.route("/token", get(dev_token_handler));
    }
    router.with_state(state)
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    let token = match AuthVerifier::extract_token(query.token.as_deref()) {
        Some(t) => t.to_string(),
        None => {
            return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
        }
    };

    let claims = match state.auth.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(target: "gateway::handler", "rejecting connection: {e}");
            return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_connection(socket, state, claims))
}

async fn handle_connection(socket: WebSocket, state: AppState, claims: Claims) {
    let client_id = claims.sub;
    let (sink, mut stream) = socket.split();
    let session = Session::new(client_id.clone(), sink);

    state.registry.add(session.clone()).await;
    info!(target: "gateway::handler", "{client_id} connected");

    if let Err(e) = state
        .bus
        .publish(
            channels::PRESENCE_EVENTS,
            Envelope::presence(client_id.clone(), presence::USER_CONNECTED),
        )
        .await
    {
        warn!(target: "gateway::handler", "failed to publish connect event for {client_id}: {e}");
    }

    let ping_task = tokio::spawn(Arc::clone(&session).ping_loop());
    let idle_task = tokio::spawn(Arc::clone(&session).idle_loop());
    // Guarantees both background loops are aborted on every exit path out
    // of the read-loop below, including an early `break` or a panic.
    let background_tasks = scopeguard::guard((ping_task, idle_task), |(ping, idle)| {
        ping.abort();
        idle.abort();
    });

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                warn!(target: "gateway::handler", "read error for {client_id}: {e}");
                break;
            }
        };

        session.touch();

        match message {
            Message::Text(text) => {
                let envelope = Envelope::new(client_id.clone(), Payload::Text(text.to_string()));
                spawn_request_publish(&state, client_id.clone(), envelope);
            }
            Message::Binary(data) => {
                // `Payload::Text` carries a `String`; binary frames are
                // base64-encoded and tagged `binary` so a consumer can tell
                // the two apart and decode accordingly.
                let envelope = Envelope::new(client_id.clone(), Payload::Text(BASE64.encode(&data)))
                    .with_kind("binary");
                spawn_request_publish(&state, client_id.clone(), envelope);
            }
            Message::Ping(data) => {
                let _ = session.write(Message::Pong(data)).await;
            }
            Message::Pong(_) => {}
            Message::Close(_) => break,
        }
    }

    drop(background_tasks);
    // Identity-checked: a reconnect may have already installed a new
    // session under this id while this read-loop was winding down.
    state.registry.remove_if_current(&client_id, &session);
    session.close(1000, "connection closed").await;

    if let Err(e) = state
        .bus
        .publish(
            channels::PRESENCE_EVENTS,
            Envelope::presence(client_id.clone(), presence::USER_DISCONNECTED),
        )
        .await
    {
        warn!(target: "gateway::handler", "failed to publish disconnect event for {client_id}: {e}");
    }
    info!(target: "gateway::handler", "{client_id} disconnected");
}

/// Publish one inbound frame to `backend-requests` on its own task, bounded
/// by `PUBLISH_DEADLINE` and tracked via the registry's inflight counter so
/// the Supervisor's shutdown drain actually observes in-flight publishes.
/// Never retried beyond C1's own budget; failure or timeout is logged and
/// never closes the read-loop.
fn spawn_request_publish(state: &AppState, client_id: String, envelope: Envelope) {
    state.registry.inc_inflight();
    let bus = state.bus.clone();
    let registry = state.registry.clone();

    tokio::spawn(async move {
        match tokio::time::timeout(PUBLISH_DEADLINE, bus.publish(channels::BACKEND_REQUESTS, envelope)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(target: "gateway::handler", "failed to publish request for {client_id}: {e}");
            }
            Err(_) => {
                warn!(target: "gateway::handler", "publish timed out for {client_id}");
            }
        }
        registry.dec_inflight();
    });
}

#[derive(Debug, Deserialize)]
struct DevTokenQuery {
    sub: String,
}

/// `GET /token?sub=<id>` — mints a short-lived HS256 token signed with
/// whatever signing key the gateway is configured with. Only mounted in
/// development; never exposed against the production signing key.
async fn dev_token_handler(
    State(state): State<AppState>,
    Query(query): Query<DevTokenQuery>,
) -> axum::response::Response {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let claims = Claims {
        sub: query.sub,
        iat: now,
        exp: now + 3600,
    };

    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
    let key = jsonwebtoken::EncodingKey::from_secret(state.config.signing_key.as_bytes());
    match jsonwebtoken::encode(&header, &claims, &key) {
        Ok(token) => Json(json!({ "token": token })).into_response(),
        Err(e) => {
            warn!(target: "gateway::handler", "failed to mint dev token: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to mint token").into_response()
        }
    }
}
