//! Supervisor (C7): startup orchestration and graceful shutdown.
//!
//! Shutdown sequence on `SIGINT`/`SIGTERM`:
//! 1. Stop accepting new connections (drop the listener).
//! 2. Broadcast a close frame to every registered session.
//! 3. Wait up to `SHUTDOWN_DEADLINE` for in-flight handshakes/publishes to
//!    drain.
//! 4. Close the bus client and exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use tokio::net::TcpListener;

use crate::bus::BusClient;
use crate::config::Config;
use crate::constants::SHUTDOWN_DEADLINE;
use crate::gateway::{self, AppState};
use crate::registry::SessionRegistry;

/// Runs the gateway until a shutdown signal arrives, then drains and
/// exits. Returns once shutdown is complete.
pub async fn run(config: Config, bus: Arc<dyn BusClient>) -> anyhow::Result<()> {
    let registry = SessionRegistry::new();
    let auth = crate::auth::AuthVerifier::new(config.signing_key.as_bytes());
    let config = Arc::new(config);

    let state = AppState {
        registry: registry.clone(),
        bus: bus.clone(),
        auth,
        config: config.clone(),
    };

    let router_handle = tokio::spawn(crate::router::run(bus.clone(), registry.clone()));

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(target: "gateway::supervisor", "listening on {}", config.listen_addr);

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    flag::register(SIGINT, Arc::clone(&shutdown_flag))?;
    flag::register(SIGTERM, Arc::clone(&shutdown_flag))?;

    let app = gateway::router(state);
    let server = axum::serve(listener, app).with_graceful_shutdown(wait_for_flag(shutdown_flag.clone()));

    server.await?;

    info!(target: "gateway::supervisor", "listener stopped, closing {} active session(s)", registry.len());
    registry.broadcast_close(1001, "server shutting down").await;

    if !registry.wait_drain(SHUTDOWN_DEADLINE).await {
        warn!(target: "gateway::supervisor", "shutdown deadline exceeded with {} operation(s) still in flight", registry.inflight_count());
    }

    router_handle.abort();
    bus.close().await;

    info!(target: "gateway::supervisor", "shutdown complete");
    Ok(())
}

async fn wait_for_flag(flag: Arc<AtomicBool>) {
    loop {
        if flag.load(Ordering::Relaxed) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}


