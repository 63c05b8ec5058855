//! Bus Client (C1): the pub/sub transport between gateway, worker, and
//! presence consumers.
//!
//! `BusClient` is the single seam the rest of the crate depends on; the
//! gateway holds it as `Arc<dyn BusClient>` so [`memory::InMemoryBus`] and
//! [`redis::RedisBus`] are interchangeable without generic plumbing through
//! `Session`, `Registry`, or the handler.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::envelope::Envelope;
use crate::error::{SubscribeError, TransportError};

/// A live subscription: an owned receiver of decoded envelopes.
pub type Subscription = mpsc::UnboundedReceiver<Envelope>;

/// Pub/sub transport used by the gateway, the Response Router, and the
/// demo worker.
///
/// Implementations must retry transient publish failures with exponential
/// backoff (100 ms initial, 5 s cap, 3 attempts — see
/// [`crate::constants`]) and must not return from `subscribe` until the
/// subscription is confirmed active on the broker, so a caller that
/// publishes immediately after subscribing cannot race the broker's own
/// bookkeeping.
#[async_trait]
pub trait BusClient: Send + Sync + std::fmt::Debug {
    /// Publish `envelope` to `channel`, retrying transient failures.
    async fn publish(&self, channel: &str, envelope: Envelope) -> Result<(), TransportError>;

    /// Subscribe to `channel`, returning a receiver of decoded envelopes.
    /// Malformed payloads are logged and dropped rather than surfaced to
    /// the caller, since the contract is a best-effort point-to-point bus.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, SubscribeError>;

    /// Release all resources held by this client. Idempotent.
    async fn close(&self);
}
