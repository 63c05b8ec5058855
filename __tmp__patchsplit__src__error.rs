//! Typed error taxonomy for the gateway's components.
//!
//! Each component that can fail exposes its own `thiserror` enum; `anyhow` is
//! reserved for the outermost binary boundary (`main.rs`, `Supervisor`)
//! where errors are only ever logged and turned into an exit code.

use thiserror::Error;

/// Errors from the Auth Verifier (C4).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),

    #[error("token expired")]
    Expired,

    #[error("empty subject claim")]
    EmptySubject,

    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,
}

/// Errors from the Bus Client (C1) publish/subscribe path.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("publish to {channel} failed after {attempts} attempts: {source}")]
    PublishFailed {
        channel: String,
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("bus connection closed")]
    Closed,

    #[error("underlying transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from establishing a bus subscription.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("subscribe to {0} failed: {1}")]
    Failed(String, #[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("subscribe ack timed out for channel {0}")]
    AckTimeout(String),
}

/// Errors writing a frame to a client connection (Session, C2).
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write deadline exceeded")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("underlying socket error: {0}")]
    Socket(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors decoding an `Envelope` off the bus or the wire.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("missing required field `client_id`")]
    MissingClientId,
}


