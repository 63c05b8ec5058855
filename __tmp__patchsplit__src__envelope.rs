//! The wire envelope shared by every bus channel and client connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel names making up the bus contract.
pub mod channels {
    /// Gateway → Worker.
    pub const BACKEND_REQUESTS: &str = "backend-requests";
    /// Worker → Gateway.
    pub const BACKEND_RESPONSES: &str = "backend-responses";
    /// Gateway → any consumer.
    pub const PRESENCE_EVENTS: &str = "presence-events";
}

/// `type` values used on `presence-events`.
pub mod presence {
    pub const USER_CONNECTED: &str = "user_connected";
    pub const USER_DISCONNECTED: &str = "user_disconnected";
}

/// The payload carried by an `Envelope`.
///
/// Client frames arrive as raw text (`Text`); worker output is already
/// structured JSON (`Value`). Both serialize into the same `data` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Value(Value),
}

impl Serialize for Payload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Payload::Text(s) => serializer.serialize_str(s),
            Payload::Value(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => Payload::Text(s),
            other => Payload::Value(other),
        })
    }
}

/// The envelope crossing every bus channel and client connection.
///
/// `client_id` is the only field every producer and consumer must agree on;
/// `kind` (wire name `type`) is free-form and empty for opaque request/
/// response payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub client_id: String,

    pub data: Payload,
}

impl Envelope {
    #[must_use]
    pub fn new(client_id: impl Into<String>, data: Payload) -> Self {
        Self {
            kind: None,
            client_id: client_id.into(),
            data,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Build a presence envelope for `client_id` with the given presence
    /// `type` (see [`presence`]).
    #[must_use]
    pub fn presence(client_id: impl Into<String>, kind: &'static str) -> Self {
        Self::new(client_id, Payload::Value(Value::Null)).with_kind(kind)
    }
}
