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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_payload_round_trips_as_plain_string() {
        let env = Envelope::new("client-1", Payload::Text("hello".into()));
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"client_id":"client-1","data":"hello"}"#);

        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_value_payload_round_trips_as_object() {
        let env = Envelope::new(
            "client-2",
            Payload::Value(serde_json::json!({"users": ["a", "b"]})),
        )
        .with_kind("online_users_list");
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.kind.as_deref(), Some("online_users_list"));
    }

    #[test]
    fn test_missing_client_id_fails_to_decode() {
        let err = serde_json::from_str::<Envelope>(r#"{"data":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_kind_omitted_when_absent() {
        let env = Envelope::new("c", Payload::Text("x".into()));
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("\"type\""));
    }
}
