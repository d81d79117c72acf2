//! Wire format for the Unix-socket IPC transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single IPC frame, in either direction.
///
/// Requests set `type` to one of the eight supported request types and a
/// generated `id`; responses set `type` to `response`, `ack`, `event`, or
/// `error` and echo the originating `id` as `reply_to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcMessage {
    /// Message kind, e.g. `"spawn_agent"`, `"response"`, `"ack"`, `"event"`, `"error"`.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Arbitrary JSON payload; defaults to an empty object when absent.
    #[serde(default = "default_payload")]
    pub payload: Value,

    /// Opaque message id, required on every frame.
    #[serde(default = "default_id")]
    pub id: String,

    /// UTC timestamp.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// For responses/acks/errors, the `id` of the request this replies to.
    #[serde(default)]
    pub reply_to: Option<String>,
}

fn default_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_id() -> String {
    Uuid::new_v4().to_string()
}

impl IpcMessage {
    /// Build a `response`-typed reply carrying a dispatch result payload.
    #[must_use]
    pub fn response(reply_to: &str, payload: Value) -> Self {
        Self {
            message_type: "response".to_string(),
            payload,
            id: default_id(),
            timestamp: Utc::now(),
            reply_to: Some(reply_to.to_string()),
        }
    }

    /// Build an `ack`-typed reply to a control request (pause/resume/cancel/kill).
    #[must_use]
    pub fn ack(reply_to: &str, payload: Value) -> Self {
        Self {
            message_type: "ack".to_string(),
            payload,
            id: default_id(),
            timestamp: Utc::now(),
            reply_to: Some(reply_to.to_string()),
        }
    }

    /// Build an unsolicited `event`-typed broadcast frame.
    #[must_use]
    pub fn event(event_type: &str, payload: Value) -> Self {
        Self {
            message_type: "event".to_string(),
            payload: serde_json::json!({ "event_type": event_type, "payload": payload }),
            id: default_id(),
            timestamp: Utc::now(),
            reply_to: None,
        }
    }

    /// Build an `error`-typed reply. Malformed input never closes the connection.
    #[must_use]
    pub fn error(message: impl Into<String>, reply_to: Option<String>) -> Self {
        Self {
            message_type: "error".to_string(),
            payload: serde_json::json!({ "message": message.into() }),
            id: default_id(),
            timestamp: Utc::now(),
            reply_to,
        }
    }
}
