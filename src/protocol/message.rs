//! Bridge wire message.
//!
//! Every frame is a JSON object with a `type`, an optional `id` and any
//! number of payload fields at the top level.
//!
//! ```json
//! { "type": "tally_request", "id": "7f3c...", "action": "ledgers", "company": "Acme Corp" }
//! ```
//!
//! `id` is present only on correlated request/response pairs. Replies to a
//! correlated message echo its `id`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::identifiers::CorrelationId;

// ============================================================================
// Message Kinds
// ============================================================================

/// Known values of the `type` field.
pub mod kinds {
    /// Client → relay handshake after open.
    pub const BRIDGE_READY: &str = "bridge_ready";
    /// Keepalive probe, either direction.
    pub const PING: &str = "ping";
    /// Keepalive answer.
    pub const PONG: &str = "pong";
    /// Relay asks for the local connectivity snapshot.
    pub const STATUS: &str = "status";
    /// Snapshot answer.
    pub const STATUS_RESPONSE: &str = "status_response";
    /// Relayed gateway call.
    pub const TALLY_REQUEST: &str = "tally_request";
    /// Result of a relayed gateway call.
    pub const TALLY_RESPONSE: &str = "tally_response";
}

// ============================================================================
// LocalStatus
// ============================================================================

/// Local gateway connectivity as reported to the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalStatus {
    /// Whether the local gateway answered its last probe.
    pub tally_connected: bool,
    /// Gateway address in use.
    pub tally_url: String,
}

// ============================================================================
// Message
// ============================================================================

/// One bridge frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Correlation id, present only on request/response pairs.
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<CorrelationId>,

    /// Remaining top-level fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Message {
    /// Creates an uncorrelated message with an empty payload.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            payload: Map::new(),
        }
    }

    /// Sets the correlation id.
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: CorrelationId) -> Self {
        self.id = Some(id);
        self
    }

    /// Adds a payload field.
    #[inline]
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Creates a reply of `kind` that echoes this message's id.
    #[must_use]
    pub fn reply(&self, kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: self.id.clone(),
            payload: Map::new(),
        }
    }

    /// Returns `true` if the message has the given type.
    #[inline]
    #[must_use]
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Gets a string payload field.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Gets a boolean payload field, `false` if absent.
    #[inline]
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.payload
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or_default()
    }

    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the frame is not a message object.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serializes to a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Built-in Messages
// ============================================================================

impl Message {
    /// Handshake sent right after the channel opens.
    #[must_use]
    pub fn bridge_ready(status: &LocalStatus) -> Self {
        Self::new(kinds::BRIDGE_READY)
            .with_field("tally_connected", status.tally_connected)
            .with_field("tally_url", status.tally_url.clone())
    }

    /// Client keepalive probe.
    #[must_use]
    pub fn ping() -> Self {
        Self::new(kinds::PING)
    }

    /// Answer to `ping`.
    #[must_use]
    pub fn pong_to(ping: &Self) -> Self {
        ping.reply(kinds::PONG)
    }

    /// Answer to `status` with the local snapshot.
    #[must_use]
    pub fn status_response_to(request: &Self, status: &LocalStatus, bridge_state: &str) -> Self {
        request
            .reply(kinds::STATUS_RESPONSE)
            .with_field("tally_connected", status.tally_connected)
            .with_field("tally_url", status.tally_url.clone())
            .with_field("bridge_state", bridge_state)
    }
}

/// Accepts string or numeric ids; anything else is treated as absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<CorrelationId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) => Some(CorrelationId::from(id)),
        Some(Value::Number(id)) => Some(CorrelationId::from(id.to_string())),
        _ => None,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_uncorrelated_message_has_no_id_field() {
        let json = Message::ping().to_json().expect("serialize");
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_payload_is_flattened() {
        let message = Message::new(kinds::TALLY_REQUEST)
            .with_id(CorrelationId::from("r1"))
            .with_field("action", "ledgers");
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            value,
            json!({"type": "tally_request", "id": "r1", "action": "ledgers"})
        );
    }

    #[test]
    fn test_parse_with_numeric_id() {
        let message = Message::from_json(r#"{"type":"status","id":42}"#).expect("parse");
        assert_eq!(message.id, Some(CorrelationId::from("42")));
        assert!(message.is(kinds::STATUS));
    }

    #[test]
    fn test_parse_without_type_fails() {
        assert!(Message::from_json(r#"{"id":"x"}"#).is_err());
        assert!(Message::from_json("not json").is_err());
    }

    #[test]
    fn test_bridge_ready_fields() {
        let status = LocalStatus {
            tally_connected: true,
            tally_url: "http://localhost:9000".into(),
        };
        let message = Message::bridge_ready(&status);
        assert!(message.get_bool("tally_connected"));
        assert_eq!(message.get_str("tally_url"), Some("http://localhost:9000"));
        assert!(message.id.is_none());
    }

    #[test]
    fn test_replies_echo_id() {
        let ping = Message::ping().with_id(CorrelationId::from("p1"));
        assert_eq!(Message::pong_to(&ping).id, ping.id);

        let status = Message::new(kinds::STATUS).with_id(CorrelationId::from("s1"));
        let reply = Message::status_response_to(&status, &LocalStatus::default(), "connected");
        assert_eq!(reply.id, Some(CorrelationId::from("s1")));
        assert_eq!(reply.get_str("bridge_state"), Some("connected"));
        assert!(!reply.get_bool("tally_connected"));
    }
}
