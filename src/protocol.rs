//! Wire message types for the event channel.
//!
//! Every frame is a JSON text message. Three shapes exist:
//!
//! Plain event (both directions):
//! ```json
//! { "event": "chat.message", "payload": { ... } }
//! ```
//!
//! Ack-style request (outbound):
//! ```json
//! { "event": "chat.send", "payload": { ... }, "correlationId": "uuid" }
//! ```
//!
//! Ack response (inbound):
//! ```json
//! { "correlationId": "uuid", "result": { ... } }
//! { "correlationId": "uuid", "error": "message" }
//! ```
//!
//! Matching is strictly by correlation id, never by arrival order, so
//! responses to distinct outstanding requests may arrive reordered.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

// ============================================================================
// EventFrame
// ============================================================================

/// A fire-and-forget event frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name.
    pub event: String,

    /// Event payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl EventFrame {
    /// Creates a new event frame.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

// ============================================================================
// AckRequest
// ============================================================================

/// An event frame carrying a correlation id, expecting an [`AckResponse`].
#[derive(Debug, Clone, Serialize)]
pub struct AckRequest {
    /// Event name.
    pub event: String,

    /// Event payload.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,

    /// Unique id pairing this request with its response.
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,
}

impl AckRequest {
    /// Creates a new ack request with a freshly generated correlation id.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            correlation_id: CorrelationId::generate(),
        }
    }
}

// ============================================================================
// AckResponse
// ============================================================================

/// The peer's response to an [`AckRequest`].
///
/// Exactly one of `result` and `error` is meaningful; an `error` string wins
/// when both are present. Unknown fields are rejected so that a named event
/// carrying a stray `correlationId` still routes through the event path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AckResponse {
    /// Matches the request's correlation id.
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,

    /// Result data (if success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error message (if failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckResponse {
    /// Extracts the result value, returning an error if the peer reported one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the response carries an error field.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(message) => Err(Error::remote(message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Any frame the peer may send.
///
/// An [`AckResponse`] has a mandatory `correlationId` and no `event`, so the
/// untagged representation tries it first and falls back to a plain event.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    /// Response to an outstanding ack request.
    Ack(AckResponse),
    /// Ordinary named event.
    Event(EventFrame),
}

impl Inbound {
    /// Parses an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not one of the known shapes.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_event_frame_serialization() {
        let frame = EventFrame::new("chat.message", json!({"text": "hi"}));
        let text = serde_json::to_string(&frame).expect("serialize");

        assert!(text.contains("\"event\":\"chat.message\""));
        assert!(text.contains("\"payload\""));
        assert!(!text.contains("correlationId"));
    }

    #[test]
    fn test_event_frame_null_payload_omitted() {
        let frame = EventFrame::new("tick", Value::Null);
        let text = serde_json::to_string(&frame).expect("serialize");
        assert_eq!(text, "{\"event\":\"tick\"}");
    }

    #[test]
    fn test_ack_request_serialization() {
        let req = AckRequest::new("chat.send", json!({"text": "hi"}));
        let text = serde_json::to_string(&req).expect("serialize");

        assert!(text.contains("\"correlationId\""));
        assert!(text.contains(&req.correlation_id.to_string()));
    }

    #[test]
    fn test_ack_response_result() {
        let id = CorrelationId::generate();
        let text = format!("{{\"correlationId\":\"{id}\",\"result\":{{\"ok\":true}}}}");

        let resp: AckResponse = serde_json::from_str(&text).expect("parse");
        assert_eq!(resp.correlation_id, id);

        let value = resp.into_result().expect("success");
        assert_eq!(value, json!({"ok": true}));
    }

    #[test]
    fn test_ack_response_error() {
        let id = CorrelationId::generate();
        let text = format!("{{\"correlationId\":\"{id}\",\"error\":\"denied\"}}");

        let resp: AckResponse = serde_json::from_str(&text).expect("parse");
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Remote error: denied");
    }

    #[test]
    fn test_ack_response_empty_result_is_null() {
        let id = CorrelationId::generate();
        let text = format!("{{\"correlationId\":\"{id}\"}}");

        let resp: AckResponse = serde_json::from_str(&text).expect("parse");
        assert_eq!(resp.into_result().expect("success"), Value::Null);
    }

    #[test]
    fn test_inbound_discriminates_ack() {
        let id = CorrelationId::generate();
        let text = format!("{{\"correlationId\":\"{id}\",\"result\":1}}");

        match Inbound::parse(&text).expect("parse") {
            Inbound::Ack(ack) => assert_eq!(ack.correlation_id, id),
            Inbound::Event(_) => panic!("parsed as event"),
        }
    }

    #[test]
    fn test_inbound_discriminates_event() {
        let text = "{\"event\":\"presence.join\",\"payload\":{\"user\":\"a\"}}";

        match Inbound::parse(text).expect("parse") {
            Inbound::Event(ev) => assert_eq!(ev.event, "presence.join"),
            Inbound::Ack(_) => panic!("parsed as ack"),
        }
    }

    #[test]
    fn test_inbound_event_with_stray_correlation_field() {
        let text = "{\"event\":\"rpc.call\",\"payload\":{},\
                    \"correlationId\":\"550e8400-e29b-41d4-a716-446655440000\"}";

        // The `event` field disqualifies the ack arm.
        match Inbound::parse(text).expect("parse") {
            Inbound::Event(ev) => assert_eq!(ev.event, "rpc.call"),
            Inbound::Ack(_) => panic!("parsed as ack"),
        }
    }

    #[test]
    fn test_inbound_rejects_garbage() {
        assert!(Inbound::parse("[1,2,3]").is_err());
        assert!(Inbound::parse("not json").is_err());
    }
}
