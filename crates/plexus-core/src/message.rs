//! The bus message model.
//!
//! A [`Message`] is a plain value: it is created by a sender, routed by the
//! bus, consumed by handlers and then discarded. Nothing in Plexus persists
//! messages, but the type is serde-serializable so hosts can log or inspect
//! them in the same camelCase JSON shape plugins already speak.
//!
//! ```text
//! Request  ── to: "p1", correlationId: c ──▶  handler on p1
//! Response ◀─ to: sender, correlationId: c ──  (built by the bus)
//! Event / Broadcast ── to: "" ──▶ every running plugin except the sender
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BusError, BusResult};

/// Unordered key → value payload carried by every message.
pub type Payload = Map<String, Value>;

/// Generates a fresh, unique message identifier.
///
/// Also used for correlation IDs.
pub fn generate_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

// =============================================================================
// MessageType
// =============================================================================

/// The routing class of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Addressed to one plugin; answered with a [`Response`](Self::Response).
    Request,
    /// Answer to a request, matched only by correlation ID.
    Response,
    /// Fanned out to every running plugin except the sender.
    Event,
    /// Same delivery semantics as [`Event`](Self::Event).
    Broadcast,
}

impl MessageType {
    /// Returns the lowercase name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Event => "event",
            Self::Broadcast => "broadcast",
        }
    }

    /// Whether messages of this type must name a target plugin.
    pub fn is_addressed(&self) -> bool {
        matches!(self, Self::Request | Self::Response)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Fault
// =============================================================================

/// Why the bus answered a request on the handler's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// No handler of the target plugin accepts the subject.
    Unsupported,
    /// The selected handler returned an error.
    HandlerFailed,
}

/// Failure marker attached to responses synthesized by the bus.
///
/// Only present when the bus is configured to answer unroutable or failed
/// requests instead of dropping them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// The failure class.
    pub kind: FaultKind,
    /// Human-readable detail.
    pub message: String,
}

impl Fault {
    /// Converts this fault into the error surfaced to the requester.
    pub fn into_error(self, plugin_id: &str, subject: &str) -> BusError {
        match self.kind {
            FaultKind::Unsupported => BusError::Unsupported {
                plugin_id: plugin_id.to_string(),
                subject: subject.to_string(),
            },
            FaultKind::HandlerFailed => BusError::Handler {
                plugin_id: plugin_id.to_string(),
                reason: self.message,
            },
        }
    }
}

// =============================================================================
// Message
// =============================================================================

/// One unit of communication on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique per message instance.
    pub id: String,
    /// Routing class.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Sender plugin ID.
    pub from: String,
    /// Target plugin ID; empty for events and broadcasts.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
    /// Routing key handlers match against.
    pub subject: String,
    /// Message body.
    #[serde(default)]
    pub payload: Payload,
    /// Set when the message is accepted by the bus. RFC 3339 in JSON.
    pub timestamp: DateTime<Utc>,
    /// Binds a response to its request.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    /// Alternate address for the response to a request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Absolute deadline after which the message is no longer valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Present on bus-synthesized failure responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

impl Message {
    /// Creates a message with a fresh ID and the current timestamp.
    pub fn new(
        kind: MessageType,
        from: impl Into<String>,
        subject: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id: generate_message_id(),
            kind,
            from: from.into(),
            to: String::new(),
            subject: subject.into(),
            payload,
            timestamp: Utc::now(),
            correlation_id: String::new(),
            reply_to: None,
            expires_at: None,
            fault: None,
        }
    }

    /// Creates a request addressed to `to` under `correlation_id`.
    pub fn request(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        payload: Payload,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self::new(MessageType::Request, from, subject, payload)
            .with_to(to)
            .with_correlation_id(correlation_id)
    }

    /// Creates a response to `to` under `correlation_id`.
    ///
    /// Handlers rarely need this; the bus builds responses with
    /// [`response_to`](Self::response_to).
    pub fn response(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        payload: Payload,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self::new(MessageType::Response, from, subject, payload)
            .with_to(to)
            .with_correlation_id(correlation_id)
    }

    /// Creates an event.
    pub fn event(from: impl Into<String>, subject: impl Into<String>, payload: Payload) -> Self {
        Self::new(MessageType::Event, from, subject, payload)
    }

    /// Creates a broadcast.
    pub fn broadcast(
        from: impl Into<String>,
        subject: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self::new(MessageType::Broadcast, from, subject, payload)
    }

    /// Builds the response to `request`.
    ///
    /// The correlation ID and subject are copied; sender and target are
    /// swapped, unless the request names a `reply_to` address.
    pub fn response_to(request: &Message, payload: Payload) -> Self {
        let to = request
            .reply_to
            .clone()
            .unwrap_or_else(|| request.from.clone());
        Self::new(
            MessageType::Response,
            request.to.clone(),
            request.subject.clone(),
            payload,
        )
        .with_to(to)
        .with_correlation_id(request.correlation_id.clone())
    }

    /// Builds a failure response to `request` carrying `fault`.
    pub fn fault_response(request: &Message, fault: Fault) -> Self {
        let mut response = Self::response_to(request, Payload::new());
        response.fault = Some(fault);
        response
    }

    /// Sets the target plugin.
    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    /// Sets the correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Sets the alternate reply address.
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Sets the absolute expiry deadline.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns `true` if the message carries a deadline that has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Utc::now() > deadline)
    }

    /// Checks the message invariants.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Validation`] when a required field is empty, an
    /// addressed message lacks its target or correlation ID, or the message
    /// has expired.
    pub fn validate(&self) -> BusResult<()> {
        if self.id.is_empty() {
            return Err(BusError::validation("message ID is required"));
        }
        if self.from.is_empty() {
            return Err(BusError::validation("message sender is required"));
        }
        if self.subject.is_empty() {
            return Err(BusError::validation("message subject is required"));
        }
        if self.kind.is_addressed() {
            if self.to.is_empty() {
                return Err(BusError::validation(format!(
                    "{} target is required",
                    self.kind
                )));
            }
            if self.correlation_id.is_empty() {
                return Err(BusError::validation(format!(
                    "{} correlation ID is required",
                    self.kind
                )));
            }
        }
        if self.is_expired() {
            return Err(BusError::validation("message has expired"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => Payload::new(),
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Message::event("core", "tick", Payload::new());
        let b = Message::event("core", "tick", Payload::new());
        assert!(a.id.starts_with("msg_"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_validate_required_fields() {
        let mut msg = Message::event("core", "tick", Payload::new());
        assert!(msg.validate().is_ok());

        msg.from.clear();
        assert!(matches!(msg.validate(), Err(BusError::Validation(_))));

        let mut msg = Message::event("core", "tick", Payload::new());
        msg.subject.clear();
        assert!(matches!(msg.validate(), Err(BusError::Validation(_))));

        let mut msg = Message::event("core", "tick", Payload::new());
        msg.id.clear();
        assert!(matches!(msg.validate(), Err(BusError::Validation(_))));
    }

    #[test]
    fn test_request_requires_target_and_correlation() {
        let msg = Message::request("core", "", "echo", Payload::new(), "c1");
        assert!(msg.validate().is_err());

        let msg = Message::request("core", "p1", "echo", Payload::new(), "");
        assert!(msg.validate().is_err());

        let msg = Message::request("core", "p1", "echo", Payload::new(), "c1");
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_expired_message_is_invalid() {
        let past = Utc::now() - TimeDelta::seconds(1);
        let msg = Message::event("core", "tick", Payload::new()).with_expires_at(past);
        assert!(msg.is_expired());
        assert!(msg.validate().is_err());

        let future = Utc::now() + TimeDelta::seconds(60);
        let msg = Message::event("core", "tick", Payload::new()).with_expires_at(future);
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_response_swaps_endpoints() {
        let req = Message::request("core", "p1", "echo", Payload::new(), "c42");
        let resp = Message::response_to(&req, payload(json!({ "received": true })));

        assert_eq!(resp.kind, MessageType::Response);
        assert_eq!(resp.from, "p1");
        assert_eq!(resp.to, "core");
        assert_eq!(resp.subject, "echo");
        assert_eq!(resp.correlation_id, "c42");
        assert_ne!(resp.id, req.id);
        assert_eq!(resp.payload.get("received"), Some(&json!(true)));
    }

    #[test]
    fn test_response_honours_reply_to() {
        let req =
            Message::request("core", "p1", "echo", Payload::new(), "c1").with_reply_to("audit");
        let resp = Message::response_to(&req, Payload::new());
        assert_eq!(resp.to, "audit");
    }

    #[test]
    fn test_response_constructor() {
        let resp = Message::response("p1", "core", "echo", Payload::new(), "c7");
        assert_eq!(resp.kind, MessageType::Response);
        assert!(resp.validate().is_ok());
        assert!(Message::response("p1", "core", "echo", Payload::new(), "").validate().is_err());
    }

    #[test]
    fn test_json_shape() {
        let req = Message::request("core", "p1", "echo", payload(json!({ "msg": "hi" })), "c1");
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["type"], "request");
        assert_eq!(value["correlationId"], "c1");
        assert!(value.get("replyTo").is_none());
        assert!(value.get("fault").is_none());

        let event = Message::event("core", "tick", Payload::new());
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("to").is_none());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = json!({
            "id": "m1",
            "type": "gossip",
            "from": "core",
            "subject": "tick",
            "timestamp": "2024-01-01T00:00:00Z",
        });
        assert!(serde_json::from_value::<Message>(raw).is_err());
    }

    #[test]
    fn test_timestamps_are_rfc3339() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut msg = Message::event("core", "tick", Payload::new()).with_expires_at(at);
        msg.timestamp = at;

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["timestamp"], "2024-05-01T12:30:00Z");
        assert_eq!(value["expiresAt"], "2024-05-01T12:30:00Z");

        let raw = json!({
            "id": "m1",
            "type": "event",
            "from": "core",
            "subject": "tick",
            "timestamp": "2024-05-01T14:30:00+02:00",
        });
        let parsed: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.timestamp, at);
        assert!(parsed.expires_at.is_none());
    }
}
