//! Message types for the liveframe protocol.
//!
//! Every message on the wire is a positional 5-tuple:
//! `[joinRef, messageRef, topic, kind, payload]`.

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::codec::ProtocolError;

/// Message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Mount a component on a topic.
    Join,
    /// Connection keepalive.
    Heartbeat,
    /// Client-side UI event.
    Event,
    /// Client-side navigation without remount.
    LivePatch,
    /// Tear down a topic.
    Leave,
    /// Server reply to a client message.
    Reply,
    /// Unsolicited server push of a rendered update.
    Diff,
}

impl Kind {
    /// The literal written on the wire for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Join => "phx_join",
            Kind::Heartbeat => "heartbeat",
            Kind::Event => "event",
            Kind::LivePatch => "live_patch",
            Kind::Leave => "phx_leave",
            Kind::Reply => "phx_reply",
            Kind::Diff => "diff",
        }
    }

    /// Parse a wire literal.
    ///
    /// Accepts the bare aliases `join`, `leave` and `reply` as well.
    #[must_use]
    pub fn parse(literal: &str) -> Option<Self> {
        match literal {
            "phx_join" | "join" => Some(Kind::Join),
            "heartbeat" => Some(Kind::Heartbeat),
            "event" => Some(Kind::Event),
            "live_patch" => Some(Kind::LivePatch),
            "phx_leave" | "leave" => Some(Kind::Leave),
            "phx_reply" | "reply" => Some(Kind::Reply),
            "diff" => Some(Kind::Diff),
            _ => None,
        }
    }

    /// Whether a client may send this kind to the server.
    #[must_use]
    pub fn is_inbound(&self) -> bool {
        !matches!(self, Kind::Reply | Kind::Diff)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Identifier of the join that opened the topic. Constant per session.
    pub join_ref: Option<String>,
    /// Identifier of this message, echoed in replies.
    pub message_ref: Option<String>,
    /// Topic the message is addressed to.
    pub topic: String,
    /// Message kind.
    pub kind: Kind,
    /// Kind-specific payload.
    pub payload: Value,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(
        join_ref: Option<String>,
        message_ref: Option<String>,
        topic: impl Into<String>,
        kind: Kind,
        payload: Value,
    ) -> Self {
        Self {
            join_ref,
            message_ref,
            topic: topic.into(),
            kind,
            payload,
        }
    }

    /// Create a server push for a topic. Pushes carry no message ref.
    #[must_use]
    pub fn push(join_ref: Option<String>, topic: impl Into<String>, payload: Value) -> Self {
        Self::new(join_ref, None, topic, Kind::Diff, payload)
    }

    /// Interpret the payload as a join payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not have the join shape.
    pub fn join_payload(&self) -> Result<JoinPayload, ProtocolError> {
        self.payload_as("phx_join")
    }

    /// Interpret the payload as an event payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not have the event shape.
    pub fn event_payload(&self) -> Result<EventPayload, ProtocolError> {
        self.payload_as("event")
    }

    /// Interpret the payload as a live patch payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload has no `url`.
    pub fn live_patch_payload(&self) -> Result<LivePatchPayload, ProtocolError> {
        self.payload_as("live_patch")
    }

    fn payload_as<T: for<'de> Deserialize<'de>>(
        &self,
        kind: &'static str,
    ) -> Result<T, ProtocolError> {
        T::deserialize(&self.payload).map_err(|source| ProtocolError::Payload { kind, source })
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(5)?;
        tuple.serialize_element(&self.join_ref)?;
        tuple.serialize_element(&self.message_ref)?;
        tuple.serialize_element(&self.topic)?;
        tuple.serialize_element(self.kind.as_str())?;
        tuple.serialize_element(&self.payload)?;
        tuple.end()
    }
}

/// Reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// A reply to a client message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    join_ref: Option<String>,
    message_ref: Option<String>,
    topic: String,
    status: Status,
    response: Value,
}

impl Reply {
    /// Create a reply echoing the refs and topic of `origin`.
    #[must_use]
    pub fn new(origin: &Message, status: Status, response: Value) -> Self {
        Self {
            join_ref: origin.join_ref.clone(),
            message_ref: origin.message_ref.clone(),
            topic: origin.topic.clone(),
            status,
            response,
        }
    }

    /// Create an `ok` reply.
    #[must_use]
    pub fn ok(origin: &Message, response: Value) -> Self {
        Self::new(origin, Status::Ok, response)
    }

    /// Create an `error` reply.
    #[must_use]
    pub fn error(origin: &Message, response: Value) -> Self {
        Self::new(origin, Status::Error, response)
    }

    /// Create the reply to a heartbeat: `ok` with an empty response.
    #[must_use]
    pub fn heartbeat(origin: &Message) -> Self {
        Self::ok(origin, Value::Object(Map::new()))
    }

    /// Reply status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Reply response body.
    #[must_use]
    pub fn response(&self) -> &Value {
        &self.response
    }
}

impl From<Reply> for Message {
    fn from(reply: Reply) -> Self {
        let mut payload = Map::new();
        payload.insert("status".to_string(), serde_json::json!(reply.status));
        payload.insert("response".to_string(), reply.response);
        Message::new(
            reply.join_ref,
            reply.message_ref,
            reply.topic,
            Kind::Reply,
            Value::Object(payload),
        )
    }
}

/// Payload of a join message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinPayload {
    /// URL the component is mounted at.
    #[serde(default)]
    pub url: Option<String>,
    /// URL the client was redirected to, used when `url` is absent.
    #[serde(default)]
    pub redirect: Option<String>,
    /// Mount parameters (`_csrf_token`, `_mounts`, ...).
    #[serde(default)]
    pub params: Value,
    /// Signed session blob.
    #[serde(default)]
    pub session: Option<String>,
    /// Signed static blob.
    #[serde(default, rename = "static")]
    pub static_token: Option<String>,
}

impl JoinPayload {
    /// The URL to route on: `url` if present, otherwise `redirect`.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.url.as_deref().or(self.redirect.as_deref())
    }
}

/// Payload of an event message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventPayload {
    /// Event type (`click`, `form`, `keyup`, ...).
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Event name declared in the markup.
    pub event: String,
    /// Event value, an object or a form-encoded string.
    #[serde(default)]
    pub value: Value,
}

/// Payload of a live patch message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LivePatchPayload {
    /// URL navigated to.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_literals() {
        for kind in [
            Kind::Join,
            Kind::Heartbeat,
            Kind::Event,
            Kind::LivePatch,
            Kind::Leave,
            Kind::Reply,
            Kind::Diff,
        ] {
            assert_eq!(Kind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(Kind::parse("join"), Some(Kind::Join));
        assert_eq!(Kind::parse("leave"), Some(Kind::Leave));
        assert_eq!(Kind::parse("blahblah"), None);
        assert!(!Kind::Reply.is_inbound());
        assert!(Kind::LivePatch.is_inbound());
    }

    #[test]
    fn test_heartbeat_reply() {
        let hb = Message::new(None, Some("1".into()), "phoenix", Kind::Heartbeat, json!({}));
        let reply: Message = Reply::heartbeat(&hb).into();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!([null, "1", "phoenix", "phx_reply", {"response": {}, "status": "ok"}])
        );
    }

    #[test]
    fn test_reply_echoes_origin() {
        let origin = Message::new(
            Some("1".into()),
            Some("2".into()),
            "topic",
            Kind::Event,
            json!({"type": "click", "event": "down", "value": {"value": "string"}}),
        );
        let reply = Reply::ok(&origin, json!({}));
        assert_eq!(reply.status(), Status::Ok);

        let message: Message = reply.into();
        assert_eq!(message.join_ref, origin.join_ref);
        assert_eq!(message.message_ref, origin.message_ref);
        assert_eq!(message.topic, origin.topic);
        assert_eq!(message.kind, Kind::Reply);
    }

    #[test]
    fn test_join_payload_target() {
        let message = Message::new(
            Some("4".into()),
            Some("4".into()),
            "lv:phx-AAAAAAAA",
            Kind::Join,
            json!({"redirect": "http://localhost:4444/test", "params": {}}),
        );
        let payload = message.join_payload().unwrap();
        assert_eq!(payload.target(), Some("http://localhost:4444/test"));

        let both = JoinPayload {
            url: Some("/a".into()),
            redirect: Some("/b".into()),
            params: Value::Null,
            session: None,
            static_token: None,
        };
        assert_eq!(both.target(), Some("/a"));
    }

    #[test]
    fn test_event_payload_requires_event_name() {
        let message = Message::new(None, None, "t", Kind::Event, json!({"type": "click"}));
        assert!(matches!(
            message.event_payload(),
            Err(ProtocolError::Payload { kind: "event", .. })
        ));
    }
}
