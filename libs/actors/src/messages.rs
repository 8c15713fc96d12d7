//! Actor Messages and Wire Envelopes
//!
//! Two halves live here:
//! - the wire protocol exchanged between actor systems over a [`Channel`]
//!   (handshake, `send`/`ask` envelopes, and the acknowledgement reply)
//! - the typed message layer: [`Method`] capabilities and decoding of the
//!   erased `(type, payload)` pair into an actor's closed message enum
//!
//! At runtime every message is `(type: String, payload: serde_json::Value)`;
//! typing is erased before dispatch so a typed reference and a raw address
//! produce identical traffic.
//!
//! [`Channel`]: crate::transport::Channel

use crate::address::Address;
use crate::error::{ActorError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fire-and-forget
    Send,
    /// Request/response, acknowledged with a [`Reply`]
    Ask,
}

/// Application message crossing an actor-system boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: Value,
    pub target_address: Address,
    pub sender_address: Option<Address>,
}

/// Everything that travels over a channel's `message` event
///
/// ```text
/// { "mode": "handshake", "address": "server" }
/// { "mode": "ask", "type": "greet", "payload": {..},
///   "targetAddress": {..}, "senderAddress": {..} | null }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WireMessage {
    /// First message on a channel: announces the sender's system name
    Handshake { address: String },
    Send(Envelope),
    Ask(Envelope),
}

impl WireMessage {
    pub fn handshake(system_name: impl Into<String>) -> Self {
        WireMessage::Handshake {
            address: system_name.into(),
        }
    }

    pub fn envelope(mode: Mode, envelope: Envelope) -> Self {
        match mode {
            Mode::Send => WireMessage::Send(envelope),
            Mode::Ask => WireMessage::Ask(envelope),
        }
    }

    /// Delivery mode, `None` for handshakes
    pub fn mode(&self) -> Option<Mode> {
        match self {
            WireMessage::Handshake { .. } => None,
            WireMessage::Send(_) => Some(Mode::Send),
            WireMessage::Ask(_) => Some(Mode::Ask),
        }
    }
}

/// Failure carried back over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub kind: String,
    pub message: String,
}

/// Acknowledgement for an `ask` envelope: `{"ok": value}` or `{"err": {..}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Ok(Value),
    Err(RemoteFailure),
}

impl Reply {
    pub fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(err) => Reply::Err(RemoteFailure {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }

    pub fn into_result(self) -> Result<Value> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Err(failure) => Err(ActorError::remote(failure.kind, failure.message)),
        }
    }
}

/// One named capability of an actor: message type, payload and response
///
/// Client stubs call [`TypedRef::ask`](crate::TypedRef::ask) with a `Method`;
/// the receiving actor must have a variant tagged `TYPE` in its message enum.
pub trait Method: Send + 'static {
    const TYPE: &'static str;
    type Payload: Serialize + DeserializeOwned + Send;
    type Response: Serialize + DeserializeOwned + Send;
}

/// Capability-set membership: `T` exposes method `M`
///
/// Purely a type-level marker; nothing checks it at runtime.
pub trait Exposes<M: Method> {}

/// Decode an erased `(type, payload)` pair into an actor's message enum
///
/// Message enums are adjacently tagged:
/// `#[serde(tag = "type", content = "payload")]`. A `null` payload is
/// treated as absent so unit variants decode.
pub fn decode_message<M: DeserializeOwned>(
    message_type: &str,
    payload: Value,
) -> std::result::Result<M, serde_json::Error> {
    let mut tagged = Map::with_capacity(2);
    tagged.insert("type".to_string(), Value::String(message_type.to_string()));
    if !payload.is_null() {
        tagged.insert("payload".to_string(), payload);
    }
    serde_json::from_value(Value::Object(tagged))
}

/// Encode a handler response
pub fn reply<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ActorError::codec_with_source("Failed to encode reply", e))
}

/// Encode a payload for dispatch
pub fn encode_payload<T: Serialize>(payload: T) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|e| ActorError::codec_with_source("Failed to encode payload", e))
}

/// Decode a response into the caller's expected type
pub fn decode_response<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ActorError::codec_with_source("Failed to decode response", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(tag = "type", content = "payload", rename_all = "camelCase")]
    enum ChatMessage {
        Post { message: String },
        Subscribe,
    }

    #[test]
    fn test_handshake_wire_shape() {
        let value = serde_json::to_value(WireMessage::handshake("server")).unwrap();
        assert_eq!(value, json!({ "mode": "handshake", "address": "server" }));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope {
            message_type: "greet".to_string(),
            payload: json!({ "content": "hi" }),
            target_address: Address::new("B", "x"),
            sender_address: None,
        };
        let message = WireMessage::envelope(Mode::Ask, envelope);
        assert_eq!(message.mode(), Some(Mode::Ask));

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "mode": "ask",
                "type": "greet",
                "payload": { "content": "hi" },
                "targetAddress": { "actorSystemName": "B", "localAddress": "x" },
                "senderAddress": null
            })
        );

        let decoded: WireMessage = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_reply_carries_errors() {
        let ok = serde_json::to_value(Reply::from_result(Ok(json!(3)))).unwrap();
        assert_eq!(ok, json!({ "ok": 3 }));

        let failed = Reply::from_result(Err(ActorError::handler("x", "boom")));
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["err"]["kind"], "HandlerError");

        let decoded: Reply = serde_json::from_value(value).unwrap();
        match decoded.into_result() {
            Err(ActorError::Remote { kind, message }) => {
                assert_eq!(kind, "HandlerError");
                assert!(message.contains("boom"));
            }
            other => panic!("Expected remote failure, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_message_by_tag() {
        let post: ChatMessage = decode_message("post", json!({ "message": "hello" })).unwrap();
        assert_eq!(
            post,
            ChatMessage::Post {
                message: "hello".to_string()
            }
        );

        let subscribe: ChatMessage = decode_message("subscribe", Value::Null).unwrap();
        assert_eq!(subscribe, ChatMessage::Subscribe);

        let unknown = decode_message::<ChatMessage>("dance", json!({}));
        assert!(unknown.is_err());
    }
}
