//! Downstream wire format.
//!
//! Inbound  `{"type": ..., "payload": ...}`
//! Outbound `{"type": ..., "data": ...}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use txelevator_broadcast::MessageKind;

use crate::error::GatewayError;

// ─── Inbound ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRequest {
    Subscribe(MessageKind),
    Unsubscribe(MessageKind),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

impl ClientRequest {
    pub fn parse(text: &str) -> Result<Self, GatewayError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| GatewayError::MalformedRequest(e.to_string()))?;

        if envelope.kind == "unsubscribe" {
            let topic = match envelope.payload {
                Some(Value::String(topic)) => topic,
                Some(other) => {
                    return Err(GatewayError::MalformedRequest(format!(
                        "unsubscribe payload must be a topic name, got {other}"
                    )))
                }
                None => {
                    return Err(GatewayError::MalformedRequest(
                        "unsubscribe needs a topic payload".into(),
                    ))
                }
            };
            return MessageKind::from_name(&topic)
                .map(Self::Unsubscribe)
                .ok_or(GatewayError::UnknownTopic(topic));
        }

        MessageKind::from_name(&envelope.kind)
            .map(Self::Subscribe)
            .ok_or_else(|| {
                GatewayError::MalformedRequest(format!("unknown message type {:?}", envelope.kind))
            })
    }
}

// ─── Outbound ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage<'a> {
    NewSnapshot(&'a Value),
    NewBlock(&'a Value),
    Error(String),
    Welcome(&'a str),
}

impl<'a> ServerMessage<'a> {
    pub fn snapshot(kind: MessageKind, data: &'a Value) -> Self {
        match kind {
            MessageKind::NewSnapshot => Self::NewSnapshot(data),
            MessageKind::NewBlock => Self::NewBlock(data),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_subscribe_requests() {
        assert_eq!(
            ClientRequest::parse(r#"{"type":"newSnapshot"}"#).unwrap(),
            ClientRequest::Subscribe(MessageKind::NewSnapshot)
        );
        assert_eq!(
            ClientRequest::parse(r#"{"type":"newBlock","payload":null}"#).unwrap(),
            ClientRequest::Subscribe(MessageKind::NewBlock)
        );
    }

    #[test]
    fn parses_unsubscribe() {
        assert_eq!(
            ClientRequest::parse(r#"{"type":"unsubscribe","payload":"newBlock"}"#).unwrap(),
            ClientRequest::Unsubscribe(MessageKind::NewBlock)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ClientRequest::parse("not json"),
            Err(GatewayError::MalformedRequest(_))
        ));
        assert!(matches!(
            ClientRequest::parse(r#"{"payload":"newBlock"}"#),
            Err(GatewayError::MalformedRequest(_))
        ));
        assert!(matches!(
            ClientRequest::parse(r#"{"type":"subscribeAll"}"#),
            Err(GatewayError::MalformedRequest(_))
        ));
        assert!(matches!(
            ClientRequest::parse(r#"{"type":"unsubscribe"}"#),
            Err(GatewayError::MalformedRequest(_))
        ));
        assert!(matches!(
            ClientRequest::parse(r#"{"type":"unsubscribe","payload":"mempool"}"#),
            Err(GatewayError::UnknownTopic(t)) if t == "mempool"
        ));
    }

    #[test]
    fn outbound_envelopes() {
        let data = json!({"tipBlockNumber": 7});
        let frame = ServerMessage::snapshot(MessageKind::NewSnapshot, &data)
            .encode()
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&frame).unwrap(),
            json!({"type": "newSnapshot", "data": {"tipBlockNumber": 7}})
        );

        let frame = ServerMessage::Error("bad".into()).encode().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&frame).unwrap(),
            json!({"type": "error", "data": "bad"})
        );
    }
}
