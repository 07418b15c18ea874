//! Envelope format carried in every frame.
//!
//! An envelope is a JSON object with four keys:
//!
//! - `msg-name`: `"connect"`, `"connect-ack"`, `"leave"` or `"payload"`
//! - `qname`: target queue (payload only, empty otherwise)
//! - `data`: nested record for connect / connect-ack / leave (`null` for payload)
//! - `pdata`: payload bytes as a base64 string (`null` unless payload)
//!
//! JSON escapes control characters, so an encoded envelope never contains a
//! raw zero byte and can be framed with a zero terminator.

use crate::error::{WireError, WireResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MSG_CONNECT: &str = "connect";
pub const MSG_CONNECT_ACK: &str = "connect-ack";
pub const MSG_LEAVE: &str = "leave";
pub const MSG_PAYLOAD: &str = "payload";

/// Raw envelope as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "msg-name", default)]
    pub msg_name: String,
    #[serde(default)]
    pub qname: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, with = "base64_bytes")]
    pub pdata: Option<Vec<u8>>,
}

/// Body of `connect` and `connect-ack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectBody {
    pub name: String,
    pub id: u64,
}

/// Body of `leave`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveBody {
    pub name: String,
}

/// Typed view of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// Dialing node introduces itself; `id` is its slot for the callee.
    Connect { name: String, id: u64 },
    /// Reply to `Connect`, echoing the initiator's `id`.
    ConnectAck { name: String, id: u64 },
    /// Sender is leaving the mesh.
    Leave { name: String },
    /// Bytes for a named queue on the receiving node.
    Payload { qname: String, data: Vec<u8> },
}

impl ProtocolMessage {
    /// The `msg-name` tag for this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => MSG_CONNECT,
            Self::ConnectAck { .. } => MSG_CONNECT_ACK,
            Self::Leave { .. } => MSG_LEAVE,
            Self::Payload { .. } => MSG_PAYLOAD,
        }
    }
}

impl Envelope {
    /// Wrap a protocol message.
    pub fn from_protocol(msg: &ProtocolMessage) -> WireResult<Self> {
        let mut env = Envelope {
            msg_name: msg.kind().to_string(),
            qname: String::new(),
            data: Value::Null,
            pdata: None,
        };
        match msg {
            ProtocolMessage::Connect { name, id } | ProtocolMessage::ConnectAck { name, id } => {
                env.data = serde_json::to_value(ConnectBody {
                    name: name.clone(),
                    id: *id,
                })?;
            }
            ProtocolMessage::Leave { name } => {
                env.data = serde_json::to_value(LeaveBody { name: name.clone() })?;
            }
            ProtocolMessage::Payload { qname, data } => {
                env.qname = qname.clone();
                env.pdata = Some(data.clone());
            }
        }
        Ok(env)
    }

    /// Interpret the envelope according to its `msg-name`.
    pub fn into_protocol(self) -> WireResult<ProtocolMessage> {
        match self.msg_name.as_str() {
            MSG_CONNECT => {
                let body: ConnectBody = serde_json::from_value(self.data)?;
                Ok(ProtocolMessage::Connect {
                    name: body.name,
                    id: body.id,
                })
            }
            MSG_CONNECT_ACK => {
                let body: ConnectBody = serde_json::from_value(self.data)?;
                Ok(ProtocolMessage::ConnectAck {
                    name: body.name,
                    id: body.id,
                })
            }
            MSG_LEAVE => {
                let body: LeaveBody = serde_json::from_value(self.data)?;
                Ok(ProtocolMessage::Leave { name: body.name })
            }
            MSG_PAYLOAD => Ok(ProtocolMessage::Payload {
                qname: self.qname,
                data: self.pdata.unwrap_or_default(),
            }),
            _ => Err(WireError::UnknownMessage(self.msg_name)),
        }
    }
}

/// Encode an envelope to its JSON bytes (no terminator).
pub fn encode_envelope(env: &Envelope) -> WireResult<Vec<u8>> {
    Ok(serde_json::to_vec(env)?)
}

/// Parse JSON bytes into an envelope.
pub fn decode_envelope(body: &[u8]) -> WireResult<Envelope> {
    Ok(serde_json::from_slice(body)?)
}

/// Encode a protocol message straight to frame bytes (no terminator).
pub fn encode_message(msg: &ProtocolMessage) -> WireResult<Vec<u8>> {
    encode_envelope(&Envelope::from_protocol(msg)?)
}

/// Decode frame bytes into a protocol message.
pub fn decode_message(body: &[u8]) -> WireResult<ProtocolMessage> {
    decode_envelope(body)?.into_protocol()
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| STANDARD.decode(t).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_wire_shape() {
        let bytes = encode_message(&ProtocolMessage::Connect {
            name: "alpha".to_string(),
            id: 3,
        })
        .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["msg-name"], "connect");
        assert_eq!(json["qname"], "");
        assert_eq!(json["data"]["name"], "alpha");
        assert_eq!(json["data"]["id"], 3);
        assert!(json["pdata"].is_null());
    }

    #[test]
    fn test_payload_uses_base64() {
        let bytes = encode_message(&ProtocolMessage::Payload {
            qname: "jobs".to_string(),
            data: b"hi".to_vec(),
        })
        .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["msg-name"], "payload");
        assert_eq!(json["qname"], "jobs");
        assert_eq!(json["pdata"], "aGk=");
        assert!(json["data"].is_null());
    }

    #[test]
    fn test_encoded_payload_has_no_zero_byte() {
        let bytes = encode_message(&ProtocolMessage::Payload {
            qname: "q\u{0}".to_string(),
            data: vec![0, 0, 1, 0],
        })
        .unwrap();
        assert!(!bytes.contains(&0));

        match decode_message(&bytes).unwrap() {
            ProtocolMessage::Payload { qname, data } => {
                assert_eq!(qname, "q\u{0}");
                assert_eq!(data, vec![0, 0, 1, 0]);
            }
            other => panic!("Expected Payload, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_foreign_ack() {
        // Hand-written frame as another implementation would emit it.
        let raw = br#"{"msg-name":"connect-ack","qname":"","data":{"name":"beta","id":0},"pdata":null}"#;
        assert_eq!(
            decode_message(raw).unwrap(),
            ProtocolMessage::ConnectAck {
                name: "beta".to_string(),
                id: 0
            }
        );
    }

    #[test]
    fn test_missing_optional_fields() {
        let raw = br#"{"msg-name":"payload","qname":"jobs"}"#;
        assert_eq!(
            decode_message(raw).unwrap(),
            ProtocolMessage::Payload {
                qname: "jobs".to_string(),
                data: Vec::new()
            }
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let raw = br#"{"msg-name":"gossip","data":null}"#;
        match decode_message(raw) {
            Err(WireError::UnknownMessage(kind)) => assert_eq!(kind, "gossip"),
            other => panic!("Expected UnknownMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_body_rejected() {
        let raw = br#"{"msg-name":"leave","data":{"nom":"x"}}"#;
        assert!(matches!(decode_message(raw), Err(WireError::Json(_))));
        assert!(matches!(decode_message(b"not json"), Err(WireError::Json(_))));
    }
}
