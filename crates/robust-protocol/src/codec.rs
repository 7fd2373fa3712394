//! Conversion between [`Message`] and datagram bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CodecError, Result};
use crate::message::{Energy, Hops, InformationPayload, Message, MessageKind, NodeStatus};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// The flat wire shape shared by every variant.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: MessageKind,
    sender_id: String,
    #[serde(default = "empty_object")]
    data: Value,
    #[serde(default)]
    energy: Energy,
    #[serde(default)]
    hops: Hops,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn into_object(kind: MessageKind, data: Value) -> Result<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(CodecError::NotAnObject { kind }),
    }
}

fn payload<T: serde::de::DeserializeOwned>(kind: MessageKind, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|source| CodecError::Payload { kind, source })
}

impl Message {
    /// Encode to the bytes of a single datagram.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let frame = match self {
            Message::Ping { sender_id, data } | Message::Heartbeat { sender_id, data } => Frame {
                kind: self.kind(),
                sender_id: sender_id.clone(),
                data: Value::Object(data.clone()),
                energy: 0,
                hops: 0,
            },
            Message::Pong { sender_id, status } => Frame {
                kind: MessageKind::Pong,
                sender_id: sender_id.clone(),
                data: serde_json::to_value(status)?,
                energy: 0,
                hops: 0,
            },
            Message::Information {
                sender_id,
                payload,
                energy,
                hops,
            } => Frame {
                kind: MessageKind::Information,
                sender_id: sender_id.clone(),
                data: serde_json::to_value(payload)?,
                energy: *energy,
                hops: *hops,
            },
            Message::Die { sender_id } => Frame {
                kind: MessageKind::Die,
                sender_id: sender_id.clone(),
                data: empty_object(),
                energy: 0,
                hops: 0,
            },
        };

        let bytes = serde_json::to_vec(&frame)?;
        if bytes.len() > MAX_DATAGRAM_LEN {
            return Err(CodecError::Oversized {
                len: bytes.len(),
                max: MAX_DATAGRAM_LEN,
            });
        }
        Ok(bytes)
    }

    /// Decode one datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let Frame {
            kind,
            sender_id,
            data,
            energy,
            hops,
        } = serde_json::from_slice(bytes)?;

        let message = match kind {
            MessageKind::Ping => Message::Ping {
                sender_id,
                data: into_object(kind, data)?,
            },
            MessageKind::Pong => Message::Pong {
                sender_id,
                status: payload::<NodeStatus>(kind, data)?,
            },
            MessageKind::Information => Message::Information {
                sender_id,
                payload: payload::<InformationPayload>(kind, data)?,
                energy,
                hops,
            },
            MessageKind::Heartbeat => Message::Heartbeat {
                sender_id,
                data: into_object(kind, data)?,
            },
            MessageKind::Die => Message::Die { sender_id },
        };
        Ok(message)
    }
}
