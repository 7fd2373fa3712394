//! Structured messages and their payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Remaining propagation budget as carried on the wire.
///
/// Signed: senders may put anything here, and non-positive values are
/// rejected by the receiver rather than by the codec.
pub type Energy = i64;

/// Number of hops an item has travelled.
pub type Hops = u64;

/// Message type discriminant (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Ping,
    Pong,
    Information,
    Heartbeat,
    Die,
}

impl MessageKind {
    /// Name used on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Information => "information",
            Self::Heartbeat => "heartbeat",
            Self::Die => "die",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `information` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformationPayload {
    /// Unique key of the item
    pub info_id: String,
    /// Opaque content
    #[serde(default)]
    pub content: String,
}

/// Energy and hop count of one held item, as reported in a pong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub energy: u64,
    pub hops: Hops,
}

/// Status snapshot returned in a pong.
///
/// Dead nodes still answer, with `alive: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub alive: bool,
    pub grid_x: u32,
    pub grid_y: u32,
    pub information_count: usize,
    pub information: BTreeMap<String, ItemSummary>,
    pub generation: u64,
    /// Number of neighbors (not their ids)
    pub neighbors: usize,
}

impl NodeStatus {
    /// Whether the node reports holding `info_id`.
    pub fn holds(&self, info_id: &str) -> bool {
        self.information.contains_key(info_id)
    }
}

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Status request. `data` may carry caller-correlation fields; nodes ignore it.
    Ping {
        sender_id: String,
        data: Map<String, Value>,
    },
    /// Status reply, sent only to the pinging address.
    Pong { sender_id: String, status: NodeStatus },
    /// An item in transit with its pre-acceptance energy and hop count.
    Information {
        sender_id: String,
        payload: InformationPayload,
        energy: Energy,
        hops: Hops,
    },
    /// Accepted but inert.
    Heartbeat {
        sender_id: String,
        data: Map<String, Value>,
    },
    /// Simulated failure of the receiver.
    Die { sender_id: String },
}

impl Message {
    /// A ping with no correlation data.
    pub fn ping(sender_id: impl Into<String>) -> Self {
        Self::Ping {
            sender_id: sender_id.into(),
            data: Map::new(),
        }
    }

    /// A pong carrying `status`.
    pub fn pong(sender_id: impl Into<String>, status: NodeStatus) -> Self {
        Self::Pong {
            sender_id: sender_id.into(),
            status,
        }
    }

    /// An information message.
    pub fn information(
        sender_id: impl Into<String>,
        info_id: impl Into<String>,
        content: impl Into<String>,
        energy: Energy,
        hops: Hops,
    ) -> Self {
        Self::Information {
            sender_id: sender_id.into(),
            payload: InformationPayload {
                info_id: info_id.into(),
                content: content.into(),
            },
            energy,
            hops,
        }
    }

    /// A heartbeat with no data.
    pub fn heartbeat(sender_id: impl Into<String>) -> Self {
        Self::Heartbeat {
            sender_id: sender_id.into(),
            data: Map::new(),
        }
    }

    /// A die command.
    pub fn die(sender_id: impl Into<String>) -> Self {
        Self::Die {
            sender_id: sender_id.into(),
        }
    }

    /// Message type.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Ping { .. } => MessageKind::Ping,
            Self::Pong { .. } => MessageKind::Pong,
            Self::Information { .. } => MessageKind::Information,
            Self::Heartbeat { .. } => MessageKind::Heartbeat,
            Self::Die { .. } => MessageKind::Die,
        }
    }

    /// Id of the sending peer (or tool).
    pub fn sender_id(&self) -> &str {
        match self {
            Self::Ping { sender_id, .. }
            | Self::Pong { sender_id, .. }
            | Self::Information { sender_id, .. }
            | Self::Heartbeat { sender_id, .. }
            | Self::Die { sender_id } => sender_id,
        }
    }
}
