//! Robust Grid Protocol - one JSON message per datagram
//!
//! Every datagram exchanged between grid nodes (and between nodes and the
//! launcher, monitor or test harness) is a single self-contained JSON object:
//!
//! ```text
//! {
//!   "type":      "ping" | "pong" | "information" | "heartbeat" | "die",
//!   "sender_id": "node_1_1",
//!   "data":      { ...variant payload... },
//!   "energy":    0,
//!   "hops":      0
//! }
//! ```
//!
//! `energy` and `hops` default to 0 when absent. Only `information` gives
//! them meaning: they are the transit values before the receiver accepts
//! the item.
//!
//! # Example
//!
//! ```
//! use robust_protocol::Message;
//!
//! let msg = Message::information("controller", "news", "hello", 10, 0);
//! let bytes = msg.encode()?;
//! assert_eq!(Message::decode(&bytes)?, msg);
//! # Ok::<(), robust_protocol::CodecError>(())
//! ```

mod codec;
mod error;
mod message;

pub use codec::MAX_DATAGRAM_LEN;
pub use error::{CodecError, Result};
pub use message::{Energy, Hops, InformationPayload, ItemSummary, Message, MessageKind, NodeStatus};
