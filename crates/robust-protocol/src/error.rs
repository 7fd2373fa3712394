//! Error types for robust-protocol.

use thiserror::Error;

use crate::MessageKind;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while encoding or decoding a datagram.
///
/// A decode error means the datagram is ill-formed; receivers drop it and
/// carry on.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Not valid JSON, or the envelope fields are missing or mistyped.
    #[error("malformed datagram: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope is fine but `data` does not match the variant.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: MessageKind,
        source: serde_json::Error,
    },

    /// `data` must be a JSON object for this variant.
    #[error("{kind} payload must be an object")]
    NotAnObject { kind: MessageKind },

    /// The encoded message does not fit in a single UDP datagram.
    #[error("encoded message is {len} bytes, over the {max} byte datagram limit")]
    Oversized { len: usize, max: usize },
}
