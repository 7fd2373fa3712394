//! Error types for robust-node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or operating a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Startup configuration rejected before any socket is opened
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Grid description error
    #[error("Topology error: {0}")]
    Topology(#[from] robust_topology::TopologyError),

    /// Wire codec error
    #[error("Codec error: {0}")]
    Codec(#[from] robust_protocol::CodecError),

    /// Serialization error (admin socket)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Injected energy must be positive
    #[error("Invalid energy: {0} (must be at least 1)")]
    InvalidEnergy(u64),

    /// The node is dead and refuses the operation
    #[error("Node is dead")]
    NodeDead,

    /// The item is already held
    #[error("Information already held: {0}")]
    AlreadyHeld(String),

    /// A share of the grid must lie in `0.0..=1.0`
    #[error("Invalid fraction: {0} (must be between 0 and 1)")]
    InvalidFraction(f64),
}
