//! Error types for robust-topology.

use thiserror::Error;

use crate::GridCoord;

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Errors raised when a grid description cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// A grid needs at least one cell.
    #[error("grid size must be at least 1")]
    EmptyGrid,

    /// The highest cell address would not fit in the port range.
    #[error("grid of size {size} starting at port {base_port} overflows the port range")]
    PortOverflow { base_port: u16, size: u32 },

    /// The coordinate lies outside the grid.
    #[error("coordinate {coord} is outside a grid of size {size}")]
    OutOfBounds { coord: GridCoord, size: u32 },
}
