//! Robust Grid Topology
//!
//! Pure mapping from grid coordinates to peer identities and addresses.
//! No state, no I/O.
//!
//! # Addressing
//!
//! Nodes sit on a fixed `size × size` lattice. The address of any cell is
//! computed, never registered:
//!
//! ```text
//! address = base_address + grid_y * grid_size + grid_x
//! ```
//!
//! where the offset is applied to the base port. Any node can therefore reach
//! any other node without a directory lookup.
//!
//! # Neighborhood
//!
//! Each node talks only to its Moore neighborhood: the cells at Chebyshev
//! distance 1, clipped to the grid bounds (no wraparound).
//!
//! - corner cells have 3 neighbors
//! - edge cells have 5 neighbors
//! - interior cells have 8 neighbors

mod error;
mod grid;
mod neighbors;

pub use error::{Result, TopologyError};
pub use grid::{GridCoord, GridSpec};
pub use neighbors::{
    are_neighbors, expected_neighbor_count, moore_neighbors, neighbors_of, Neighbor, MOORE_DIRECTIONS,
};

/// Maximum number of neighbors of any cell (full Moore neighborhood).
pub const MOORE_CONNECTIONS: usize = 8;

/// Neighbor count of a corner cell on a grid of size ≥ 2.
pub const CORNER_CONNECTIONS: usize = 3;

/// Neighbor count of a non-corner edge cell on a grid of size ≥ 3.
pub const EDGE_CONNECTIONS: usize = 5;

const _: () = assert!(CORNER_CONNECTIONS < EDGE_CONNECTIONS && EDGE_CONNECTIONS < MOORE_CONNECTIONS);
