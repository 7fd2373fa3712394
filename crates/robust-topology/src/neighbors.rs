//! Moore Neighborhood Computation
//!
//! A node's neighbors are every cell within Chebyshev distance 1, excluding
//! itself and anything off the grid. The relation is symmetric: if A is a
//! neighbor of B, B is a neighbor of A.

use std::net::SocketAddr;

use crate::error::Result;
use crate::{GridCoord, GridSpec, MOORE_CONNECTIONS};

/// The eight king-move steps, row by row.
pub const MOORE_DIRECTIONS: [(i64, i64); MOORE_CONNECTIONS] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A neighboring peer as seen from one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Neighbor {
    /// Peer id (`node_{x}_{y}`)
    pub id: String,
    /// Computed address
    pub addr: SocketAddr,
    /// Grid position
    pub coord: GridCoord,
}

/// Cells in the Moore neighborhood of `coord`, clipped to the grid.
pub fn moore_neighbors(grid: &GridSpec, coord: GridCoord) -> Vec<GridCoord> {
    MOORE_DIRECTIONS
        .iter()
        .filter_map(|&(dx, dy)| coord.offset(dx, dy))
        .filter(|&c| grid.contains(c))
        .collect()
}

/// Full neighbor records (id, address, coordinate) for the node at `coord`.
///
/// Fails only if `coord` itself is off the grid.
pub fn neighbors_of(grid: &GridSpec, coord: GridCoord) -> Result<Vec<Neighbor>> {
    grid.index_of(coord)?;
    moore_neighbors(grid, coord)
        .into_iter()
        .map(|c| {
            Ok(Neighbor {
                id: c.peer_id(),
                addr: grid.address_of(c)?,
                coord: c,
            })
        })
        .collect()
}

/// Check if two distinct cells are Moore neighbors.
pub fn are_neighbors(a: GridCoord, b: GridCoord) -> bool {
    a != b && a.chebyshev_distance(&b) == 1
}

/// How many neighbors a cell should have, from its position alone.
///
/// `None` if `coord` is off the grid.
pub fn expected_neighbor_count(grid: &GridSpec, coord: GridCoord) -> Option<usize> {
    if !grid.contains(coord) {
        return None;
    }
    let span = |v: u32| -> usize {
        let lo = v.saturating_sub(1);
        let hi = v.saturating_add(1).min(grid.size() - 1);
        (hi - lo + 1) as usize
    };
    Some(span(coord.x) * span(coord.y) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CORNER_CONNECTIONS, EDGE_CONNECTIONS};
    use proptest::prelude::*;

    fn grid(size: u32) -> GridSpec {
        GridSpec::new(size, "127.0.0.1:9000".parse().unwrap()).unwrap()
    }

    #[test]
    fn directions_are_unique_and_unit() {
        for i in 0..MOORE_DIRECTIONS.len() {
            let (dx, dy) = MOORE_DIRECTIONS[i];
            assert!(dx.abs().max(dy.abs()) == 1);
            for j in (i + 1)..MOORE_DIRECTIONS.len() {
                assert_ne!(MOORE_DIRECTIONS[i], MOORE_DIRECTIONS[j]);
            }
        }
    }

    #[test]
    fn corner_edge_interior_counts() {
        let g = grid(3);
        assert_eq!(moore_neighbors(&g, GridCoord::new(0, 0)).len(), CORNER_CONNECTIONS);
        assert_eq!(moore_neighbors(&g, GridCoord::new(2, 2)).len(), CORNER_CONNECTIONS);
        assert_eq!(moore_neighbors(&g, GridCoord::new(1, 0)).len(), EDGE_CONNECTIONS);
        assert_eq!(moore_neighbors(&g, GridCoord::new(0, 1)).len(), EDGE_CONNECTIONS);
        assert_eq!(moore_neighbors(&g, GridCoord::new(1, 1)).len(), MOORE_CONNECTIONS);
    }

    #[test]
    fn single_cell_grid_is_isolated() {
        let g = grid(1);
        assert!(moore_neighbors(&g, GridCoord::ORIGIN).is_empty());
        assert_eq!(expected_neighbor_count(&g, GridCoord::ORIGIN), Some(0));
    }

    #[test]
    fn expected_count_off_grid_is_none() {
        let g = grid(3);
        assert_eq!(expected_neighbor_count(&g, GridCoord::new(10, 10)), None);
        assert_eq!(expected_neighbor_count(&g, GridCoord::new(3, 0)), None);
        assert_eq!(expected_neighbor_count(&g, GridCoord::new(u32::MAX, u32::MAX)), None);
        assert_eq!(expected_neighbor_count(&g, GridCoord::new(2, 2)), Some(CORNER_CONNECTIONS));
    }

    #[test]
    fn neighbor_records_carry_computed_addresses() {
        let g = grid(3);
        let records = neighbors_of(&g, GridCoord::new(0, 0)).unwrap();
        let mut ports: Vec<u16> = records.iter().map(|n| n.addr.port()).collect();
        ports.sort_unstable();
        assert_eq!(ports, vec![9001, 9003, 9004]);
        assert!(records.iter().any(|n| n.id == "node_1_1"));
    }

    #[test]
    fn neighbors_of_off_grid_fails() {
        let g = grid(3);
        assert!(neighbors_of(&g, GridCoord::new(5, 5)).is_err());
    }

    #[test]
    fn no_wraparound() {
        let g = grid(4);
        let ns = moore_neighbors(&g, GridCoord::new(0, 0));
        assert!(!ns.contains(&GridCoord::new(3, 0)));
        assert!(!ns.contains(&GridCoord::new(0, 3)));
    }

    proptest! {
        #[test]
        fn neighbor_relation_symmetric(size in 1u32..12, ax in 0u32..12, ay in 0u32..12) {
            let g = grid(size);
            let a = GridCoord::new(ax % size, ay % size);
            for b in moore_neighbors(&g, a) {
                prop_assert!(moore_neighbors(&g, b).contains(&a));
                prop_assert!(are_neighbors(a, b));
            }
        }

        #[test]
        fn neighbor_count_matches_position(size in 3u32..12, ax in 0u32..12, ay in 0u32..12) {
            let g = grid(size);
            let a = GridCoord::new(ax % size, ay % size);
            let on_x_edge = a.x == 0 || a.x == size - 1;
            let on_y_edge = a.y == 0 || a.y == size - 1;
            let expected = match (on_x_edge, on_y_edge) {
                (true, true) => CORNER_CONNECTIONS,
                (true, false) | (false, true) => EDGE_CONNECTIONS,
                (false, false) => MOORE_CONNECTIONS,
            };
            prop_assert_eq!(moore_neighbors(&g, a).len(), expected);
            prop_assert_eq!(expected_neighbor_count(&g, a), Some(expected));
        }

        #[test]
        fn neighbors_never_include_self(size in 1u32..12, ax in 0u32..12, ay in 0u32..12) {
            let g = grid(size);
            let a = GridCoord::new(ax % size, ay % size);
            prop_assert!(!moore_neighbors(&g, a).contains(&a));
        }
    }
}
