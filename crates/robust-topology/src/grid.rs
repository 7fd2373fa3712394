//! Grid coordinates and the coordinate-to-address mapping.
//!
//! Coordinates are `(x, y)` with the origin in the top-left corner. The
//! linear index of a cell is `y * size + x`, which is also its port offset
//! from the grid's base address.

use std::net::SocketAddr;

use crate::error::{Result, TopologyError};

/// A cell position on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridCoord {
    /// Column
    pub x: u32,
    /// Row
    pub y: u32,
}

impl GridCoord {
    /// Top-left cell.
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    /// Create a new coordinate.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Chebyshev (king-move) distance between two cells.
    pub fn chebyshev_distance(&self, other: &Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Offset this coordinate by a signed step, if the result is non-negative.
    pub fn offset(&self, dx: i64, dy: i64) -> Option<Self> {
        let x = u32::try_from(i64::from(self.x) + dx).ok()?;
        let y = u32::try_from(i64::from(self.y) + dy).ok()?;
        Some(Self { x, y })
    }

    /// Conventional peer id for the node at this cell.
    pub fn peer_id(&self) -> String {
        format!("node_{}_{}", self.x, self.y)
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A validated square grid anchored at a base address.
///
/// Deserialization goes through [`GridSpec::new`], so a decoded grid is never
/// empty and never runs past the port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawGridSpec"))]
pub struct GridSpec {
    size: u32,
    base: SocketAddr,
}

/// Unchecked wire form of [`GridSpec`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawGridSpec {
    size: u32,
    base: SocketAddr,
}

#[cfg(feature = "serde")]
impl TryFrom<RawGridSpec> for GridSpec {
    type Error = TopologyError;

    fn try_from(raw: RawGridSpec) -> Result<Self> {
        Self::new(raw.size, raw.base)
    }
}

impl GridSpec {
    /// Create a grid of `size × size` cells whose first cell listens on `base`.
    ///
    /// Fails if the grid is empty or if the last cell's port would exceed 65535.
    pub fn new(size: u32, base: SocketAddr) -> Result<Self> {
        if size == 0 {
            return Err(TopologyError::EmptyGrid);
        }
        let cells = u64::from(size) * u64::from(size);
        if u64::from(base.port()) + cells - 1 > u64::from(u16::MAX) {
            return Err(TopologyError::PortOverflow {
                base_port: base.port(),
                size,
            });
        }
        Ok(Self { size, base })
    }

    /// Side length of the grid.
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Address of the cell at the origin.
    pub const fn base(&self) -> SocketAddr {
        self.base
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        (self.size as usize) * (self.size as usize)
    }

    /// Whether the coordinate lies on the grid.
    pub fn contains(&self, coord: GridCoord) -> bool {
        coord.x < self.size && coord.y < self.size
    }

    fn check(&self, coord: GridCoord) -> Result<()> {
        if self.contains(coord) {
            Ok(())
        } else {
            Err(TopologyError::OutOfBounds {
                coord,
                size: self.size,
            })
        }
    }

    /// Linear index (`y * size + x`) of a cell.
    pub fn index_of(&self, coord: GridCoord) -> Result<u32> {
        self.check(coord)?;
        Ok(coord.y * self.size + coord.x)
    }

    /// Inverse of [`index_of`](Self::index_of).
    pub fn coord_of(&self, index: u32) -> Option<GridCoord> {
        let coord = GridCoord::new(index % self.size, index / self.size);
        self.contains(coord).then_some(coord)
    }

    /// Computed network address of a cell.
    pub fn address_of(&self, coord: GridCoord) -> Result<SocketAddr> {
        let index = self.index_of(coord)?;
        let mut addr = self.base;
        // Bounded by the port-range check in `new`.
        addr.set_port(self.base.port() + index as u16);
        Ok(addr)
    }

    /// Cell that listens on `addr`, if any.
    pub fn coord_at(&self, addr: SocketAddr) -> Option<GridCoord> {
        if addr.ip() != self.base.ip() {
            return None;
        }
        let index = addr.port().checked_sub(self.base.port())?;
        self.coord_of(u32::from(index))
    }

    /// All cells in row-major order.
    pub fn coords(&self) -> impl Iterator<Item = GridCoord> + '_ {
        (0..self.size).flat_map(move |y| (0..self.size).map(move |x| GridCoord::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn address_formula() {
        let grid = GridSpec::new(5, base()).unwrap();
        assert_eq!(grid.address_of(GridCoord::new(0, 0)).unwrap().port(), 9000);
        assert_eq!(grid.address_of(GridCoord::new(3, 0)).unwrap().port(), 9003);
        assert_eq!(grid.address_of(GridCoord::new(2, 1)).unwrap().port(), 9007);
        assert_eq!(grid.address_of(GridCoord::new(4, 4)).unwrap().port(), 9024);
    }

    #[test]
    fn address_round_trips_to_coord() {
        let grid = GridSpec::new(4, base()).unwrap();
        for coord in grid.coords() {
            let addr = grid.address_of(coord).unwrap();
            assert_eq!(grid.coord_at(addr), Some(coord));
        }
        assert_eq!(grid.coord_at("127.0.0.1:9016".parse().unwrap()), None);
        assert_eq!(grid.coord_at("127.0.0.2:9000".parse().unwrap()), None);
    }

    #[test]
    fn out_of_bounds_rejected() {
        let grid = GridSpec::new(3, base()).unwrap();
        let err = grid.address_of(GridCoord::new(3, 0)).unwrap_err();
        assert_eq!(
            err,
            TopologyError::OutOfBounds {
                coord: GridCoord::new(3, 0),
                size: 3
            }
        );
    }

    #[test]
    fn empty_grid_rejected() {
        assert_eq!(GridSpec::new(0, base()).unwrap_err(), TopologyError::EmptyGrid);
    }

    #[test]
    fn port_overflow_rejected() {
        let high: SocketAddr = "127.0.0.1:65530".parse().unwrap();
        assert!(GridSpec::new(2, high).is_ok()); // 65530..=65533
        assert!(matches!(
            GridSpec::new(3, high),
            Err(TopologyError::PortOverflow { .. })
        ));
    }

    #[test]
    fn chebyshev_distance() {
        let a = GridCoord::new(1, 1);
        assert_eq!(a.chebyshev_distance(&GridCoord::new(1, 1)), 0);
        assert_eq!(a.chebyshev_distance(&GridCoord::new(0, 0)), 1);
        assert_eq!(a.chebyshev_distance(&GridCoord::new(4, 2)), 3);
    }

    #[test]
    fn coords_are_row_major() {
        let grid = GridSpec::new(2, base()).unwrap();
        let coords: Vec<_> = grid.coords().collect();
        assert_eq!(
            coords,
            vec![
                GridCoord::new(0, 0),
                GridCoord::new(1, 0),
                GridCoord::new(0, 1),
                GridCoord::new(1, 1)
            ]
        );
    }

    #[test]
    fn peer_id_format() {
        assert_eq!(GridCoord::new(2, 7).peer_id(), "node_2_7");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_validates_grid() {
        let grid: GridSpec = serde_json::from_str(r#"{"size":3,"base":"127.0.0.1:9000"}"#).unwrap();
        assert_eq!(grid, GridSpec::new(3, base()).unwrap());
        assert_eq!(serde_json::to_string(&grid).unwrap(), r#"{"size":3,"base":"127.0.0.1:9000"}"#);

        let empty = serde_json::from_str::<GridSpec>(r#"{"size":0,"base":"127.0.0.1:9000"}"#);
        assert!(empty.unwrap_err().to_string().contains("at least 1"));
        assert!(serde_json::from_str::<GridSpec>(r#"{"size":3,"base":"127.0.0.1:65530"}"#).is_err());
    }
}
