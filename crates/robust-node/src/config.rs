//! Node startup configuration.
//!
//! A node needs its grid position, the grid size and the grid's base
//! address; everything else has a default. Configuration is validated in
//! full before the node opens its socket, so a bad launch never leaves a
//! half-initialized node on the network.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use robust_topology::{GridCoord, GridSpec};

use crate::error::{Error, Result};

/// Default tick period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default socket buffer size (send and receive).
pub const DEFAULT_SOCKET_BUFFER: usize = 1024 * 1024;

/// Configuration for a single grid node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Peer id used as `sender_id` on every outbound message
    pub node_id: String,

    /// Grid this node belongs to
    pub grid: GridSpec,

    /// Position on the grid
    pub coord: GridCoord,

    /// Address to bind; must equal the computed grid address
    pub bind: SocketAddr,

    /// Spread/decay period
    pub tick_interval: Duration,

    /// Socket send buffer in bytes
    pub sndbuf: usize,

    /// Socket receive buffer in bytes
    pub rcvbuf: usize,

    /// Local admin socket path (revive, inject, status)
    pub admin_socket: Option<PathBuf>,
}

impl NodeConfig {
    /// Defaults for the node at `coord`: conventional id, computed address.
    pub fn for_cell(grid: GridSpec, coord: GridCoord) -> Result<Self> {
        Ok(Self {
            node_id: coord.peer_id(),
            bind: grid.address_of(coord)?,
            grid,
            coord,
            tick_interval: DEFAULT_TICK_INTERVAL,
            sndbuf: DEFAULT_SOCKET_BUFFER,
            rcvbuf: DEFAULT_SOCKET_BUFFER,
            admin_socket: None,
        })
    }

    /// Override the node id.
    #[must_use]
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Set the tick period.
    #[must_use]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Enable the local admin socket.
    #[must_use]
    pub fn with_admin_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.admin_socket = Some(path.into());
        self
    }

    /// Reject anything that would leave the node unreachable or misbehaving.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(Error::Config("node id must not be empty".into()));
        }
        let expected = self.grid.address_of(self.coord)?;
        if self.bind != expected {
            return Err(Error::Config(format!(
                "bind address {} does not match grid address {} for {}",
                self.bind, expected, self.coord
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(Error::Config("tick interval must be positive".into()));
        }
        if self.sndbuf == 0 || self.rcvbuf == 0 {
            return Err(Error::Config("socket buffers must be positive".into()));
        }
        Ok(())
    }
}

/// Command-line arguments for `robust-node`.
#[derive(Debug, Clone, Parser)]
#[command(name = "robust-node", about = "Run one node of a robust-first diffusion grid")]
pub struct NodeArgs {
    /// Node id (defaults to node_{x}_{y})
    #[arg(long = "id", env = "ROBUST_NODE_ID")]
    pub node_id: Option<String>,

    /// Grid column
    #[arg(long, env = "ROBUST_GRID_X")]
    pub grid_x: u32,

    /// Grid row
    #[arg(long, env = "ROBUST_GRID_Y")]
    pub grid_y: u32,

    /// Side length of the grid
    #[arg(long, env = "ROBUST_GRID_SIZE", default_value_t = 5)]
    pub grid_size: u32,

    /// Address of cell (0, 0)
    #[arg(long, env = "ROBUST_BASE_ADDR", default_value = "127.0.0.1:9000")]
    pub base_addr: SocketAddr,

    /// Override the port of --base-addr
    #[arg(long, env = "ROBUST_BASE_PORT")]
    pub base_port: Option<u16>,

    /// Port to bind (defaults to the computed grid port)
    #[arg(long, env = "ROBUST_PORT")]
    pub port: Option<u16>,

    /// Tick period in milliseconds
    #[arg(long, env = "ROBUST_TICK_MS", default_value_t = 1000)]
    pub tick_ms: u64,

    /// Socket send buffer in bytes
    #[arg(long, env = "ROBUST_SNDBUF", default_value_t = DEFAULT_SOCKET_BUFFER)]
    pub sndbuf: usize,

    /// Socket receive buffer in bytes
    #[arg(long, env = "ROBUST_RCVBUF", default_value_t = DEFAULT_SOCKET_BUFFER)]
    pub rcvbuf: usize,

    /// Path of the local admin socket
    #[arg(long, env = "ROBUST_ADMIN_SOCKET")]
    pub admin_socket: Option<PathBuf>,
}

impl NodeArgs {
    /// Build and validate a [`NodeConfig`].
    pub fn into_config(self) -> Result<NodeConfig> {
        let mut base = self.base_addr;
        if let Some(port) = self.base_port {
            base.set_port(port);
        }
        let grid = GridSpec::new(self.grid_size, base)?;
        let coord = GridCoord::new(self.grid_x, self.grid_y);
        if !grid.contains(coord) {
            return Err(Error::Config(format!(
                "position {} is outside a {}x{} grid",
                coord, self.grid_size, self.grid_size
            )));
        }

        let mut config = NodeConfig::for_cell(grid, coord)?
            .with_tick_interval(Duration::from_millis(self.tick_ms));
        if let Some(node_id) = self.node_id {
            config = config.with_node_id(node_id);
        }
        if let Some(port) = self.port {
            config.bind.set_port(port);
        }
        config.sndbuf = self.sndbuf;
        config.rcvbuf = self.rcvbuf;
        config.admin_socket = self.admin_socket;

        config.validate()?;
        Ok(config)
    }
}
