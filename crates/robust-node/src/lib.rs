//! Robust Node - one cell of a robust-first information diffusion grid
//!
//! Each node sits at a fixed grid position, talks UDP to its Moore
//! neighbors, and keeps a small store of decaying information items. Once a
//! second (by default) it pushes everything it holds to every neighbor and
//! spends one unit of energy per item. There is no coordinator, no
//! acknowledgement and no retransmission: redundancy across many paths is
//! what gets information through a grid with failing nodes.
//!
//! # Architecture
//!
//! - **Store**: per-node map of item id to energy, hops and provenance
//! - **Runtime**: the message state machine (no I/O)
//! - **Transport**: UDP socket with tuned buffers
//! - **Node**: concurrent listen and tick loops around one runtime
//! - **Admin Socket**: Unix socket for local commands (revive, inject, status)
//! - **Probe**: controller/monitor side of the protocol (robust-ctl CLI)
//! - **Launcher**: a whole grid as tasks in one process
//!
//! # Example
//!
//! ```no_run
//! use robust_node::{GridNode, NodeConfig};
//! use robust_topology::{GridCoord, GridSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let grid = GridSpec::new(5, "127.0.0.1:9000".parse()?)?;
//!     let config = NodeConfig::for_cell(grid, GridCoord::new(2, 2))?;
//!     let node = GridNode::bind(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod config;
pub mod error;
pub mod launcher;
pub mod node;
pub mod probe;
pub mod runtime;
pub mod store;
pub mod transport;

pub use config::{NodeArgs, NodeConfig};
pub use error::{Error, Result};
pub use launcher::GridLauncher;
pub use node::{GridNode, NodeHandle};
pub use probe::{GridSurvey, Probe, Seeded, SurveyStats};
pub use runtime::{Acceptance, NodeIdentity, NodeRuntime, Outbound};
pub use store::{Admission, InformationItem, InformationStore, Provenance};

/// Energy given to injected items when none is specified.
pub const DEFAULT_ENERGY: u64 = 10;
