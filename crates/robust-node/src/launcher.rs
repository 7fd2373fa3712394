//! Grid launcher - every cell of a grid as a task in one process.
//!
//! All sockets are bound before any node starts running, so a port clash on
//! any cell aborts the launch without leaving half a grid behind. The
//! launcher owns its handles; there is no process-wide registry.

use std::time::Duration;

use robust_topology::{GridCoord, GridSpec};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::node::{GridNode, NodeHandle};

/// A running grid: one [`GridNode`] task per cell.
pub struct GridLauncher {
    grid: GridSpec,
    tick_interval: Duration,
    handles: Vec<NodeHandle>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl GridLauncher {
    /// Bind every cell of `grid`, then start them all.
    pub async fn start(grid: GridSpec, tick_interval: Duration) -> Result<Self> {
        let mut nodes = Vec::with_capacity(grid.cell_count());
        for coord in grid.coords() {
            let config = NodeConfig::for_cell(grid, coord)?.with_tick_interval(tick_interval);
            nodes.push(GridNode::bind(config).await?);
        }

        let handles: Vec<NodeHandle> = nodes.iter().map(GridNode::handle).collect();
        let tasks = nodes.into_iter().map(|node| tokio::spawn(node.run())).collect();
        info!(
            "Started {}x{} grid ({} nodes) at {}",
            grid.size(),
            grid.size(),
            handles.len(),
            grid.base()
        );

        Ok(Self {
            grid,
            tick_interval,
            handles,
            tasks,
        })
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Handles in row-major cell order.
    pub fn handles(&self) -> &[NodeHandle] {
        &self.handles
    }

    /// Handle of the node at `coord`.
    pub fn handle(&self, coord: GridCoord) -> Option<&NodeHandle> {
        let index = self.grid.index_of(coord).ok()?;
        self.handles.get(index as usize)
    }

    /// Node tasks that have not returned yet.
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }

    /// Stop every node and wait for all of them.
    ///
    /// Every task is awaited even if one failed; the first failure is returned.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down {} nodes", self.handles.len());
        for handle in &self.handles {
            handle.shutdown();
        }

        let mut first_error = None;
        for (handle, task) in self.handles.iter().zip(self.tasks) {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Node {} failed: {}", handle.id(), e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => error!("Node {} terminated abnormally: {}", handle.id(), e),
            }
        }
        info!("Grid shutdown complete");
        first_error.map_or(Ok(()), Err)
    }

    /// Stop the whole grid and start it again on the same ports.
    ///
    /// Every node comes back alive with an empty store and generation 0.
    pub async fn restart(self) -> Result<Self> {
        let (grid, tick_interval) = (self.grid, self.tick_interval);
        self.shutdown().await?;
        Self::start(grid, tick_interval).await
    }
}
