//! Grid probe - the controller/monitor side of the protocol.
//!
//! A probe owns an ephemeral UDP socket and talks to nodes exactly like the
//! launcher and the monitor do: it injects information, sends `die`, and
//! pings for status. It is meant for sequential use; two concurrent pings on
//! one probe may observe each other's pongs.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use rand::Rng;
use robust_protocol::{Energy, Message, NodeStatus};
use robust_topology::{GridCoord, GridSpec};
use tokio::time::Instant;
use tracing::info;

use crate::error::{Error, Result};
use crate::transport::{Datagram, Transport};

/// Sender id used by the command-line controller.
pub const CONTROLLER_ID: &str = "controller";

/// Energy given to randomly seeded items.
pub const SEED_ENERGY: Energy = 15;

/// Items seeded when no count is given.
pub const DEFAULT_SEED_COUNT: usize = 3;

/// Share of the grid killed when no fraction is given.
pub const DEFAULT_KILL_FRACTION: f64 = 0.2;

/// Nodes listed individually in a survey report.
const REPORT_NODES: usize = 10;

/// Item ids listed per node in a survey report.
const REPORT_ITEMS: usize = 3;

/// One randomly seeded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seeded {
    pub coord: GridCoord,
    pub info_id: String,
}

/// Cells to seed `count` items at. Each pick is independent, so a cell may
/// be chosen more than once.
pub fn pick_seed_cells<R: Rng + ?Sized>(grid: &GridSpec, count: usize, rng: &mut R) -> Vec<GridCoord> {
    let cells: Vec<GridCoord> = grid.coords().collect();
    (0..count).filter_map(|_| cells.choose(rng).copied()).collect()
}

/// Distinct cells making up `fraction` of the grid, rounded down.
pub fn pick_kill_cells<R: Rng + ?Sized>(
    grid: &GridSpec,
    fraction: f64,
    rng: &mut R,
) -> Result<Vec<GridCoord>> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(Error::InvalidFraction(fraction));
    }
    let cells: Vec<GridCoord> = grid.coords().collect();
    let amount = (cells.len() as f64 * fraction) as usize;
    let mut picked: Vec<GridCoord> = cells.choose_multiple(rng, amount).copied().collect();
    picked.sort_unstable();
    Ok(picked)
}

/// Controller/monitor endpoint.
pub struct Probe {
    transport: Transport,
    sender_id: String,
}

impl Probe {
    /// Bind an ephemeral socket on `ip`.
    pub async fn bind(ip: IpAddr, sender_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            transport: Transport::ephemeral(ip).await?,
            sender_id: sender_id.into(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Send an arbitrary message.
    pub async fn send(&self, addr: SocketAddr, message: &Message) -> Result<()> {
        self.transport.send(addr, message).await
    }

    /// Hand a node a fresh item, as if received from a zero-hop neighbor.
    pub async fn inject(
        &self,
        addr: SocketAddr,
        info_id: &str,
        content: &str,
        energy: Energy,
    ) -> Result<()> {
        let message = Message::information(self.sender_id.clone(), info_id, content, energy, 0);
        self.send(addr, &message).await
    }

    /// Tell a node to die.
    pub async fn kill(&self, addr: SocketAddr) -> Result<()> {
        self.send(addr, &Message::die(self.sender_id.clone())).await
    }

    /// Ping one node. `None` means no pong within `timeout`.
    pub async fn ping(&self, addr: SocketAddr, timeout: Duration) -> Result<Option<NodeStatus>> {
        self.send(addr, &Message::ping(self.sender_id.clone())).await?;

        let deadline = Instant::now() + timeout;
        while let Some(datagram) = self.recv_until(deadline).await {
            if datagram.from != addr {
                continue;
            }
            if let Ok(Message::Pong { status, .. }) = datagram.decode() {
                return Ok(Some(status));
            }
        }
        Ok(None)
    }

    /// Ping every cell and collect the pongs that arrive within `timeout`.
    pub async fn survey(&self, grid: &GridSpec, timeout: Duration) -> Result<GridSurvey> {
        let ping = Message::ping(self.sender_id.clone());
        for coord in grid.coords() {
            let addr = grid.address_of(coord)?;
            if let Err(e) = self.send(addr, &ping).await {
                tracing::debug!("Ping to {} failed: {}", addr, e);
            }
        }

        let mut statuses = BTreeMap::new();
        let deadline = Instant::now() + timeout;
        while statuses.len() < grid.cell_count() {
            let Some(datagram) = self.recv_until(deadline).await else {
                break;
            };
            let Some(coord) = grid.coord_at(datagram.from) else {
                continue;
            };
            if let Ok(Message::Pong { status, .. }) = datagram.decode() {
                statuses.insert(coord, status);
            }
        }

        Ok(GridSurvey {
            size: grid.size(),
            statuses,
        })
    }

    /// Inject `count` fresh items at random cells, `info_{i}_{unix seconds}`
    /// each, with `energy`.
    pub async fn seed<R: Rng + ?Sized>(
        &self,
        grid: &GridSpec,
        count: usize,
        energy: Energy,
        rng: &mut R,
    ) -> Result<Vec<Seeded>> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut seeded = Vec::with_capacity(count);
        for (i, coord) in pick_seed_cells(grid, count, rng).into_iter().enumerate() {
            let info_id = format!("info_{}_{}", i, stamp);
            let content = format!("Information package {} seeded at {}", i, stamp);
            self.inject(grid.address_of(coord)?, &info_id, &content, energy).await?;
            info!("Seeded '{}' at {} with energy {}", info_id, coord, energy);
            seeded.push(Seeded { coord, info_id });
        }
        Ok(seeded)
    }

    /// Send `die` to a random `fraction` of the grid.
    pub async fn kill_random<R: Rng + ?Sized>(
        &self,
        grid: &GridSpec,
        fraction: f64,
        rng: &mut R,
    ) -> Result<Vec<GridCoord>> {
        let victims = pick_kill_cells(grid, fraction, rng)?;
        info!("Killing {} random nodes", victims.len());
        for &coord in &victims {
            self.kill(grid.address_of(coord)?).await?;
        }
        Ok(victims)
    }

    async fn recv_until(&self, deadline: Instant) -> Option<Datagram> {
        loop {
            match tokio::time::timeout_at(deadline, self.transport.recv()).await {
                Err(_) => return None,
                Ok(Ok(datagram)) => return Some(datagram),
                Ok(Err(e)) => tracing::debug!("Probe recv error: {}", e),
            }
        }
    }
}

/// Aggregate view of one survey, over the nodes that answered alive.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyStats {
    /// Cells on the grid
    pub cells: usize,
    /// Nodes that answered alive
    pub alive: usize,
    /// Items held across all alive nodes
    pub total_items: usize,
    /// Mean generation of alive nodes
    pub average_generation: Option<f64>,
    /// Largest store among alive nodes
    pub max_items: Option<usize>,
    /// Alive nodes holding at least one item
    pub nodes_with_items: usize,
    /// Holder count per item id
    pub spread: BTreeMap<String, usize>,
}

impl SurveyStats {
    /// Alive nodes as a percentage of the grid.
    pub fn alive_percent(&self) -> f64 {
        if self.cells == 0 {
            return 0.0;
        }
        self.alive as f64 * 100.0 / self.cells as f64
    }
}

/// Result of pinging every cell once.
#[derive(Debug, Clone)]
pub struct GridSurvey {
    size: u32,
    statuses: BTreeMap<GridCoord, NodeStatus>,
}

impl GridSurvey {
    /// Status of the node at `coord`, if it answered.
    pub fn status(&self, coord: GridCoord) -> Option<&NodeStatus> {
        self.statuses.get(&coord)
    }

    /// Nodes that answered.
    pub fn responding(&self) -> usize {
        self.statuses.len()
    }

    /// Nodes that answered and report themselves alive.
    pub fn alive(&self) -> usize {
        self.statuses.values().filter(|s| s.alive).count()
    }

    /// Cells whose node reports holding `info_id`.
    pub fn holders(&self, info_id: &str) -> Vec<GridCoord> {
        self.statuses
            .iter()
            .filter(|(_, status)| status.holds(info_id))
            .map(|(coord, _)| *coord)
            .collect()
    }

    /// Totals over the nodes that answered alive.
    pub fn stats(&self) -> SurveyStats {
        let alive: Vec<&NodeStatus> = self.statuses.values().filter(|s| s.alive).collect();
        let mut spread = BTreeMap::new();
        for status in &alive {
            for info_id in status.information.keys() {
                *spread.entry(info_id.clone()).or_insert(0) += 1;
            }
        }
        SurveyStats {
            cells: self.size as usize * self.size as usize,
            alive: alive.len(),
            total_items: alive.iter().map(|s| s.information_count).sum(),
            average_generation: (!alive.is_empty())
                .then(|| alive.iter().map(|s| s.generation as f64).sum::<f64>() / alive.len() as f64),
            max_items: alive.iter().map(|s| s.information_count).max(),
            nodes_with_items: alive.iter().filter(|s| s.information_count > 0).count(),
            spread,
        }
    }

    /// The grid map followed by statistics and the nodes holding information.
    pub fn report(&self) -> String {
        let stats = self.stats();
        let mut out = self.render();
        let _ = writeln!(
            out,
            "Network: {}/{} nodes alive ({:.1}%)",
            stats.alive,
            stats.cells,
            stats.alive_percent()
        );
        let _ = writeln!(out, "Information packets: {}", stats.total_items);
        if let (Some(generation), Some(max_items)) = (stats.average_generation, stats.max_items) {
            let _ = writeln!(out, "Average generation: {:.1}", generation);
            let _ = writeln!(out, "Max items per node: {}", max_items);
            let _ = writeln!(
                out,
                "Information spread: {}/{} nodes have data",
                stats.nodes_with_items, stats.alive
            );
            for (info_id, holders) in &stats.spread {
                let _ = writeln!(out, "  {}: {} nodes", info_id, holders);
            }
        }

        let holding: Vec<(&GridCoord, &NodeStatus)> = self
            .statuses
            .iter()
            .filter(|(_, s)| s.alive && s.information_count > 0)
            .collect();
        if holding.is_empty() {
            out.push_str("No nodes currently have information\n");
            return out;
        }
        out.push_str("Nodes with information:\n");
        for (coord, status) in holding.iter().take(REPORT_NODES) {
            let ids: Vec<&str> = status.information.keys().take(REPORT_ITEMS).map(String::as_str).collect();
            let mut listed = ids.join(", ");
            if status.information.len() > REPORT_ITEMS {
                let _ = write!(listed, " (+{} more)", status.information.len() - REPORT_ITEMS);
            }
            let _ = writeln!(
                out,
                "  {}: {} items [{}]",
                coord.peer_id(),
                status.information_count,
                listed
            );
        }
        if holding.len() > REPORT_NODES {
            let _ = writeln!(out, "  ... and {} more nodes", holding.len() - REPORT_NODES);
        }
        out
    }

    /// Text map of the grid: `#` alive (followed by its item count), `x` dead,
    /// `.` no answer.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for y in 0..self.size {
            let mut row = String::new();
            for x in 0..self.size {
                let _ = match self.statuses.get(&GridCoord::new(x, y)) {
                    Some(status) if status.alive => write!(row, "#{:<3}", status.information_count),
                    Some(_) => write!(row, "{:<4}", 'x'),
                    None => write!(row, "{:<4}", '.'),
                };
            }
            out.push_str(row.trim_end());
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "{}/{} responding, {} alive",
            self.responding(),
            self.size as usize * self.size as usize,
            self.alive()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(alive: bool, x: u32, y: u32, info: &[&str]) -> NodeStatus {
        NodeStatus {
            alive,
            grid_x: x,
            grid_y: y,
            information_count: info.len(),
            information: info
                .iter()
                .map(|id| (id.to_string(), robust_protocol::ItemSummary { energy: 1, hops: 1 }))
                .collect(),
            generation: 0,
            neighbors: 3,
        }
    }

    #[test]
    fn survey_render_marks_each_cell() {
        let mut statuses = BTreeMap::new();
        statuses.insert(GridCoord::new(0, 0), status(true, 0, 0, &["a"]));
        statuses.insert(GridCoord::new(1, 0), status(false, 1, 0, &[]));
        statuses.insert(GridCoord::new(1, 1), status(true, 1, 1, &["a", "b"]));
        let survey = GridSurvey { size: 2, statuses };

        assert_eq!(survey.render(), "#1  x\n.   #2\n3/4 responding, 2 alive\n");
        assert_eq!(survey.holders("a"), vec![GridCoord::new(0, 0), GridCoord::new(1, 1)]);
        assert_eq!(survey.holders("b"), vec![GridCoord::new(1, 1)]);
        assert!(survey.status(GridCoord::new(0, 1)).is_none());
    }

    #[test]
    fn survey_stats_count_alive_nodes_only() {
        let mut statuses = BTreeMap::new();
        let mut busy = status(true, 0, 0, &["a", "b", "c", "d"]);
        busy.generation = 10;
        statuses.insert(GridCoord::new(0, 0), busy);
        statuses.insert(GridCoord::new(1, 0), status(false, 1, 0, &[]));
        let mut quiet = status(true, 1, 1, &["a"]);
        quiet.generation = 5;
        statuses.insert(GridCoord::new(1, 1), quiet);
        let survey = GridSurvey { size: 2, statuses };

        let stats = survey.stats();
        assert_eq!(stats.alive, 2);
        assert_eq!(stats.total_items, 5);
        assert_eq!(stats.max_items, Some(4));
        assert_eq!(stats.nodes_with_items, 2);
        assert_eq!(stats.average_generation, Some(7.5));
        assert_eq!(stats.alive_percent(), 50.0);
        assert_eq!(stats.spread.get("a"), Some(&2));
        assert_eq!(stats.spread.get("d"), Some(&1));

        let report = survey.report();
        assert!(report.starts_with(&survey.render()));
        assert!(report.contains("Network: 2/4 nodes alive (50.0%)\n"));
        assert!(report.contains("Information packets: 5\n"));
        assert!(report.contains("Average generation: 7.5\n"));
        assert!(report.contains("Max items per node: 4\n"));
        assert!(report.contains("Information spread: 2/2 nodes have data\n"));
        assert!(report.contains("  node_0_0: 4 items [a, b, c (+1 more)]\n"));
        assert!(report.contains("  node_1_1: 1 items [a]\n"));
    }

    #[test]
    fn empty_survey_reports_no_information() {
        let survey = GridSurvey {
            size: 3,
            statuses: BTreeMap::new(),
        };
        let stats = survey.stats();
        assert_eq!(stats.average_generation, None);
        assert_eq!(stats.max_items, None);
        assert!(survey.report().ends_with("Network: 0/9 nodes alive (0.0%)\nInformation packets: 0\nNo nodes currently have information\n"));
    }

    #[test]
    fn random_picks_stay_on_grid() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let grid = GridSpec::new(4, "127.0.0.1:9000".parse().unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let seeds = pick_seed_cells(&grid, 20, &mut rng);
        assert_eq!(seeds.len(), 20);
        assert!(seeds.iter().all(|c| grid.contains(*c)));

        let victims = pick_kill_cells(&grid, 0.3, &mut rng).unwrap();
        // int(16 * 0.3) distinct cells
        assert_eq!(victims.len(), 4);
        let mut distinct = victims.clone();
        distinct.dedup();
        assert_eq!(distinct, victims);

        assert!(pick_kill_cells(&grid, 0.0, &mut rng).unwrap().is_empty());
        assert_eq!(pick_kill_cells(&grid, 1.0, &mut rng).unwrap().len(), 16);
        assert!(pick_kill_cells(&grid, 1.5, &mut rng).is_err());
        assert!(pick_kill_cells(&grid, f64::NAN, &mut rng).is_err());
    }

    #[tokio::test]
    async fn ping_without_node_times_out() {
        let probe = Probe::bind("127.0.0.1".parse().unwrap(), CONTROLLER_ID).await.unwrap();
        // Nothing listens on a port we just released.
        let addr = {
            let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
            socket.local_addr().unwrap()
        };
        let answer = probe.ping(addr, Duration::from_millis(100)).await.unwrap();
        assert!(answer.is_none());
    }

    #[tokio::test]
    async fn inject_and_kill_produce_wire_messages() {
        let probe = Probe::bind("127.0.0.1".parse().unwrap(), CONTROLLER_ID).await.unwrap();
        let target = Transport::ephemeral("127.0.0.1".parse().unwrap()).await.unwrap();
        let addr = target.local_addr().unwrap();

        probe.inject(addr, "news", "hello", 10).await.unwrap();
        let received = target.recv().await.unwrap().decode().unwrap();
        assert_eq!(received, Message::information(CONTROLLER_ID, "news", "hello", 10, 0));

        probe.kill(addr).await.unwrap();
        let received = target.recv().await.unwrap().decode().unwrap();
        assert_eq!(received, Message::die(CONTROLLER_ID));
    }
}
