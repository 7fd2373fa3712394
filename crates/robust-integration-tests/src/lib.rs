//! Simulated grid network for multi-node diffusion tests.
//!
//! Drives one [`NodeRuntime`] per cell in lockstep rounds:
//!
//! 1. every node ticks (row-major order), queueing its datagrams
//! 2. every queued datagram is encoded, decoded and delivered
//!
//! Datagrams go through the real codec so the wire format is exercised.
//! Routing is by address, exactly like UDP: a datagram to an address with no
//! node, or over a cut link, is lost. Replies addressed to the controller
//! (the monitor's address, `base_port - 1`) land in the controller inbox.
//!
//! Nothing here is global: every test builds its own network.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::SocketAddr;

use robust_node::{NodeConfig, NodeRuntime, Outbound};
use robust_protocol::{Energy, Message, NodeStatus};
use robust_topology::{GridCoord, GridSpec};

/// Sender id the simulated controller uses.
pub const CONTROLLER_ID: &str = "controller";

/// Per-round delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
    /// Datagrams that reached a node
    pub delivered: usize,
    /// Datagrams lost (no node at the address, cut link, codec failure)
    pub lost: usize,
}

/// Snapshot of the whole network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStats {
    pub rounds: u64,
    pub alive: usize,
    pub items_held: usize,
    pub delivered: usize,
    pub lost: usize,
}

/// A full grid of runtimes wired together by a lossless in-memory network.
pub struct SimNetwork {
    grid: GridSpec,
    controller: SocketAddr,
    nodes: BTreeMap<SocketAddr, NodeRuntime>,
    cut_links: BTreeSet<(SocketAddr, SocketAddr)>,
    in_flight: VecDeque<(SocketAddr, Outbound)>,
    inbox: Vec<(SocketAddr, Message)>,
    rounds: u64,
    delivered: usize,
    lost: usize,
}

impl SimNetwork {
    /// Build a `size × size` grid whose cell (0, 0) listens on `127.0.0.1:base_port`.
    ///
    /// Panics on an invalid grid; this is test scaffolding.
    pub fn new(size: u32, base_port: u16) -> Self {
        assert!(base_port > 0, "controller needs base_port - 1");
        let grid = GridSpec::new(size, SocketAddr::from(([127, 0, 0, 1], base_port)))
            .unwrap_or_else(|e| panic!("invalid grid: {}", e));

        let nodes = grid
            .coords()
            .map(|coord| {
                let config = NodeConfig::for_cell(grid, coord)
                    .unwrap_or_else(|e| panic!("invalid cell {}: {}", coord, e));
                let runtime = NodeRuntime::new(&config)
                    .unwrap_or_else(|e| panic!("runtime for {}: {}", coord, e));
                (config.bind, runtime)
            })
            .collect();

        Self {
            grid,
            controller: SocketAddr::from(([127, 0, 0, 1], base_port - 1)),
            nodes,
            cut_links: BTreeSet::new(),
            in_flight: VecDeque::new(),
            inbox: Vec::new(),
            rounds: 0,
            delivered: 0,
            lost: 0,
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Address of the simulated controller/monitor.
    pub fn controller(&self) -> SocketAddr {
        self.controller
    }

    fn addr(&self, coord: GridCoord) -> SocketAddr {
        self.grid
            .address_of(coord)
            .unwrap_or_else(|e| panic!("{} is not on the grid: {}", coord, e))
    }

    /// Runtime at `coord`.
    pub fn node(&self, coord: GridCoord) -> &NodeRuntime {
        let addr = self.addr(coord);
        &self.nodes[&addr]
    }

    /// Mutable runtime at `coord` (local operations: inject, revive).
    pub fn node_mut(&mut self, coord: GridCoord) -> &mut NodeRuntime {
        let addr = self.addr(coord);
        self.nodes
            .get_mut(&addr)
            .unwrap_or_else(|| panic!("no node at {}", coord))
    }

    /// Drop every datagram between `a` and `b`, both directions.
    pub fn cut_link(&mut self, a: GridCoord, b: GridCoord) {
        let (a, b) = (self.addr(a), self.addr(b));
        self.cut_links.insert((a, b));
        self.cut_links.insert((b, a));
    }

    /// Queue a datagram from the controller, delivered at the end of the next round.
    pub fn send(&mut self, to: GridCoord, message: Message) {
        let to = self.addr(to);
        self.in_flight
            .push_back((self.controller, Outbound { to, message }));
    }

    /// Controller-style injection: an information datagram with hops 0.
    pub fn inject(&mut self, at: GridCoord, info_id: &str, content: &str, energy: Energy) {
        self.send(at, Message::information(CONTROLLER_ID, info_id, content, energy, 0));
    }

    /// Controller-style kill: a `die` datagram.
    pub fn kill(&mut self, at: GridCoord) {
        self.send(at, Message::die(CONTROLLER_ID));
    }

    /// Deliver whatever the controller has queued without ticking anyone.
    pub fn flush(&mut self) -> RoundStats {
        self.deliver_all()
    }

    /// Ping `at` right now and return its pong payload.
    pub fn ping(&mut self, at: GridCoord) -> Option<NodeStatus> {
        self.send(at, Message::ping(CONTROLLER_ID));
        self.deliver_all();
        let from = self.addr(at);
        let position = self.inbox.iter().rposition(|(sender, _)| *sender == from)?;
        match self.inbox.remove(position).1 {
            Message::Pong { status, .. } => Some(status),
            _ => None,
        }
    }

    /// One lockstep round: all ticks, then all deliveries.
    pub fn run_round(&mut self) -> RoundStats {
        for (addr, runtime) in self.nodes.iter_mut() {
            for out in runtime.tick() {
                self.in_flight.push_back((*addr, out));
            }
        }
        self.rounds += 1;
        let stats = self.deliver_all();
        tracing::debug!(
            "Round {}: delivered={}, lost={}",
            self.rounds,
            stats.delivered,
            stats.lost
        );
        stats
    }

    /// Run `n` rounds.
    pub fn run_rounds(&mut self, n: usize) {
        for _ in 0..n {
            self.run_round();
        }
    }

    /// Run rounds until `done` holds or `max_rounds` pass. Returns the rounds taken.
    pub fn run_until(&mut self, max_rounds: usize, mut done: impl FnMut(&Self) -> bool) -> Option<usize> {
        for round in 1..=max_rounds {
            self.run_round();
            if done(self) {
                return Some(round);
            }
        }
        None
    }

    fn deliver_all(&mut self) -> RoundStats {
        let mut stats = RoundStats::default();
        while let Some((from, out)) = self.in_flight.pop_front() {
            if self.cut_links.contains(&(from, out.to)) {
                stats.lost += 1;
                continue;
            }

            // Through the wire format, both ways.
            let message = match out.message.encode().and_then(|bytes| Message::decode(&bytes)) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Datagram from {} failed the codec: {}", from, e);
                    stats.lost += 1;
                    continue;
                }
            };

            if out.to == self.controller {
                self.inbox.push((from, message));
                stats.delivered += 1;
                continue;
            }

            match self.nodes.get_mut(&out.to) {
                Some(runtime) => {
                    if let Some(reply) = runtime.handle(message, from) {
                        self.in_flight.push_back((out.to, reply));
                    }
                    stats.delivered += 1;
                }
                None => stats.lost += 1,
            }
        }
        self.delivered += stats.delivered;
        self.lost += stats.lost;
        stats
    }

    /// Cells currently holding `info_id`.
    pub fn holders(&self, info_id: &str) -> BTreeSet<GridCoord> {
        self.nodes
            .values()
            .filter(|rt| rt.store().contains(info_id))
            .map(|rt| rt.identity().coord)
            .collect()
    }

    /// Alive cells.
    pub fn alive(&self) -> BTreeSet<GridCoord> {
        self.nodes
            .values()
            .filter(|rt| rt.is_alive())
            .map(|rt| rt.identity().coord)
            .collect()
    }

    /// Whether any node still holds anything.
    pub fn is_quiet(&self) -> bool {
        self.nodes.values().all(|rt| rt.store().is_empty())
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            rounds: self.rounds,
            alive: self.nodes.values().filter(|rt| rt.is_alive()).count(),
            items_held: self.nodes.values().map(|rt| rt.store().len()).sum(),
            delivered: self.delivered,
            lost: self.lost,
        }
    }
}

/// Install a test-friendly subscriber once (honours `RUST_LOG`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robust_node=warn".into()),
        )
        .with_test_writer()
        .try_init();
}
