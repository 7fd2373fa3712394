//! Node runtime - the per-node message state machine.
//!
//! [`NodeRuntime`] owns everything a node knows: its identity, its fixed
//! neighbor set, the alive flag, the tick counter and the information store.
//! It performs no I/O. Inbound messages go through [`NodeRuntime::handle`],
//! the periodic pass through [`NodeRuntime::tick`]; both hand back the
//! datagrams to send, and the caller sends them outside any lock.
//!
//! # Message handling
//!
//! ```text
//! ping        -> pong to the sender's address (answered even while dead)
//! information -> stored iff alive, id not held, energy > 0
//! heartbeat   -> nothing
//! die         -> alive = false, store cleared
//! pong        -> nothing (nodes never ping)
//! ```
//!
//! # Tick
//!
//! While alive: spread every held item to every neighbor with its current
//! energy and hops, then decay every item by one, then bump the generation.
//! Spreading strictly before decay means a freshly received item goes out at
//! least once before it loses more energy.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use robust_protocol::{Energy, InformationPayload, Message, NodeStatus};
use robust_topology::{neighbors_of, GridCoord, Neighbor};
use tracing::{debug, info, trace};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::store::{Admission, InformationStore, Provenance};

/// Immutable identity of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: String,
    pub coord: GridCoord,
    pub addr: SocketAddr,
}

/// A datagram the runtime wants sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: SocketAddr,
    pub message: Message,
}

/// Outcome of an inbound information message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Stored as a new item
    Accepted,
    /// Node is dead
    Dead,
    /// Id already held
    Duplicate,
    /// Arrived with no energy to spend
    NoEnergy,
}

/// Per-node state machine.
#[derive(Debug)]
pub struct NodeRuntime {
    identity: NodeIdentity,
    neighbors: BTreeMap<String, Neighbor>,
    alive: bool,
    generation: u64,
    store: InformationStore,
}

impl NodeRuntime {
    /// Build the runtime for a validated configuration.
    ///
    /// Neighbors are computed here, once, and never change.
    pub fn new(config: &NodeConfig) -> Result<Self> {
        config.validate()?;
        let neighbors = neighbors_of(&config.grid, config.coord)?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect::<BTreeMap<_, _>>();

        info!(
            "Node {} at {} position {} with {} neighbors: {:?}",
            config.node_id,
            config.bind,
            config.coord,
            neighbors.len(),
            neighbors.keys().collect::<Vec<_>>()
        );

        Ok(Self {
            identity: NodeIdentity {
                id: config.node_id.clone(),
                coord: config.coord,
                addr: config.bind,
            },
            neighbors,
            alive: true,
            generation: 0,
            store: InformationStore::new(),
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn store(&self) -> &InformationStore {
        &self.store
    }

    /// Dispatch one inbound message. Returns the reply, if any.
    pub fn handle(&mut self, message: Message, from: SocketAddr) -> Option<Outbound> {
        match message {
            Message::Ping { sender_id, .. } => {
                trace!("Ping from {} ({})", sender_id, from);
                Some(Outbound {
                    to: from,
                    message: Message::pong(self.identity.id.clone(), self.status()),
                })
            }
            Message::Information {
                sender_id,
                payload,
                energy,
                hops,
            } => {
                self.receive_information(&sender_id, &payload, energy, hops);
                None
            }
            Message::Heartbeat { sender_id, .. } => {
                trace!("Heartbeat from {} ignored", sender_id);
                None
            }
            Message::Die { sender_id } => {
                info!("Received DIE from {} - simulating node failure", sender_id);
                self.kill();
                None
            }
            Message::Pong { sender_id, .. } => {
                debug!("Unsolicited pong from {} ({}) ignored", sender_id, from);
                None
            }
        }
    }

    /// Apply the acceptance rule to an item in transit.
    pub fn receive_information(
        &mut self,
        sender_id: &str,
        payload: &InformationPayload,
        energy: Energy,
        hops: u64,
    ) -> Acceptance {
        if !self.alive {
            return Acceptance::Dead;
        }
        if self.store.contains(&payload.info_id) {
            return Acceptance::Duplicate;
        }
        if energy <= 0 {
            return Acceptance::NoEnergy;
        }

        // energy > 0, so the subtraction cannot go negative
        let remaining = (energy - 1) as u64;
        match self.store.admit(
            &payload.info_id,
            &payload.content,
            remaining,
            hops.saturating_add(1),
            Provenance::Peer(sender_id.to_string()),
        ) {
            Admission::Stored => {
                info!(
                    "Received information '{}' from {} with energy {}",
                    payload.info_id, sender_id, remaining
                );
                Acceptance::Accepted
            }
            Admission::Exhausted => {
                debug!(
                    "Information '{}' from {} arrived with its last unit of energy",
                    payload.info_id, sender_id
                );
                Acceptance::NoEnergy
            }
            Admission::AlreadyHeld => Acceptance::Duplicate,
        }
    }

    /// One spread-then-decay pass. Does nothing while dead.
    pub fn tick(&mut self) -> Vec<Outbound> {
        if !self.alive {
            return Vec::new();
        }

        let mut outbound = Vec::with_capacity(self.store.len() * self.neighbors.len());
        for (info_id, item) in self.store.iter() {
            let message = Message::information(
                self.identity.id.clone(),
                info_id.clone(),
                item.content.clone(),
                Energy::try_from(item.energy.get()).unwrap_or(Energy::MAX),
                item.hops,
            );
            // Liveness of the neighbor is the network's problem.
            for neighbor in self.neighbors.values() {
                outbound.push(Outbound {
                    to: neighbor.addr,
                    message: message.clone(),
                });
            }
        }

        for info_id in self.store.decay() {
            info!("Information '{}' decayed away", info_id);
        }
        self.generation += 1;

        outbound
    }

    /// Store a new item locally with provenance `self` and hop count 0.
    pub fn inject(&mut self, info_id: &str, content: &str, energy: u64) -> Result<()> {
        if !self.alive {
            return Err(Error::NodeDead);
        }
        match self.store.admit(info_id, content, energy, 0, Provenance::Local) {
            Admission::Stored => {
                info!("Injected information '{}' with energy {}", info_id, energy);
                Ok(())
            }
            Admission::AlreadyHeld => Err(Error::AlreadyHeld(info_id.to_string())),
            Admission::Exhausted => Err(Error::InvalidEnergy(energy)),
        }
    }

    /// Simulated failure: stop accepting and spreading, lose all information.
    pub fn kill(&mut self) {
        let lost = self.store.len();
        self.alive = false;
        self.store.clear();
        info!("Node {} is now dead ({} items lost)", self.identity.id, lost);
    }

    /// Local administrative revival. Lost information stays lost.
    ///
    /// Returns false if the node was already alive.
    pub fn revive(&mut self) -> bool {
        if self.alive {
            return false;
        }
        self.alive = true;
        info!("Node {} revived", self.identity.id);
        true
    }

    /// The pong payload.
    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            alive: self.alive,
            grid_x: self.identity.coord.x,
            grid_y: self.identity.coord.y,
            information_count: self.store.len(),
            information: self.store.summaries(),
            generation: self.generation,
            neighbors: self.neighbors.len(),
        }
    }
}
