//! Grid node service - runs the runtime against a real UDP socket.
//!
//! Architecture:
//! - One [`NodeRuntime`] behind a short-held `RwLock`, the only shared state
//! - Listen loop: receive, decode, dispatch, send the reply (if any)
//! - Tick loop: fixed period, spread/decay, send the results
//! - Optional Unix admin socket for local-only operations (revive, inject)
//!
//! Neither loop waits on the other. Datagrams are always sent after the lock
//! is released. Shutdown is cooperative: both loops watch the same signal and
//! the socket is closed only after both have returned.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use robust_protocol::NodeStatus;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, Instrument};

use crate::admin_socket::AdminSocket;
use crate::config::NodeConfig;
use crate::error::Result;
use crate::runtime::{NodeRuntime, Outbound};
use crate::transport::{Transport, TransportConfig};

/// Log a status line every this many generations while holding information.
const STATUS_LOG_EVERY: u64 = 10;

/// Cloneable handle for local operations on a running node.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: String,
    addr: SocketAddr,
    runtime: Arc<RwLock<NodeRuntime>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl NodeHandle {
    /// Node id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Bound grid address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Store an item locally (provenance `self`, hops 0).
    pub async fn inject(&self, info_id: &str, content: &str, energy: u64) -> Result<()> {
        self.runtime.write().await.inject(info_id, content, energy)
    }

    /// Simulate failure, exactly as a `die` message would.
    pub async fn kill(&self) {
        self.runtime.write().await.kill();
    }

    /// Local revival. Returns false if the node was alive already.
    pub async fn revive(&self) -> bool {
        self.runtime.write().await.revive()
    }

    /// Current status (the pong payload).
    pub async fn status(&self) -> NodeStatus {
        self.runtime.read().await.status()
    }

    /// Ask both loops to stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// A configured node with its socket bound, ready to run.
pub struct GridNode {
    config: NodeConfig,
    transport: Transport,
    handle: NodeHandle,
    span: tracing::Span,
}

impl GridNode {
    /// Validate the configuration, build the runtime, then bind the socket.
    ///
    /// Nothing touches the network unless the configuration is valid.
    pub async fn bind(config: NodeConfig) -> Result<Self> {
        let span = tracing::info_span!("node", id = %config.node_id);
        let runtime = span.in_scope(|| NodeRuntime::new(&config))?;

        let transport = Transport::bind(&TransportConfig {
            bind: config.bind,
            sndbuf: config.sndbuf,
            rcvbuf: config.rcvbuf,
        })
        .await?;

        let (shutdown, _) = watch::channel(false);
        let handle = NodeHandle {
            id: config.node_id.clone(),
            addr: transport.local_addr()?,
            runtime: Arc::new(RwLock::new(runtime)),
            shutdown: Arc::new(shutdown),
        };

        Ok(Self {
            config,
            transport,
            handle,
            span,
        })
    }

    /// Handle for local operations and shutdown.
    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Run until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        let span = self.span.clone();
        info!(parent: &span, "Node {} starting at {} position {}", self.config.node_id, self.handle.addr, self.config.coord);
        info!(parent: &span, "  Tick: {:?}", self.config.tick_interval);
        if let Some(path) = &self.config.admin_socket {
            info!(parent: &span, "  Admin: {:?}", path);
        }

        let listen = tokio::spawn(
            listen_loop(
                Arc::clone(&self.handle.runtime),
                self.transport.clone(),
                self.handle.subscribe(),
            )
            .instrument(span.clone()),
        );

        let tick = tokio::spawn(
            tick_loop(
                Arc::clone(&self.handle.runtime),
                self.transport.clone(),
                self.config.tick_interval,
                self.handle.subscribe(),
            )
            .instrument(span.clone()),
        );

        let admin = self.config.admin_socket.clone().map(|path| {
            let admin_socket = AdminSocket::new(self.handle.clone(), path);
            let shutdown = self.handle.subscribe();
            tokio::spawn(
                async move {
                    if let Err(e) = admin_socket.run(shutdown).await {
                        error!("Admin socket error: {}", e);
                    }
                }
                .instrument(span.clone()),
            )
        });

        let (listen, tick) = tokio::join!(listen, tick);
        span.in_scope(|| {
            joined_cleanly("listen loop", listen);
            joined_cleanly("tick loop", tick);
        });
        if let Some(admin) = admin {
            // Stops on the same signal as the loops.
            let admin = admin.await;
            span.in_scope(|| joined_cleanly("admin socket", admin));
        }

        // Last clone of the socket goes here.
        drop(self.transport);
        info!(parent: &span, "Node {} stopped", self.config.node_id);
        Ok(())
    }
}

/// Log a task that panicked or was cancelled. Returns whether it ended cleanly.
fn joined_cleanly(name: &str, joined: std::result::Result<(), JoinError>) -> bool {
    match joined {
        Ok(()) => true,
        Err(e) => {
            error!("{} terminated abnormally: {}", name, e);
            false
        }
    }
}

async fn send(transport: &Transport, outbound: Outbound) {
    // Unreachable peers are indistinguishable from packet loss.
    if let Err(e) = transport.send(outbound.to, &outbound.message).await {
        trace!("Send to {} failed: {}", outbound.to, e);
    }
}

async fn listen_loop(
    runtime: Arc<RwLock<NodeRuntime>>,
    transport: Transport,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Listen loop started");
    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        let received = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = transport.recv() => received,
        };

        let datagram = match received {
            Ok(datagram) => datagram,
            Err(e) => {
                debug!("UDP recv error: {}", e);
                continue;
            }
        };

        let message = match datagram.decode() {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping malformed datagram from {} ({} bytes): {}", datagram.from, datagram.bytes.len(), e);
                continue;
            }
        };

        let reply = runtime.write().await.handle(message, datagram.from);
        if let Some(reply) = reply {
            send(&transport, reply).await;
        }
    }
    debug!("Listen loop stopped");
}

async fn tick_loop(
    runtime: Arc<RwLock<NodeRuntime>>,
    transport: Transport,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!("Tick loop started ({:?})", period);

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }

        let (outbound, generation, held) = {
            let mut rt = runtime.write().await;
            let outbound = rt.tick();
            (outbound, rt.generation(), rt.store().len())
        };

        if held > 0 && generation % STATUS_LOG_EVERY == 0 {
            info!("Status: generation={}, info_count={}", generation, held);
        }
        for out in outbound {
            send(&transport, out).await;
        }
    }
    debug!("Tick loop stopped");
}
