//! robust-ctl CLI tool
//!
//! Runs a whole grid in one process, talks to a running grid over the node
//! datagram protocol, and sends local admin commands over a node's Unix
//! socket.
//!
//! Usage:
//!   robust-ctl launch [--tick-ms N]
//!   robust-ctl seed [count] [--energy N]
//!   robust-ctl killrand [fraction]
//!   robust-ctl ping <x> <y>
//!   robust-ctl inject <x> <y> <info_id> [content] [--energy N]
//!   robust-ctl kill <x> <y>
//!   robust-ctl survey
//!   robust-ctl watch [--interval-ms N]
//!   robust-ctl --admin-socket <path> status | revive | shutdown

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use robust_node::admin_socket::{send_command, AdminCommand, AdminResponse};
use robust_node::probe::{
    Probe, CONTROLLER_ID, DEFAULT_KILL_FRACTION, DEFAULT_SEED_COUNT, SEED_ENERGY,
};
use robust_node::{GridLauncher, DEFAULT_ENERGY};
use robust_protocol::{Energy, NodeStatus};
use robust_topology::{GridCoord, GridSpec};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "robust-ctl", about = "Control and observe a robust-first diffusion grid")]
struct Cli {
    /// Side length of the grid
    #[arg(long, env = "ROBUST_GRID_SIZE", default_value_t = 5, global = true)]
    grid_size: u32,

    /// Address of cell (0, 0)
    #[arg(long, env = "ROBUST_BASE_ADDR", default_value = "127.0.0.1:9000", global = true)]
    base_addr: SocketAddr,

    /// How long to wait for pongs, in milliseconds
    #[arg(long, default_value_t = 500, global = true)]
    timeout_ms: u64,

    /// Admin socket of a local node (required for status, revive, shutdown)
    #[arg(long, env = "ROBUST_ADMIN_SOCKET", global = true)]
    admin_socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every node of the grid in this process until Ctrl-C (SIGHUP restarts)
    Launch {
        #[arg(long, default_value_t = 1000)]
        tick_ms: u64,
    },
    /// Inject new items at random nodes
    Seed {
        #[arg(default_value_t = DEFAULT_SEED_COUNT)]
        count: usize,
        #[arg(long, default_value_t = SEED_ENERGY)]
        energy: Energy,
    },
    /// Send `die` to a random share of the grid
    #[command(name = "killrand")]
    KillRand {
        #[arg(default_value_t = DEFAULT_KILL_FRACTION)]
        fraction: f64,
    },
    /// Ping one node and print its status
    Ping { x: u32, y: u32 },
    /// Hand a node a new information item
    Inject {
        x: u32,
        y: u32,
        info_id: String,
        #[arg(default_value = "")]
        content: String,
        #[arg(long, default_value_t = DEFAULT_ENERGY as Energy)]
        energy: Energy,
    },
    /// Send `die` to a node
    Kill { x: u32, y: u32 },
    /// Ping every cell once and print the grid
    Survey,
    /// Survey repeatedly
    Watch {
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,
    },
    /// Status over the admin socket
    Status,
    /// Revive a dead node (admin socket only)
    Revive,
    /// Stop a node (admin socket only)
    Shutdown,
}

fn print_status(status: &NodeStatus) {
    println!(
        "({}, {}) {} generation={} neighbors={} items={}",
        status.grid_x,
        status.grid_y,
        if status.alive { "alive" } else { "DEAD" },
        status.generation,
        status.neighbors,
        status.information_count
    );
    for (info_id, item) in &status.information {
        println!("  {:<16} energy={:<4} hops={}", info_id, item.energy, item.hops);
    }
}

async fn admin(path: Option<PathBuf>, cmd: AdminCommand) -> Result<(), String> {
    let path = path.ok_or("this command needs --admin-socket")?;
    let response = send_command(&path, &cmd).await.map_err(|e| {
        format!(
            "Failed to reach robust-node at {:?}: {}\nIs the node running with --admin-socket?",
            path, e
        )
    })?;
    match response {
        AdminResponse::Ok { message } => println!("{}", message),
        AdminResponse::Error { error } => return Err(error),
        AdminResponse::Status { node } => print_status(&node),
        AdminResponse::Pong => println!("pong - robust-node is running"),
    }
    Ok(())
}

async fn probe(ip: IpAddr) -> Result<Probe, String> {
    Probe::bind(ip, CONTROLLER_ID).await.map_err(|e| e.to_string())
}

#[cfg(unix)]
async fn hangup(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn launch(grid: GridSpec, tick: Duration) -> Result<(), String> {
    let mut launcher = GridLauncher::start(grid, tick).await.map_err(|e| e.to_string())?;
    println!(
        "Network started with {} nodes at {} (Ctrl-C to stop, SIGHUP to restart)",
        launcher.handles().len(),
        grid.base()
    );

    #[cfg(unix)]
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()).ok();
    loop {
        #[cfg(unix)]
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => false,
            _ = hangup(&mut sighup) => true,
        };
        #[cfg(not(unix))]
        let restart = {
            let _ = tokio::signal::ctrl_c().await;
            false
        };

        if !restart {
            break;
        }
        println!("Restarting network...");
        launcher = launcher.restart().await.map_err(|e| e.to_string())?;
    }

    println!("Shutting down network...");
    launcher.shutdown().await.map_err(|e| e.to_string())
}

async fn run(cli: Cli) -> Result<(), String> {
    let grid = GridSpec::new(cli.grid_size, cli.base_addr).map_err(|e| e.to_string())?;
    let timeout = Duration::from_millis(cli.timeout_ms);
    let cell = |x: u32, y: u32| grid.address_of(GridCoord::new(x, y)).map_err(|e| e.to_string());
    let ip = cli.base_addr.ip();

    match cli.command {
        Command::Launch { tick_ms } => launch(grid, Duration::from_millis(tick_ms.max(1))).await?,
        Command::Seed { count, energy } => {
            let mut rng = StdRng::from_entropy();
            let seeded = probe(ip)
                .await?
                .seed(&grid, count, energy, &mut rng)
                .await
                .map_err(|e| e.to_string())?;
            for item in seeded {
                println!("Injected '{}' at {} with energy {}", item.info_id, item.coord, energy);
            }
        }
        Command::KillRand { fraction } => {
            let mut rng = StdRng::from_entropy();
            let victims = probe(ip)
                .await?
                .kill_random(&grid, fraction, &mut rng)
                .await
                .map_err(|e| e.to_string())?;
            println!("Sent die to {} random nodes", victims.len());
            for coord in victims {
                println!("  {}", coord);
            }
        }
        Command::Ping { x, y } => {
            let addr = cell(x, y)?;
            match probe(ip).await?.ping(addr, timeout).await.map_err(|e| e.to_string())? {
                Some(status) => print_status(&status),
                None => return Err(format!("no answer from ({}, {}) at {}", x, y, addr)),
            }
        }
        Command::Inject {
            x,
            y,
            info_id,
            content,
            energy,
        } => {
            let addr = cell(x, y)?;
            probe(ip)
                .await?
                .inject(addr, &info_id, &content, energy)
                .await
                .map_err(|e| e.to_string())?;
            println!("Injected '{}' at ({}, {}) with energy {}", info_id, x, y, energy);
        }
        Command::Kill { x, y } => {
            let addr = cell(x, y)?;
            probe(ip).await?.kill(addr).await.map_err(|e| e.to_string())?;
            println!("Sent die to ({}, {})", x, y);
        }
        Command::Survey => {
            let survey = probe(ip).await?.survey(&grid, timeout).await.map_err(|e| e.to_string())?;
            print!("{}", survey.report());
        }
        Command::Watch { interval_ms } => {
            let monitor = probe(ip).await?;
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = interval.tick() => {
                        let survey = monitor.survey(&grid, timeout).await.map_err(|e| e.to_string())?;
                        println!("{}", survey.report());
                    }
                }
            }
        }
        Command::Status => admin(cli.admin_socket, AdminCommand::Status).await?,
        Command::Revive => admin(cli.admin_socket, AdminCommand::Revive).await?,
        Command::Shutdown => admin(cli.admin_socket, AdminCommand::Shutdown).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robust_node=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
