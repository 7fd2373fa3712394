//! Unix socket server for local node administration.
//!
//! Newline-delimited JSON, one command per line, one response per line.
//! This is the only way to revive a node: revival is never accepted over
//! the grid protocol.

use std::path::{Path, PathBuf};

use robust_protocol::NodeStatus;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::node::NodeHandle;
use crate::DEFAULT_ENERGY;

fn default_energy() -> u64 {
    DEFAULT_ENERGY
}

/// Admin command sent over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Report the node status
    Status,
    /// Store an item locally
    Inject {
        info_id: String,
        #[serde(default)]
        content: String,
        #[serde(default = "default_energy")]
        energy: u64,
    },
    /// Simulate failure
    Kill,
    /// Bring a dead node back (store stays empty)
    Revive,
    /// Stop the node process
    Shutdown,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Status { node: NodeStatus },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    handle: NodeHandle,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(handle: NodeHandle, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            handle,
            socket_path: socket_path.into(),
        }
    }

    /// Serve until `shutdown` turns true. The socket file is removed on both ends.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        // Remove a stale socket file from an earlier run
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let handle = self.handle.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, handle).await {
                                tracing::error!("Admin connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept admin connection: {}", e);
                    }
                },
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        tracing::debug!("Admin socket closed");
        Ok(())
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, handle: NodeHandle) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &handle).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(cmd: AdminCommand, handle: &NodeHandle) -> AdminResponse {
    match cmd {
        AdminCommand::Status => AdminResponse::Status {
            node: handle.status().await,
        },

        AdminCommand::Inject {
            info_id,
            content,
            energy,
        } => match handle.inject(&info_id, &content, energy).await {
            Ok(()) => AdminResponse::Ok {
                message: format!("Injected '{}' with energy {}", info_id, energy),
            },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Kill => {
            tracing::info!("Kill requested over admin socket");
            handle.kill().await;
            AdminResponse::Ok {
                message: format!("{} is now dead", handle.id()),
            }
        }

        AdminCommand::Revive => {
            if handle.revive().await {
                AdminResponse::Ok {
                    message: format!("{} revived", handle.id()),
                }
            } else {
                AdminResponse::Error {
                    error: format!("{} is already alive", handle.id()),
                }
            }
        }

        AdminCommand::Shutdown => {
            tracing::info!("Shutdown requested over admin socket");
            handle.shutdown();
            AdminResponse::Ok {
                message: format!("{} shutting down", handle.id()),
            }
        }

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

/// Send one command to the admin socket at `path` and read the response.
pub async fn send_command(path: &Path, cmd: &AdminCommand) -> Result<AdminResponse> {
    let stream = UnixStream::connect(path).await?;
    let (reader, mut writer) = stream.into_split();

    let cmd_json = serde_json::to_string(cmd)? + "\n";
    writer.write_all(cmd_json.as_bytes()).await?;

    let mut reader = BufReader::new(reader);
    let mut response_line = String::new();
    if reader.read_line(&mut response_line).await? == 0 {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "admin socket closed without a response",
        )));
    }
    Ok(serde_json::from_str(&response_line)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::node::GridNode;
    use robust_topology::{GridCoord, GridSpec};
    use std::time::Duration;
    use tokio_test::assert_ok;

    #[test]
    fn command_wire_format() {
        let cmd: AdminCommand =
            serde_json::from_str(r#"{"cmd":"inject","info_id":"news"}"#).unwrap();
        assert_eq!(
            cmd,
            AdminCommand::Inject {
                info_id: "news".into(),
                content: String::new(),
                energy: DEFAULT_ENERGY,
            }
        );
        assert_eq!(
            serde_json::to_string(&AdminCommand::Revive).unwrap(),
            r#"{"cmd":"revive"}"#
        );
        assert_eq!(
            serde_json::to_string(&AdminResponse::Pong).unwrap(),
            r#"{"status":"pong"}"#
        );
    }

    async fn node_with_admin(base_port: u16, dir: &tempfile::TempDir) -> (GridNode, PathBuf) {
        let path = dir.path().join("admin.sock");
        let grid = GridSpec::new(1, std::net::SocketAddr::from(([127, 0, 0, 1], base_port))).unwrap();
        let config = NodeConfig::for_cell(grid, GridCoord::ORIGIN)
            .unwrap()
            .with_tick_interval(Duration::from_secs(60))
            .with_admin_socket(&path);
        (GridNode::bind(config).await.unwrap(), path)
    }

    async fn wait_for_socket(path: &Path) {
        for _ in 0..100 {
            if send_command(path, &AdminCommand::Ping).await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("admin socket never came up at {:?}", path);
    }

    #[tokio::test]
    async fn kill_and_revive_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let (node, path) = node_with_admin(38810, &dir).await;
        let running = tokio::spawn(node.run());
        wait_for_socket(&path).await;

        let injected = assert_ok!(
            send_command(
                &path,
                &AdminCommand::Inject {
                    info_id: "news".into(),
                    content: "hello".into(),
                    energy: 4,
                },
            )
            .await
        );
        assert!(matches!(injected, AdminResponse::Ok { .. }));

        match assert_ok!(send_command(&path, &AdminCommand::Status).await) {
            AdminResponse::Status { node } => {
                assert!(node.alive);
                assert_eq!(node.information["news"].energy, 4);
            }
            other => panic!("expected status, got {:?}", other),
        }

        assert_ok!(send_command(&path, &AdminCommand::Kill).await);
        let revived = assert_ok!(send_command(&path, &AdminCommand::Revive).await);
        assert!(matches!(revived, AdminResponse::Ok { .. }));
        let again = assert_ok!(send_command(&path, &AdminCommand::Revive).await);
        assert!(matches!(again, AdminResponse::Error { .. }));

        match assert_ok!(send_command(&path, &AdminCommand::Status).await) {
            AdminResponse::Status { node } => {
                assert!(node.alive);
                assert_eq!(node.information_count, 0);
            }
            other => panic!("expected status, got {:?}", other),
        }

        let stopped = assert_ok!(send_command(&path, &AdminCommand::Shutdown).await);
        assert!(matches!(stopped, AdminResponse::Ok { .. }));
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn invalid_command_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let (node, path) = node_with_admin(38820, &dir).await;
        let handle = node.handle();
        let running = tokio::spawn(node.run());
        wait_for_socket(&path).await;

        let stream = UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"cmd\":\"explode\"}\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();
        let response: AdminResponse = serde_json::from_str(&line).unwrap();
        assert!(matches!(response, AdminResponse::Error { .. }));

        let rejected = assert_ok!(
            send_command(
                &path,
                &AdminCommand::Inject {
                    info_id: "cold".into(),
                    content: String::new(),
                    energy: 0,
                },
            )
            .await
        );
        assert!(matches!(rejected, AdminResponse::Error { .. }));

        handle.shutdown();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stale_socket_file_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let (node, path) = node_with_admin(38830, &dir).await;
        std::fs::write(&path, b"stale").unwrap();

        let handle = node.handle();
        let running = tokio::spawn(node.run());
        wait_for_socket(&path).await;

        handle.shutdown();
        running.await.unwrap().unwrap();
        assert!(!path.exists());
    }
}
