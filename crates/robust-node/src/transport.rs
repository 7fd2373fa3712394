//! UDP transport for grid datagrams
//!
//! A thin wrapper around tokio's UdpSocket with:
//! - Configurable send/receive buffer sizes (set through socket2 before bind)
//! - Message-level send and receive using the wire codec
//!
//! Sends are fire-and-forget. Callers decide whether a send error matters;
//! inside a node it never does.

use std::net::SocketAddr;
use std::sync::Arc;

use robust_protocol::{Message, MAX_DATAGRAM_LEN};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::Result;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Address to bind to
    pub bind: SocketAddr,
    /// Send buffer size in bytes
    pub sndbuf: usize,
    /// Receive buffer size in bytes
    pub rcvbuf: usize,
}

/// One received datagram.
#[derive(Debug)]
pub struct Datagram {
    pub from: SocketAddr,
    pub bytes: Vec<u8>,
}

impl Datagram {
    /// Decode the payload.
    pub fn decode(&self) -> Result<Message> {
        Ok(Message::decode(&self.bytes)?)
    }
}

/// Bound UDP endpoint, cheap to clone.
#[derive(Debug, Clone)]
pub struct Transport {
    socket: Arc<UdpSocket>,
}

impl Transport {
    /// Bind to the configured address with the configured buffer sizes.
    pub async fn bind(cfg: &TransportConfig) -> Result<Self> {
        let domain = if cfg.bind.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        // Buffer sizes must be set before binding
        socket.set_send_buffer_size(cfg.sndbuf)?;
        socket.set_recv_buffer_size(cfg.rcvbuf)?;

        socket.bind(&cfg.bind.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket)?;

        tracing::debug!(
            "UDP transport bound to {} (sndbuf={}, rcvbuf={})",
            cfg.bind,
            cfg.sndbuf,
            cfg.rcvbuf
        );

        Ok(Self {
            socket: Arc::new(tokio_socket),
        })
    }

    /// Bind an ephemeral loopback-or-any endpoint with default buffers.
    pub async fn ephemeral(ip: std::net::IpAddr) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(ip, 0)).await?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Encode and send one message.
    pub async fn send(&self, addr: SocketAddr, message: &Message) -> Result<()> {
        let bytes = message.encode()?;
        self.socket.send_to(&bytes, addr).await?;
        Ok(())
    }

    /// Receive one datagram (not yet decoded).
    pub async fn recv(&self) -> Result<Datagram> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok(Datagram { from, bytes: buf })
    }

    /// Get the local address this transport is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> TransportConfig {
        TransportConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            sndbuf: 64 * 1024,
            rcvbuf: 64 * 1024,
        }
    }

    #[tokio::test]
    async fn test_transport_creation() {
        let transport = Transport::bind(&loopback()).await.unwrap();
        let addr = transport.local_addr().unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_send_recv_message() {
        let t1 = Transport::bind(&loopback()).await.unwrap();
        let t2 = Transport::bind(&loopback()).await.unwrap();
        let addr2 = t2.local_addr().unwrap();

        let msg = Message::information("node_0_0", "news", "hello", 4, 1);
        t1.send(addr2, &msg).await.unwrap();

        let datagram = t2.recv().await.unwrap();
        assert_eq!(datagram.from, t1.local_addr().unwrap());
        assert_eq!(datagram.decode().unwrap(), msg);
    }

    #[tokio::test]
    async fn test_garbage_fails_to_decode() {
        let t1 = Transport::ephemeral("127.0.0.1".parse().unwrap()).await.unwrap();
        let t2 = Transport::bind(&loopback()).await.unwrap();

        t1.socket.send_to(b"\x00garbage", t2.local_addr().unwrap()).await.unwrap();
        let datagram = t2.recv().await.unwrap();
        assert!(datagram.decode().is_err());
    }

    #[tokio::test]
    async fn test_double_bind_fails() {
        let t1 = Transport::bind(&loopback()).await.unwrap();
        let cfg = TransportConfig {
            bind: t1.local_addr().unwrap(),
            ..loopback()
        };
        assert!(Transport::bind(&cfg).await.is_err());
    }
}
