//! UDP transport.
//!
//! A bound (`udpin`) socket answers whoever spoke last; a connected
//! (`udpout`) socket always talks to the same remote.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tracing::debug;

use super::{socket, unspecified_for, SocketConfig, Transport, TransportConfig};
use crate::error::{Result, TransportError};

/// UDP transport.
pub struct UdpTransport {
    socket: UdpSocket,
    remote_addr: RwLock<Option<SocketAddr>>,
    is_connected: AtomicBool,
}

impl UdpTransport {
    /// Bind to a local address and wait for peers.
    pub fn bind(addr: SocketAddr, config: &TransportConfig) -> Result<Self> {
        let socket_config = SocketConfig::from_transport_config(config);
        let std_socket = socket::create_udp_socket(addr, &socket_config)?;

        let socket = UdpSocket::from_std(std_socket.into()).map_err(|e| {
            TransportError::BindFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            socket,
            remote_addr: RwLock::new(None),
            is_connected: AtomicBool::new(false),
        })
    }

    /// Create a socket connected to `remote_addr`.
    pub async fn connect(remote_addr: SocketAddr, config: &TransportConfig) -> Result<Self> {
        let transport = Self::bind(unspecified_for(remote_addr), config)?;

        transport
            .socket
            .connect(remote_addr)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                addr: remote_addr.to_string(),
                reason: e.to_string(),
            })?;

        *transport.remote_addr.write() = Some(remote_addr);
        transport.is_connected.store(true, Ordering::Release);
        Ok(transport)
    }

    /// Local socket address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::SocketError(e.to_string()).into())
    }

    /// Current remote: the fixed peer or the latest sender.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        *self.remote_addr.read()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let received = if self.is_connected.load(Ordering::Acquire) {
                self.socket.recv(buf).await.map(|len| (len, None))
            } else {
                self.socket.recv_from(buf).await.map(|(len, from)| (len, Some(from)))
            };

            let (len, from) = match received {
                Ok(received) => received,
                Err(e) if is_unreachable_peer(&e) => {
                    debug!(error = %e, "UDP peer unreachable, still waiting");
                    continue;
                }
                Err(e) => return Err(TransportError::ReceiveFailed(e.to_string()).into()),
            };

            // An empty datagram is not end-of-stream for UDP
            if len == 0 {
                continue;
            }

            if let Some(from) = from {
                let previous = self.remote_addr.write().replace(from);
                if previous != Some(from) {
                    debug!(peer = %from, "UDP peer changed");
                }
            }
            return Ok(len);
        }
    }

    async fn send(&self, data: &[u8]) -> Result<usize> {
        let sent = if self.is_connected.load(Ordering::Acquire) {
            self.socket.send(data).await
        } else {
            // Copy the address before await to avoid holding lock across await point
            let addr = { *self.remote_addr.read() };
            let addr = addr.ok_or(TransportError::NoPeer)?;
            self.socket.send_to(data, addr).await
        };

        match sent {
            Ok(len) => Ok(len),
            // Datagram is lost, like any other UDP datagram
            Err(e) if is_unreachable_peer(&e) => {
                debug!(error = %e, "UDP peer unreachable, datagram dropped");
                Ok(data.len())
            }
            Err(e) => Err(TransportError::SendFailed(e.to_string()).into()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.is_connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    fn transport_type(&self) -> &'static str {
        "udp"
    }

    fn describe(&self) -> String {
        let local = self
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".into());
        match self.remote_addr() {
            Some(remote) => format!("udp {local} <-> {remote}"),
            None => format!("udp {local} (no peer yet)"),
        }
    }
}

/// ICMP port unreachable, reported on a later call on the same socket.
fn is_unreachable_peer(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}
