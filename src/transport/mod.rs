//! Byte transports for MAVLink endpoints.
//!
//! Provides UDP (listen and connect), TCP (client and single-peer listener)
//! and, with the `serial` feature, serial port transports behind one
//! [`Transport`] trait. [`MavConnection`] turns any of them into a stream of
//! decoded frames.

mod connection;
#[cfg(feature = "serial")]
mod serial;
mod socket;
mod tcp;
mod udp;

pub use connection::MavConnection;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use socket::{create_udp_socket, SocketConfig};
pub use tcp::{TcpAcceptor, TcpTransport};
pub use udp::UdpTransport;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::lookup_host;

use crate::error::{Error, Result, TransportError};
use crate::types::Endpoint;

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Socket send buffer size in bytes.
    #[serde(default = "default_send_buffer")]
    pub send_buffer_size: usize,

    /// Socket receive buffer size in bytes.
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer_size: usize,

    /// Size of a single read from the transport.
    #[serde(default = "default_read_buffer")]
    pub read_buffer_size: usize,

    /// Timeout for outgoing TCP connections.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Enable TCP_NODELAY.
    #[serde(default = "default_nodelay")]
    pub tcp_nodelay: bool,

    /// Enable SO_REUSEADDR on listening sockets.
    #[serde(default = "default_reuse_addr")]
    pub reuse_addr: bool,
}

fn default_send_buffer() -> usize {
    256 * 1024
}
fn default_recv_buffer() -> usize {
    256 * 1024
}
fn default_read_buffer() -> usize {
    4096
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_nodelay() -> bool {
    true
}
fn default_reuse_addr() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_buffer_size: default_send_buffer(),
            recv_buffer_size: default_recv_buffer(),
            read_buffer_size: default_read_buffer(),
            connect_timeout: default_connect_timeout(),
            tcp_nodelay: default_nodelay(),
            reuse_addr: default_reuse_addr(),
        }
    }
}

/// Byte transport underneath a MAVLink connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read available bytes. `Ok(0)` means the stream has closed.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `data`.
    async fn send(&self, data: &[u8]) -> Result<usize>;

    /// Close the transport.
    async fn close(&self) -> Result<()>;

    /// Check if transport is connected.
    fn is_connected(&self) -> bool;

    /// Get transport type name.
    fn transport_type(&self) -> &'static str;

    /// Human-readable local/remote description for logs.
    fn describe(&self) -> String;
}

/// Open the transport named by `endpoint`.
pub async fn open(endpoint: &Endpoint, config: &TransportConfig) -> Result<Box<dyn Transport>> {
    match endpoint {
        Endpoint::UdpIn { addr } => {
            let addr = resolve(addr).await?;
            Ok(Box::new(UdpTransport::bind(addr, config)?))
        }
        Endpoint::UdpOut { addr } => {
            let addr = resolve(addr).await?;
            Ok(Box::new(UdpTransport::connect(addr, config).await?))
        }
        Endpoint::TcpOut { addr } => {
            let addr = resolve(addr).await?;
            Ok(Box::new(TcpTransport::connect(addr, config).await?))
        }
        Endpoint::TcpIn { addr } => {
            let addr = resolve(addr).await?;
            let listener = TcpTransport::bind(addr, config)?;
            Ok(Box::new(listener.accept_one().await?))
        }
        #[cfg(feature = "serial")]
        Endpoint::Serial { path, baud } => Ok(Box::new(SerialTransport::open(path, *baud)?)),
        #[cfg(not(feature = "serial"))]
        Endpoint::Serial { .. } => Err(Error::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "built without serial port support".into(),
        }),
    }
}

/// Resolve `host:port` to the first socket address.
pub async fn resolve(addr: &str) -> Result<SocketAddr> {
    if let Ok(parsed) = addr.parse::<SocketAddr>() {
        return Ok(parsed);
    }

    let mut addrs = lookup_host(addr)
        .await
        .map_err(|e| TransportError::ResolveFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

    addrs.next().ok_or_else(|| {
        Error::from(TransportError::ResolveFailed {
            addr: addr.to_string(),
            reason: "no addresses found".into(),
        })
    })
}

/// Wildcard address in the same family as `remote`.
pub(crate) fn unspecified_for(remote: SocketAddr) -> SocketAddr {
    if remote.is_ipv6() {
        SocketAddr::from(([0u16; 8], 0))
    } else {
        SocketAddr::from(([0u8; 4], 0))
    }
}
