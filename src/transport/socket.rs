//! Low-level socket creation.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use super::TransportConfig;
use crate::error::{Result, TransportError};

/// Socket configuration options.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub send_buffer_size: usize,
    pub recv_buffer_size: usize,
    pub reuse_addr: bool,
    pub nodelay: bool,
}

impl SocketConfig {
    /// Create from transport config.
    pub fn from_transport_config(config: &TransportConfig) -> Self {
        Self {
            send_buffer_size: config.send_buffer_size,
            recv_buffer_size: config.recv_buffer_size,
            reuse_addr: config.reuse_addr,
            nodelay: config.tcp_nodelay,
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::from_transport_config(&TransportConfig::default())
    }
}

/// Create a non-blocking UDP socket bound to `addr`.
pub fn create_udp_socket(addr: SocketAddr, config: &SocketConfig) -> Result<Socket> {
    let socket = new_socket(addr, Type::DGRAM, Protocol::UDP)?;
    configure_socket(&socket, config)?;
    bind(&socket, addr)?;

    socket
        .set_nonblocking(true)
        .map_err(|e| TransportError::SocketError(e.to_string()))?;

    Ok(socket)
}

/// Create a non-blocking TCP socket bound to `addr` and listening.
pub fn create_tcp_listener(addr: SocketAddr, config: &SocketConfig) -> Result<Socket> {
    let socket = new_socket(addr, Type::STREAM, Protocol::TCP)?;
    configure_socket(&socket, config)?;
    bind(&socket, addr)?;

    socket
        .listen(1)
        .map_err(|e| TransportError::BindFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    socket
        .set_nonblocking(true)
        .map_err(|e| TransportError::SocketError(e.to_string()))?;

    Ok(socket)
}

fn new_socket(addr: SocketAddr, ty: Type, protocol: Protocol) -> Result<Socket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, ty, Some(protocol))
        .map_err(|e| TransportError::SocketError(e.to_string()))?;

    // For IPv6, allow IPv4 mapped addresses
    if addr.is_ipv6() {
        socket
            .set_only_v6(false)
            .map_err(|e| TransportError::SocketError(e.to_string()))?;
    }

    Ok(socket)
}

/// Apply common socket configuration.
fn configure_socket(socket: &Socket, config: &SocketConfig) -> Result<()> {
    // Buffer sizes are hints; the kernel may clamp them
    if let Err(e) = socket.set_send_buffer_size(config.send_buffer_size) {
        debug!("Could not set send buffer size: {e}");
    }
    if let Err(e) = socket.set_recv_buffer_size(config.recv_buffer_size) {
        debug!("Could not set receive buffer size: {e}");
    }

    if config.reuse_addr {
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::SocketError(format!("set reuse addr: {e}")))?;
    }

    Ok(())
}

fn bind(socket: &Socket, addr: SocketAddr) -> Result<()> {
    socket.bind(&addr.into()).map_err(|e| {
        TransportError::BindFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
