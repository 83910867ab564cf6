//! TCP transport.
//!
//! MAVLink over TCP is a raw byte stream; frames are delimited by the codec,
//! not by the transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

use super::{socket, SocketConfig, Transport, TransportConfig};
use crate::error::{Error, Result, TransportError};

/// Listening socket used for `tcpin` endpoints.
pub struct TcpAcceptor {
    listener: TcpListener,
    config: TransportConfig,
}

impl TcpAcceptor {
    /// Local listening address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TransportError::SocketError(e.to_string()).into())
    }

    /// Wait for a single client and turn it into a transport.
    pub async fn accept_one(self) -> Result<TcpTransport> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        info!(%peer, "Accepted TCP client");
        TcpTransport::from_stream(stream, &self.config)
    }
}

/// Connected TCP stream.
pub struct TcpTransport {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    connected: AtomicBool,
}

impl TcpTransport {
    /// Bind a listener (for `tcpin`).
    pub fn bind(addr: SocketAddr, config: &TransportConfig) -> Result<TcpAcceptor> {
        let socket_config = SocketConfig::from_transport_config(config);
        let std_socket = socket::create_tcp_listener(addr, &socket_config)?;

        let std_listener: std::net::TcpListener = std_socket.into();
        let listener =
            TcpListener::from_std(std_listener).map_err(|e| TransportError::BindFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        Ok(TcpAcceptor {
            listener,
            config: config.clone(),
        })
    }

    /// Connect to a remote address.
    pub async fn connect(remote_addr: SocketAddr, config: &TransportConfig) -> Result<Self> {
        let tcp_socket = if remote_addr.is_ipv6() {
            TcpSocket::new_v6()
        } else {
            TcpSocket::new_v4()
        }
        .map_err(|e| TransportError::SocketError(e.to_string()))?;

        let stream = timeout(config.connect_timeout, tcp_socket.connect(remote_addr))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| TransportError::ConnectFailed {
                addr: remote_addr.to_string(),
                reason: e.to_string(),
            })?;

        Self::from_stream(stream, config)
    }

    fn from_stream(stream: TcpStream, config: &TransportConfig) -> Result<Self> {
        if config.tcp_nodelay {
            stream
                .set_nodelay(true)
                .map_err(|e| TransportError::SocketError(e.to_string()))?;
        }

        let local_addr = stream
            .local_addr()
            .map_err(|e| TransportError::SocketError(e.to_string()))?;
        let remote_addr = stream
            .peer_addr()
            .map_err(|e| TransportError::SocketError(e.to_string()))?;

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            local_addr,
            remote_addr,
            connected: AtomicBool::new(true),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut reader = self.reader.lock().await;
        let n = reader
            .read(buf)
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        if n == 0 {
            self.connected.store(false, Ordering::Release);
        }
        Ok(n)
    }

    async fn send(&self, data: &[u8]) -> Result<usize> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(data.len())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn transport_type(&self) -> &'static str {
        "tcp"
    }

    fn describe(&self) -> String {
        format!("tcp {} <-> {}", self.local_addr, self.remote_addr)
    }
}
