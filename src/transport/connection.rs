//! Framed MAVLink connection over any [`Transport`].

use std::time::Duration;

use bytes::BytesMut;
use tokio::time::timeout;
use tokio_util::codec::Decoder;
use tracing::trace;

use super::{open, Transport, TransportConfig};
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameCodec, Inbound, MessageData, MAX_FRAME_SIZE};
use crate::types::{Endpoint, EndpointIdentity};

/// A transport paired with a codec and a receive buffer.
///
/// Bytes from the transport are appended to the buffer and offered to the
/// codec until it yields a frame; the incomplete tail stays buffered for the
/// next read.
pub struct MavConnection {
    transport: Box<dyn Transport>,
    codec: FrameCodec,
    buffer: BytesMut,
    read_buf: Vec<u8>,
    identity: EndpointIdentity,
}

impl MavConnection {
    /// Wrap an already opened transport.
    pub fn new(
        transport: Box<dyn Transport>,
        codec: FrameCodec,
        identity: EndpointIdentity,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            transport,
            codec,
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE * 2),
            read_buf: vec![0u8; read_buffer_size.max(MAX_FRAME_SIZE)],
            identity,
        }
    }

    /// Open `endpoint` and wrap it.
    pub async fn open(
        endpoint: &Endpoint,
        codec: FrameCodec,
        identity: EndpointIdentity,
        config: &TransportConfig,
    ) -> Result<Self> {
        let transport = open(endpoint, config).await?;
        Ok(Self::new(transport, codec, identity, config.read_buffer_size))
    }

    /// Receive the next frame.
    ///
    /// Cancel safe: dropping the future between reads loses no buffered
    /// bytes. Returns [`Error::TransportClosed`] once the stream ends.
    pub async fn recv_frame(&mut self) -> Result<Inbound> {
        loop {
            if let Some(item) = self.codec.decode(&mut self.buffer)? {
                return Ok(item);
            }

            let n = self.transport.recv(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::TransportClosed);
            }
            trace!(bytes = n, buffered = self.buffer.len(), "Read from transport");
            self.buffer.extend_from_slice(&self.read_buf[..n]);
        }
    }

    /// Receive the next frame, giving up after `deadline`.
    pub async fn recv_frame_timeout(&mut self, deadline: Duration) -> Result<Inbound> {
        timeout(deadline, self.recv_frame())
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Encode and send a frame with a registered message id.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let bytes = self.codec.encode_frame(frame)?;
        self.transport.send(&bytes).await?;
        Ok(())
    }

    /// Encode and send a typed message from this endpoint.
    pub async fn send_message<M: MessageData>(&mut self, message: &M) -> Result<()> {
        let bytes = self.codec.encode_message(self.identity, message);
        self.transport.send(&bytes).await?;
        Ok(())
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn identity(&self) -> EndpointIdentity {
        self.identity
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn transport_type(&self) -> &'static str {
        self.transport.transport_type()
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}
