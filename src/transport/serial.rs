//! Serial port transport.
//!
//! `serialport` is blocking, so a dedicated reader thread feeds chunks into
//! a channel and writes run on the blocking pool.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use serialport::SerialPort;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::Transport;
use crate::error::{Result, TransportError};

const READ_POLL: Duration = Duration::from_millis(100);
const CHUNK_SIZE: usize = 512;

type Chunk = std::io::Result<Vec<u8>>;

struct Inbox {
    rx: mpsc::Receiver<Chunk>,
    pending: BytesMut,
}

/// Serial device transport.
pub struct SerialTransport {
    path: String,
    baud: u32,
    writer: Arc<parking_lot::Mutex<Box<dyn SerialPort>>>,
    inbox: Mutex<Inbox>,
    running: Arc<AtomicBool>,
}

impl SerialTransport {
    /// Open `path` at `baud` and start the reader thread.
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(READ_POLL)
            .open()
            .map_err(|e| TransportError::Serial(format!("{path}: {e}")))?;
        let reader = port
            .try_clone()
            .map_err(|e| TransportError::Serial(format!("{path}: {e}")))?;

        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(64);

        let flag = Arc::clone(&running);
        let name = path.to_string();
        thread::Builder::new()
            .name("serial-reader".into())
            .spawn(move || read_loop(reader, tx, flag, name))
            .map_err(|e| TransportError::Serial(e.to_string()))?;

        debug!(path, baud, "Opened serial port");

        Ok(Self {
            path: path.to_string(),
            baud,
            writer: Arc::new(parking_lot::Mutex::new(port)),
            inbox: Mutex::new(Inbox {
                rx,
                pending: BytesMut::new(),
            }),
            running,
        })
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    tx: mpsc::Sender<Chunk>,
    running: Arc<AtomicBool>,
    name: String,
) {
    let mut buf = [0u8; CHUNK_SIZE];
    while running.load(Ordering::Acquire) {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {
                continue
            }
            Err(e) => {
                warn!(port = %name, error = %e, "Serial read failed");
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
    debug!(port = %name, "Serial reader stopped");
}

#[async_trait]
impl Transport for SerialTransport {
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut inbox = self.inbox.lock().await;

        if inbox.pending.is_empty() {
            match inbox.rx.recv().await {
                Some(Ok(chunk)) => inbox.pending.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string()).into()),
                None => return Ok(0),
            }
        }

        let n = inbox.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&inbox.pending[..n]);
        inbox.pending.advance(n);
        Ok(n)
    }

    async fn send(&self, data: &[u8]) -> Result<usize> {
        let writer = Arc::clone(&self.writer);
        let data = data.to_vec();
        let len = data.len();

        tokio::task::spawn_blocking(move || {
            let mut port = writer.lock();
            port.write_all(&data)?;
            port.flush()
        })
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        Ok(len)
    }

    async fn close(&self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn transport_type(&self) -> &'static str {
        "serial"
    }

    fn describe(&self) -> String {
        format!("serial {} @ {} baud", self.path, self.baud)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
