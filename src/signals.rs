//! Signal handling for graceful shutdown.
//!
//! SIGTERM and SIGINT (Ctrl-C elsewhere) are turned into a broadcast that
//! every long-running loop selects on.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Signal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Terminate signal (SIGTERM).
    Terminate,
    /// Interrupt signal (SIGINT).
    Interrupt,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Terminate => write!(f, "SIGTERM"),
            Signal::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Broadcasts shutdown requests to subscribers.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown: Arc<RwLock<bool>>,
    signal_tx: broadcast::Sender<Signal>,
}

impl SignalHandler {
    pub fn new() -> Self {
        let (signal_tx, _) = broadcast::channel(16);

        Self {
            shutdown: Arc::new(RwLock::new(false)),
            signal_tx,
        }
    }

    /// Check if shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.read()
    }

    /// Request shutdown.
    pub fn request_shutdown(&self) {
        self.raise(Signal::Terminate);
    }

    fn raise(&self, signal: Signal) {
        *self.shutdown.write() = true;
        let _ = self.signal_tx.send(signal);
    }

    fn handle_signal(&self, signal: Signal) {
        info!("Received {signal}, shutting down");
        self.raise(signal);
    }

    /// Wait for SIGTERM or SIGINT.
    #[cfg(unix)]
    pub async fn listen(&self) {
        use futures::StreamExt;
        use signal_hook::consts::signal::{SIGINT, SIGTERM};
        use signal_hook_tokio::Signals;

        let mut signals = match Signals::new([SIGTERM, SIGINT]) {
            Ok(s) => s.fuse(),
            Err(e) => {
                error!("Failed to register signal handlers: {}", e);
                return;
            }
        };

        while let Some(signal) = signals.next().await {
            let sig = match signal {
                SIGTERM => Signal::Terminate,
                SIGINT => Signal::Interrupt,
                _ => continue,
            };
            self.handle_signal(sig);
            break;
        }
    }

    /// Wait for Ctrl-C.
    #[cfg(not(unix))]
    pub async fn listen(&self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => self.handle_signal(Signal::Interrupt),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    }

    /// A handle that resolves once shutdown is requested.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            shutdown: Arc::clone(&self.shutdown),
            rx: self.signal_tx.subscribe(),
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a shutdown request.
pub struct ShutdownSignal {
    shutdown: Arc<RwLock<bool>>,
    rx: broadcast::Receiver<Signal>,
}

impl ShutdownSignal {
    /// Wait for shutdown. Cancel safe.
    pub async fn wait(&mut self) {
        if *self.shutdown.read() {
            return;
        }

        loop {
            match self.rx.recv().await {
                Ok(_) => return,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.read()
    }
}

/// Start listening for signals in the background.
pub fn setup_signal_handlers() -> SignalHandler {
    let handler = SignalHandler::new();

    let listener = handler.clone();
    tokio::spawn(async move {
        listener.listen().await;
    });

    handler
}
