//! PING responder.
//!
//! Answers unaddressed (broadcast) PING requests with a reply addressed back
//! to the requester. Addressed pings are left alone, whoever they target.

use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, ErrorContext, Result};
use crate::protocol::{Frame, Inbound, MessageData, PingMessage, SignatureStatus};
use crate::signals::ShutdownSignal;
use crate::transport::MavConnection;
use crate::types::{EndpointIdentity, PeerIdentity};

/// Check if `frame` is a PING with both targets zero.
pub fn is_broadcast_ping(frame: &Frame) -> bool {
    frame.message_id == PingMessage::ID
        && frame
            .decode_message::<PingMessage>()
            .map(|ping| ping.is_broadcast())
            .unwrap_or(false)
}

/// Pure request-to-reply mapping.
#[derive(Debug, Clone, Copy)]
pub struct PingResponder {
    identity: EndpointIdentity,
}

impl PingResponder {
    pub fn new(identity: EndpointIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> EndpointIdentity {
        self.identity
    }

    /// Build the reply to `frame` from `peer`, if it deserves one.
    ///
    /// The reply's frame sequence is left for the codec to assign.
    pub fn on_frame(&self, frame: &Frame, peer: PeerIdentity) -> Option<Frame> {
        if !is_broadcast_ping(frame) {
            return None;
        }
        let request = frame.decode_message::<PingMessage>().ok()?;

        let reply = PingMessage::reply_to(&request, peer);
        Some(Frame::from_message(self.identity, &reply))
    }
}

/// Responder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    Listening,
    /// Terminal.
    Shutdown,
}

/// Why the responder loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Shutdown was requested.
    Cancelled,
    /// The peer closed the stream.
    TransportClosed,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::TransportClosed => write!(f, "transport closed"),
        }
    }
}

/// Counters kept by [`ResponderService`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponderStats {
    pub frames_seen: u64,
    pub pings_seen: u64,
    pub replies_sent: u64,
    pub ignored_pings: u64,
    pub unknown_frames: u64,
    pub unverified_frames: u64,
}

/// Receive, filter, respond loop over one connection.
pub struct ResponderService {
    connection: MavConnection,
    responder: PingResponder,
    state: ResponderState,
    stats: ResponderStats,
}

impl ResponderService {
    /// Answer as the connection's own identity.
    pub fn new(connection: MavConnection) -> Self {
        let responder = PingResponder::new(connection.identity());
        Self {
            connection,
            responder,
            state: ResponderState::Listening,
            stats: ResponderStats::default(),
        }
    }

    pub fn state(&self) -> ResponderState {
        self.state
    }

    pub fn stats(&self) -> ResponderStats {
        self.stats
    }

    pub fn connection(&self) -> &MavConnection {
        &self.connection
    }

    /// Serve until shutdown, stream closure or a transport failure.
    ///
    /// Cancellation is checked between frames; a frame being decoded is never
    /// abandoned halfway.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<ShutdownReason> {
        if self.state == ResponderState::Shutdown {
            return Ok(ShutdownReason::Cancelled);
        }

        info!(
            identity = %self.responder.identity(),
            transport = %self.connection.describe(),
            "Responder listening"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    return Ok(self.finish(ShutdownReason::Cancelled));
                }
                received = self.connection.recv_frame() => received,
            };

            let result = match received {
                Ok(inbound) => self.handle(inbound).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {}
                Err(Error::TransportClosed) => {
                    return Ok(self.finish(ShutdownReason::TransportClosed));
                }
                Err(e) if e.is_fatal() => {
                    self.state = ResponderState::Shutdown;
                    let context = ErrorContext {
                        endpoint: Some(self.connection.describe()),
                        operation: "serve".into(),
                    };
                    error!(%context, "Responder stopped: {e}");
                    return Err(e);
                }
                Err(e) => warn!("Dropping frame: {e}"),
            }
        }
    }

    async fn handle(&mut self, inbound: Inbound) -> Result<()> {
        self.stats.frames_seen += 1;

        let (frame, signature) = match inbound {
            Inbound::Frame(frame, signature) => (frame, signature),
            Inbound::Unknown(frame) => {
                self.stats.unknown_frames += 1;
                trace!(
                    message_id = frame.message_id,
                    peer = %frame.peer(),
                    "Passing through unknown message"
                );
                return Ok(());
            }
        };

        if signature == SignatureStatus::Unverified {
            self.stats.unverified_frames += 1;
        }
        if frame.message_id != PingMessage::ID {
            return Ok(());
        }

        self.stats.pings_seen += 1;
        let peer = frame.peer();
        let Some(reply) = self.responder.on_frame(&frame, peer) else {
            self.stats.ignored_pings += 1;
            trace!(%peer, "Ignoring addressed ping");
            return Ok(());
        };

        if let Some(descriptor) = self.connection.codec().registry().lookup(frame.message_id) {
            debug!(
                %peer,
                sequence = frame.sequence,
                ?signature,
                "Incoming ping request: {}",
                descriptor.describe(&frame.payload)
            );
        }

        self.connection.send_frame(&reply).await?;
        self.stats.replies_sent += 1;
        Ok(())
    }

    fn finish(&mut self, reason: ShutdownReason) -> ShutdownReason {
        self.state = ResponderState::Shutdown;
        info!(
            %reason,
            replies = self.stats.replies_sent,
            frames = self.stats.frames_seen,
            "Responder stopped"
        );
        reason
    }
}
