//! Active PING client.
//!
//! Sends one broadcast PING per round and waits for the matching reply from
//! the target, measuring the round-trip time.

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{Frame, Inbound, MessageData, PingMessage};
use crate::signals::ShutdownSignal;
use crate::transport::MavConnection;
use crate::types::{EndpointIdentity, PeerIdentity, BROADCAST_ID};

/// Pinger settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingerConfig {
    /// Who is expected to answer.
    pub target: PeerIdentity,
    /// Number of rounds; `None` runs until cancelled.
    pub count: Option<u32>,
    /// Pause after a reply before the next request.
    pub interval: Duration,
    /// How long to wait for a reply.
    pub timeout: Duration,
}

impl PingerConfig {
    pub fn new(target: PeerIdentity) -> Self {
        Self {
            target,
            count: None,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
        }
    }
}

/// Outcome of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingEvent {
    Reply { seq: u32, rtt: Duration },
    Timeout { seq: u32 },
}

/// Totals printed when the pinger stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSummary {
    pub target: PeerIdentity,
    pub transmitted: u32,
    pub received: u32,
    pub lost: u32,
    pub elapsed: Duration,
    pub rtt_min: Option<Duration>,
    pub rtt_avg: Option<Duration>,
    pub rtt_max: Option<Duration>,
}

impl PingSummary {
    /// Lost replies as a share of answered-or-timed-out rounds.
    pub fn loss_percent(&self) -> f64 {
        let settled = self.received + self.lost;
        if settled == 0 {
            return 0.0;
        }
        f64::from(self.lost) / f64::from(settled) * 100.0
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Display for PingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} ping statistics ---", self.target)?;
        write!(
            f,
            "{} packets transmitted, {} received, {:.0}% packet loss, time {:.0} ms",
            self.transmitted,
            self.received,
            self.loss_percent(),
            millis(self.elapsed)
        )?;
        if let (Some(min), Some(avg), Some(max)) = (self.rtt_min, self.rtt_avg, self.rtt_max) {
            write!(
                f,
                "\nrtt min/avg/max = {:.3}/{:.3}/{:.3} ms",
                millis(min),
                millis(avg),
                millis(max)
            )?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct RttStats {
    count: u32,
    sum: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
}

impl RttStats {
    fn record(&mut self, rtt: Duration) {
        self.count += 1;
        self.sum += rtt;
        self.min = Some(self.min.map_or(rtt, |m| m.min(rtt)));
        self.max = Some(self.max.map_or(rtt, |m| m.max(rtt)));
    }

    fn avg(&self) -> Option<Duration> {
        (self.count > 0).then(|| self.sum / self.count)
    }
}

enum Round {
    Reply(Duration),
    Timeout,
    Cancelled,
    Closed,
}

/// Check if `frame` answers request `seq` sent by `identity` to `target`.
pub fn is_reply_to(frame: &Frame, seq: u32, identity: EndpointIdentity, target: PeerIdentity) -> bool {
    if frame.message_id != PingMessage::ID || frame.peer() != target {
        return false;
    }
    match frame.decode_message::<PingMessage>() {
        Ok(ping) => ping.seq == seq && identity.is_target_of(ping.target_system, ping.target_component),
        Err(_) => false,
    }
}

/// Ping client over one connection.
pub struct Pinger {
    connection: MavConnection,
    config: PingerConfig,
}

impl Pinger {
    pub fn new(connection: MavConnection, config: PingerConfig) -> Self {
        Self { connection, config }
    }

    pub fn connection(&self) -> &MavConnection {
        &self.connection
    }

    /// Run rounds until the count is reached, shutdown or stream closure.
    ///
    /// `on_event` sees every reply and timeout as it happens.
    pub async fn run<F>(&mut self, mut shutdown: ShutdownSignal, mut on_event: F) -> Result<PingSummary>
    where
        F: FnMut(PingEvent),
    {
        let started = Instant::now();
        let mut transmitted = 0u32;
        let mut lost = 0u32;
        let mut rtt = RttStats::default();
        let count = self.config.count.filter(|c| *c > 0);

        info!(
            target = %self.config.target,
            transport = %self.connection.describe(),
            "Pinging"
        );

        let mut seq = 0u32;
        loop {
            if count.is_some_and(|c| seq >= c) {
                break;
            }

            let request = PingMessage::request(seq, BROADCAST_ID, BROADCAST_ID);
            self.connection.send_message(&request).await?;
            transmitted += 1;

            match self.await_reply(seq, &mut shutdown).await? {
                Round::Reply(elapsed) => {
                    rtt.record(elapsed);
                    on_event(PingEvent::Reply { seq, rtt: elapsed });

                    let last = count.is_some_and(|c| seq + 1 >= c);
                    if !last {
                        tokio::select! {
                            biased;
                            _ = shutdown.wait() => break,
                            _ = sleep(self.config.interval) => {}
                        }
                    }
                }
                Round::Timeout => {
                    lost += 1;
                    debug!(seq, "Ping response timeout");
                    on_event(PingEvent::Timeout { seq });
                }
                Round::Cancelled => break,
                Round::Closed => {
                    info!("Transport closed");
                    break;
                }
            }

            seq = seq.wrapping_add(1);
        }

        Ok(PingSummary {
            target: self.config.target,
            transmitted,
            received: rtt.count,
            lost,
            elapsed: started.elapsed(),
            rtt_min: rtt.min,
            rtt_avg: rtt.avg(),
            rtt_max: rtt.max,
        })
    }

    async fn await_reply(&mut self, seq: u32, shutdown: &mut ShutdownSignal) -> Result<Round> {
        let sent_at = Instant::now();
        let deadline = sent_at + self.config.timeout;
        let identity = self.connection.identity();
        let target = self.config.target;

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.wait() => return Ok(Round::Cancelled),
                _ = sleep_until(deadline) => return Ok(Round::Timeout),
                received = self.connection.recv_frame() => received,
            };

            match received {
                Ok(Inbound::Frame(frame, _)) if is_reply_to(&frame, seq, identity, target) => {
                    return Ok(Round::Reply(sent_at.elapsed()));
                }
                Ok(_) => {}
                Err(Error::TransportClosed) => return Ok(Round::Closed),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("Ignoring frame: {e}"),
            }
        }
    }
}
