//! Core types used throughout mavping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Component id of the first autopilot (`MAV_COMP_ID_AUTOPILOT1`).
pub const MAV_COMP_ID_AUTOPILOT1: u8 = 1;

/// System id conventionally used by ground stations and utilities.
pub const DEFAULT_SYSTEM_ID: u8 = 255;

/// System/component id 0 addresses everybody.
pub const BROADCAST_ID: u8 = 0;

/// Default serial baud rate when the descriptor does not name one.
pub const DEFAULT_SERIAL_BAUD: u32 = 57_600;

/// Identity of this node on the MAVLink network. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointIdentity {
    pub system_id: u8,
    pub component_id: u8,
}

impl EndpointIdentity {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
        }
    }

    /// Check whether a (system, component) target pair names this node.
    pub fn is_target_of(&self, target_system: u8, target_component: u8) -> bool {
        target_system == self.system_id && target_component == self.component_id
    }
}

impl Default for EndpointIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_ID, MAV_COMP_ID_AUTOPILOT1)
    }
}

impl fmt::Display for EndpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system_id, self.component_id)
    }
}

/// Identity of a remote sender, taken from an inbound frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    pub system_id: u8,
    pub component_id: u8,
}

impl PeerIdentity {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system_id, self.component_id)
    }
}

/// Parsed transport descriptor.
///
/// Accepts `scheme://rest` and the pymavlink `scheme:rest` spelling, plus bare
/// serial device paths with an optional `,baud` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    /// Listen for UDP datagrams; replies go to the latest sender.
    UdpIn { addr: String },
    /// Send UDP datagrams to a fixed remote address.
    UdpOut { addr: String },
    /// Connect to a TCP server.
    TcpOut { addr: String },
    /// Listen for a single TCP client.
    TcpIn { addr: String },
    /// Serial device.
    Serial { path: String, baud: u32 },
}

impl Endpoint {
    /// Short scheme name.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::UdpIn { .. } => "udpin",
            Self::UdpOut { .. } => "udpout",
            Self::TcpOut { .. } => "tcp",
            Self::TcpIn { .. } => "tcpin",
            Self::Serial { .. } => "serial",
        }
    }

    /// Check if the endpoint waits for the peer to talk first.
    pub fn is_listener(&self) -> bool {
        matches!(self, Self::UdpIn { .. } | Self::TcpIn { .. })
    }
}

fn invalid(endpoint: &str, reason: impl Into<String>) -> Error {
    Error::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.into(),
    }
}

fn parse_host_port(endpoint: &str, rest: &str) -> Result<String, Error> {
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| invalid(endpoint, "expected host:port"))?;
    if host.is_empty() {
        return Err(invalid(endpoint, "missing host"));
    }
    port.parse::<u16>()
        .map_err(|_| invalid(endpoint, format!("invalid port '{port}'")))?;
    Ok(rest.to_string())
}

fn parse_serial(endpoint: &str, rest: &str) -> Result<Endpoint, Error> {
    let (path, baud) = if let Some((path, query)) = rest.split_once('?') {
        let baud = query
            .split('&')
            .find_map(|kv| kv.strip_prefix("baud="))
            .ok_or_else(|| invalid(endpoint, "expected ?baud=<rate>"))?;
        (path, Some(baud))
    } else if let Some((path, baud)) = rest.rsplit_once(',') {
        (path, Some(baud))
    } else {
        (rest, None)
    };

    if path.is_empty() {
        return Err(invalid(endpoint, "missing serial device path"));
    }

    let baud = match baud {
        Some(b) => b
            .parse::<u32>()
            .ok()
            .filter(|b| *b > 0)
            .ok_or_else(|| invalid(endpoint, format!("invalid baud rate '{b}'")))?,
        None => DEFAULT_SERIAL_BAUD,
    };

    Ok(Endpoint::Serial {
        path: path.to_string(),
        baud,
    })
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(invalid(s, "empty endpoint"));
        }

        let split = s
            .split_once("://")
            .or_else(|| s.split_once(':').filter(|(scheme, _)| is_scheme(scheme)));

        let Some((scheme, rest)) = split else {
            // Bare device path, e.g. /dev/ttyACM0,115200
            return parse_serial(s, s);
        };

        match scheme.to_ascii_lowercase().as_str() {
            "udp" | "udpin" => Ok(Self::UdpIn {
                addr: parse_host_port(s, rest)?,
            }),
            "udpout" => Ok(Self::UdpOut {
                addr: parse_host_port(s, rest)?,
            }),
            "tcp" => Ok(Self::TcpOut {
                addr: parse_host_port(s, rest)?,
            }),
            "tcpin" => Ok(Self::TcpIn {
                addr: parse_host_port(s, rest)?,
            }),
            "serial" => parse_serial(s, rest),
            other => Err(invalid(s, format!("unknown scheme '{other}'"))),
        }
    }
}

fn is_scheme(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "udp" | "udpin" | "udpout" | "tcp" | "tcpin" | "serial"
    )
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UdpIn { addr }
            | Self::UdpOut { addr }
            | Self::TcpOut { addr }
            | Self::TcpIn { addr } => write!(f, "{}://{}", self.scheme(), addr),
            Self::Serial { path, baud } => write!(f, "serial://{path}?baud={baud}"),
        }
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> Self {
        e.to_string()
    }
}
