//! Typed MAVLink messages.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::types::{PeerIdentity, BROADCAST_ID};

use super::trim_payload;

/// A message with a fixed wire layout.
pub trait MessageData: Sized {
    /// Message id.
    const ID: u32;
    /// Message name as in the XML definitions.
    const NAME: &'static str;
    /// Seed byte appended to the checksum.
    const CRC_EXTRA: u8;
    /// Untruncated payload length.
    const ENCODED_LEN: usize;

    /// Write fields into `buf`, which is at least `ENCODED_LEN` bytes long.
    fn serialize(&self, buf: &mut [u8]);

    /// Read fields from `buf`, which is exactly `ENCODED_LEN` bytes long.
    fn deserialize(buf: &[u8]) -> Self;

    /// Encode into a truncated v2 payload.
    fn to_payload(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::ENCODED_LEN];
        self.serialize(&mut buf);
        let len = trim_payload(&buf).len();
        buf.truncate(len);
        buf
    }

    /// Decode from a possibly truncated or extended payload.
    fn from_payload(payload: &[u8]) -> Self {
        let mut buf = vec![0u8; Self::ENCODED_LEN];
        let n = payload.len().min(Self::ENCODED_LEN);
        buf[..n].copy_from_slice(&payload[..n]);
        Self::deserialize(&buf)
    }
}

/// PING (#4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PingMessage {
    /// Sender timestamp in microseconds; 0 in replies that are not timing probes.
    pub time_usec: u64,
    /// Sender's ping sequence.
    pub seq: u32,
    /// 0 for a broadcast request.
    pub target_system: u8,
    /// 0 for a broadcast request.
    pub target_component: u8,
}

impl PingMessage {
    pub fn new(time_usec: u64, seq: u32, target_system: u8, target_component: u8) -> Self {
        Self {
            time_usec,
            seq,
            target_system,
            target_component,
        }
    }

    /// Request addressed to a specific system/component, stamped with wall-clock time.
    pub fn request(seq: u32, target_system: u8, target_component: u8) -> Self {
        let time_usec = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_micros() as u64;
        Self::new(time_usec, seq, target_system, target_component)
    }

    /// Reply to `request` sent by `peer`.
    pub fn reply_to(request: &PingMessage, peer: PeerIdentity) -> Self {
        Self::new(0, request.seq, peer.system_id, peer.component_id)
    }

    /// Check if the request is not addressed to anyone in particular.
    pub fn is_broadcast(&self) -> bool {
        self.target_system == BROADCAST_ID && self.target_component == BROADCAST_ID
    }
}

impl MessageData for PingMessage {
    const ID: u32 = 4;
    const NAME: &'static str = "PING";
    const CRC_EXTRA: u8 = 237;
    const ENCODED_LEN: usize = 14;

    fn serialize(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(&mut buf[0..8], self.time_usec);
        LittleEndian::write_u32(&mut buf[8..12], self.seq);
        buf[12] = self.target_system;
        buf[13] = self.target_component;
    }

    fn deserialize(buf: &[u8]) -> Self {
        Self {
            time_usec: LittleEndian::read_u64(&buf[0..8]),
            seq: LittleEndian::read_u32(&buf[8..12]),
            target_system: buf[12],
            target_component: buf[13],
        }
    }
}

/// HEARTBEAT (#0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub custom_mode: u32,
    pub mav_type: u8,
    pub autopilot: u8,
    pub base_mode: u8,
    pub system_status: u8,
    pub mavlink_version: u8,
}

impl MessageData for HeartbeatMessage {
    const ID: u32 = 0;
    const NAME: &'static str = "HEARTBEAT";
    const CRC_EXTRA: u8 = 50;
    const ENCODED_LEN: usize = 9;

    fn serialize(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..4], self.custom_mode);
        buf[4] = self.mav_type;
        buf[5] = self.autopilot;
        buf[6] = self.base_mode;
        buf[7] = self.system_status;
        buf[8] = self.mavlink_version;
    }

    fn deserialize(buf: &[u8]) -> Self {
        Self {
            custom_mode: LittleEndian::read_u32(&buf[0..4]),
            mav_type: buf[4],
            autopilot: buf[5],
            base_mode: buf[6],
            system_status: buf[7],
            mavlink_version: buf[8],
        }
    }
}
