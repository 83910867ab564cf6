//! MAVLink v2 wire protocol.
//!
//! Defines the frame format, the message registry, typed messages, and the
//! frame codec.
//!
//! ## Frame Format
//!
//! ```text
//! ┌────────────┬─────────┬───────────┬─────────┬─────┬─────┬──────┬──────────┐
//! │ STX 0xFD   │ Len (1) │ Incompat  │ Compat  │ Seq │ Sys │ Comp │ MsgId(3) │
//! ├────────────┴─────────┴───────────┴─────────┴─────┴─────┴──────┴──────────┤
//! │                         Payload (0..=255)                                │
//! ├──────────────────┬───────────────────────────────────────────────────────┤
//! │ Checksum (2, LE) │ Signature (13, only if incompat & 0x01)               │
//! └──────────────────┴───────────────────────────────────────────────────────┘
//! ```

mod codec;
mod frame;
mod message;
mod registry;
mod signing;

pub use codec::{CodecConfig, CodecStats, Decoded, FrameCodec, Inbound};
pub use frame::{Frame, Signature, SignatureStatus};
pub use message::{HeartbeatMessage, MessageData, PingMessage};
pub use registry::{
    FieldDescriptor, FieldType, FieldValue, MessageDescriptor, MessageRegistry, HEARTBEAT, PING,
    STANDARD_MESSAGES,
};
pub use signing::{signing_timestamp_now, SigningConfig, SIGNING_KEY_LEN};

use crc::{Crc, CRC_16_MCRF4XX};

/// Start-of-frame marker for MAVLink v2.
pub const MAV_STX_V2: u8 = 0xFD;

/// Start-of-frame marker for MAVLink v1 (detected, never decoded).
pub const MAV_STX_V1: u8 = 0xFE;

/// v2 header size in bytes, marker excluded.
pub const HEADER_SIZE: usize = 9;

/// v1 header size in bytes, marker excluded.
pub const V1_HEADER_SIZE: usize = 5;

/// Checksum trailer size.
pub const CHECKSUM_SIZE: usize = 2;

/// Signature trailer size.
pub const SIGNATURE_SIZE: usize = 13;

/// Maximum payload size.
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// Largest possible v2 frame on the wire.
pub const MAX_FRAME_SIZE: usize = 1 + HEADER_SIZE + MAX_PAYLOAD_SIZE + CHECKSUM_SIZE + SIGNATURE_SIZE;

/// Incompatibility flag: frame carries a signature.
pub const IFLAG_SIGNED: u8 = 0x01;

/// All incompatibility flags this codec understands.
pub const SUPPORTED_IFLAGS: u8 = IFLAG_SIGNED;

const X25: Crc<u16> = Crc::<u16>::new(&CRC_16_MCRF4XX);

/// Calculate the MAVLink checksum of `data` seeded with `crc_extra`.
///
/// `data` is everything between the start marker and the checksum.
pub fn checksum(data: &[u8], crc_extra: u8) -> u16 {
    let mut digest = X25.digest();
    digest.update(data);
    digest.update(&[crc_extra]);
    digest.finalize()
}

/// Strip trailing zero bytes from a v2 payload, keeping at least one byte.
pub fn trim_payload(payload: &[u8]) -> &[u8] {
    let len = payload
        .iter()
        .rposition(|b| *b != 0)
        .map_or(1, |last| last + 1)
        .min(payload.len());
    &payload[..len]
}
