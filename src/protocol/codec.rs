//! Frame encoding and decoding.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use crate::error::CodecError;
use crate::types::EndpointIdentity;

use super::frame::{Frame, Signature, SignatureStatus};
use super::message::MessageData;
use super::registry::MessageRegistry;
use super::signing::{signing_timestamp_now, SigningConfig};
use super::{
    checksum, CHECKSUM_SIZE, HEADER_SIZE, IFLAG_SIGNED, MAV_STX_V1, MAV_STX_V2, MAX_FRAME_SIZE,
    MAX_PAYLOAD_SIZE, SIGNATURE_SIZE, SUPPORTED_IFLAGS, V1_HEADER_SIZE,
};

/// Codec behaviour switches.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Treat detected MAVLink v1 frames as noise instead of reporting them.
    pub force_v2: bool,
    /// Drop signed frames whose signature cannot be verified.
    pub strict_signing: bool,
    /// Key and link parameters; `None` disables verification and signing.
    pub signing: Option<SigningConfig>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            force_v2: true,
            strict_signing: false,
            signing: None,
        }
    }
}

/// Successful decode of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub frame: Frame,
    /// Bytes of input used, including any skipped garbage in front.
    pub consumed: usize,
    pub signature: SignatureStatus,
}

/// Item produced by the streaming decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Registered message with a valid checksum.
    Frame(Frame, SignatureStatus),
    /// Structurally complete frame with an unregistered id.
    Unknown(Frame),
}

impl Inbound {
    pub fn frame(&self) -> &Frame {
        match self {
            Self::Frame(frame, _) | Self::Unknown(frame) => frame,
        }
    }
}

/// Counters kept by the streaming decoder and the encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    pub frames_decoded: u64,
    pub frames_encoded: u64,
    pub checksum_errors: u64,
    pub unknown_messages: u64,
    pub signature_rejections: u64,
    pub unverified_signatures: u64,
    pub incompatible_frames: u64,
    pub v1_frames: u64,
    pub bytes_skipped: u64,
}

enum V1Probe {
    /// Valid v1 frame of the given length.
    Frame(usize),
    /// Could still be a v1 frame once more bytes arrive.
    Incomplete,
    NotAFrame,
}

/// MAVLink v2 codec.
///
/// Owns the outbound sequence counter. Decoding is pure; the streaming
/// [`Decoder`] impl adds statistics and recovery on top of
/// [`FrameCodec::decode_frame`].
pub struct FrameCodec {
    registry: Arc<MessageRegistry>,
    config: CodecConfig,
    tx_sequence: u8,
    last_signing_timestamp: u64,
    v1_reported: bool,
    stats: CodecStats,
}

impl FrameCodec {
    /// Create a codec over a shared registry.
    pub fn new(registry: Arc<MessageRegistry>, config: CodecConfig) -> Self {
        Self {
            registry,
            config,
            tx_sequence: 0,
            last_signing_timestamp: 0,
            v1_reported: false,
            stats: CodecStats::default(),
        }
    }

    /// Codec with the standard registry and default settings.
    pub fn standard() -> Self {
        Self::new(Arc::new(MessageRegistry::standard()), CodecConfig::default())
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn stats(&self) -> CodecStats {
        self.stats
    }

    /// Sequence number the next encoded frame will carry.
    pub fn next_tx_sequence(&self) -> u8 {
        self.tx_sequence
    }

    /// Decode the first frame in `buf`.
    ///
    /// Leading bytes that cannot start a frame are skipped. Every error tells
    /// the caller how many bytes to drop before trying again.
    pub fn decode_frame(&self, buf: &[u8]) -> Result<Decoded, CodecError> {
        let mut offset = 0;

        loop {
            let Some(rel) = buf[offset..]
                .iter()
                .position(|b| *b == MAV_STX_V2 || *b == MAV_STX_V1)
            else {
                return Err(CodecError::Incomplete { discard: buf.len() });
            };
            let pos = offset + rel;

            if buf[pos] == MAV_STX_V1 {
                match self.probe_v1(&buf[pos..]) {
                    V1Probe::Frame(len) => {
                        return Err(CodecError::UnsupportedVersion {
                            version: 1,
                            discard: pos + len,
                        });
                    }
                    // A v2 frame further on wins over a v1 frame that may never complete
                    V1Probe::Incomplete if !buf[pos + 1..].contains(&MAV_STX_V2) => {
                        return Err(CodecError::Incomplete { discard: pos });
                    }
                    V1Probe::Incomplete | V1Probe::NotAFrame => {
                        offset = pos + 1;
                        continue;
                    }
                }
            }

            return match self.decode_v2_at(buf, pos) {
                Err(CodecError::Incomplete { discard }) => self
                    .complete_frame_after(buf, pos)
                    .unwrap_or(Err(CodecError::Incomplete { discard })),
                result => result,
            };
        }
    }

    /// First complete, checksum-valid v2 frame starting after `pos`.
    ///
    /// A stray marker with a large length byte must not hold back a real
    /// frame that is already buffered behind it.
    fn complete_frame_after(&self, buf: &[u8], pos: usize) -> Option<Result<Decoded, CodecError>> {
        buf.iter()
            .enumerate()
            .skip(pos + 1)
            .filter(|(_, b)| **b == MAV_STX_V2)
            .find_map(|(candidate, _)| match self.decode_v2_at(buf, candidate) {
                Ok(decoded) => Some(Ok(decoded)),
                Err(error @ CodecError::Signature { .. }) => Some(Err(error)),
                Err(_) => None,
            })
    }

    fn decode_v2_at(&self, buf: &[u8], pos: usize) -> Result<Decoded, CodecError> {
        let raw = &buf[pos..];
        if raw.len() < 1 + HEADER_SIZE {
            return Err(CodecError::Incomplete { discard: pos });
        }

        let payload_len = raw[1] as usize;
        let incompat_flags = raw[2];
        if incompat_flags & !SUPPORTED_IFLAGS != 0 {
            return Err(CodecError::IncompatibleFlags {
                flags: incompat_flags,
                discard: pos + 1,
            });
        }

        let signed = incompat_flags & IFLAG_SIGNED != 0;
        let unsigned_len = 1 + HEADER_SIZE + payload_len + CHECKSUM_SIZE;
        let total_len = unsigned_len + if signed { SIGNATURE_SIZE } else { 0 };
        if raw.len() < total_len {
            return Err(CodecError::Incomplete { discard: pos });
        }

        let payload_start = 1 + HEADER_SIZE;
        let payload_end = payload_start + payload_len;
        let frame = Frame {
            incompat_flags,
            compat_flags: raw[3],
            sequence: raw[4],
            system_id: raw[5],
            component_id: raw[6],
            message_id: LittleEndian::read_u24(&raw[7..10]),
            payload: raw[payload_start..payload_end].to_vec(),
            checksum: LittleEndian::read_u16(&raw[payload_end..payload_end + CHECKSUM_SIZE]),
            signature: signed.then(|| Signature::parse(&raw[unsigned_len..total_len])),
        };
        let consumed = pos + total_len;

        let Some(descriptor) = self.registry.lookup(frame.message_id) else {
            return Err(CodecError::UnknownMessage {
                frame: Box::new(frame),
                consumed,
            });
        };

        let expected = checksum(&raw[1..payload_end], descriptor.crc_extra);
        if expected != frame.checksum {
            return Err(CodecError::Checksum {
                message_id: frame.message_id,
                expected,
                actual: frame.checksum,
                discard: pos + 1,
            });
        }

        let signature = match (&frame.signature, &self.config.signing) {
            (None, _) => SignatureStatus::Unsigned,
            (Some(sig), Some(signing)) if signing.verify(&raw[..unsigned_len], sig) => {
                SignatureStatus::Verified
            }
            (Some(_), _) if self.config.strict_signing => {
                return Err(CodecError::Signature {
                    frame: Box::new(frame),
                    consumed,
                });
            }
            (Some(_), _) => SignatureStatus::Unverified,
        };

        Ok(Decoded {
            frame,
            consumed,
            signature,
        })
    }

    fn probe_v1(&self, raw: &[u8]) -> V1Probe {
        if raw.len() < 1 + V1_HEADER_SIZE {
            return V1Probe::Incomplete;
        }

        let payload_len = raw[1] as usize;
        let Some(crc_extra) = self.registry.crc_extra(u32::from(raw[5])) else {
            return V1Probe::NotAFrame;
        };

        let crc_at = 1 + V1_HEADER_SIZE + payload_len;
        let total_len = crc_at + CHECKSUM_SIZE;
        if raw.len() < total_len {
            return V1Probe::Incomplete;
        }

        let received = LittleEndian::read_u16(&raw[crc_at..total_len]);
        if checksum(&raw[1..crc_at], crc_extra) == received {
            V1Probe::Frame(total_len)
        } else {
            V1Probe::NotAFrame
        }
    }

    /// Encode a typed message from `source`. Never fails.
    pub fn encode_message<M: MessageData>(&mut self, source: EndpointIdentity, message: &M) -> BytesMut {
        let frame = Frame::from_message(source, message);
        self.encode_with_extra(&frame, M::CRC_EXTRA)
    }

    /// Encode a frame whose message id is registered.
    ///
    /// The frame's own sequence, checksum and signature are replaced.
    pub fn encode_frame(&mut self, frame: &Frame) -> Result<BytesMut, CodecError> {
        if frame.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge {
                size: frame.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let Some(crc_extra) = self.registry.crc_extra(frame.message_id) else {
            return Err(CodecError::UnknownMessage {
                frame: Box::new(frame.clone()),
                consumed: 0,
            });
        };
        Ok(self.encode_with_extra(frame, crc_extra))
    }

    fn encode_with_extra(&mut self, frame: &Frame, crc_extra: u8) -> BytesMut {
        let signing = self
            .config
            .signing
            .clone()
            .filter(|signing| signing.sign_outgoing);

        let mut out = frame.clone();
        out.sequence = self.advance_sequence();
        out.signature = None;
        if signing.is_some() {
            out.incompat_flags |= IFLAG_SIGNED;
        } else {
            out.incompat_flags &= !IFLAG_SIGNED;
        }
        out.checksum = out.compute_checksum(crc_extra);

        let mut buf = BytesMut::with_capacity(out.encoded_len());
        out.write_unsigned(&mut buf);

        if let Some(signing) = signing {
            let timestamp = self.next_signing_timestamp();
            signing.sign(&buf, timestamp).write_to(&mut buf);
        }

        self.stats.frames_encoded += 1;
        buf
    }

    fn advance_sequence(&mut self) -> u8 {
        let seq = self.tx_sequence;
        self.tx_sequence = self.tx_sequence.wrapping_add(1);
        seq
    }

    fn next_signing_timestamp(&mut self) -> u64 {
        let timestamp = signing_timestamp_now().max(self.last_signing_timestamp + 1);
        self.last_signing_timestamp = timestamp;
        timestamp
    }

    fn record_dropped(&mut self, error: &CodecError) {
        match error {
            CodecError::Checksum {
                message_id,
                expected,
                actual,
                ..
            } => {
                self.stats.checksum_errors += 1;
                debug!(
                    message_id,
                    expected = format_args!("{expected:#06x}"),
                    actual = format_args!("{actual:#06x}"),
                    "Dropping frame with bad checksum"
                );
            }
            CodecError::Signature { frame, .. } => {
                self.stats.signature_rejections += 1;
                debug!(
                    message_id = frame.message_id,
                    system_id = frame.system_id,
                    "Dropping frame with unverifiable signature"
                );
            }
            CodecError::IncompatibleFlags { flags, .. } => {
                self.stats.incompatible_frames += 1;
                trace!(flags, "Skipping marker with unsupported incompatibility flags");
            }
            CodecError::UnsupportedVersion { version, .. } => {
                self.stats.v1_frames += 1;
                if self.config.force_v2 {
                    trace!(version, "Skipping MAVLink v1 frame");
                } else if !self.v1_reported {
                    self.v1_reported = true;
                    warn!("Peer is sending MAVLink v{version} frames; only MAVLink 2 is answered");
                }
            }
            _ => {}
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::standard()
    }
}

impl Decoder for FrameCodec {
    type Item = Inbound;
    type Error = crate::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.decode_frame(src) {
                Ok(decoded) => {
                    let skipped = decoded.consumed - decoded.frame.encoded_len();
                    self.stats.bytes_skipped += skipped as u64;
                    self.stats.frames_decoded += 1;
                    if decoded.signature == SignatureStatus::Unverified {
                        self.stats.unverified_signatures += 1;
                    }
                    src.advance(decoded.consumed);
                    return Ok(Some(Inbound::Frame(decoded.frame, decoded.signature)));
                }
                Err(CodecError::Incomplete { discard }) => {
                    self.stats.bytes_skipped += discard as u64;
                    src.advance(discard);
                    src.reserve(MAX_FRAME_SIZE.saturating_sub(src.len()));
                    return Ok(None);
                }
                Err(CodecError::UnknownMessage { frame, consumed }) => {
                    self.stats.unknown_messages += 1;
                    src.advance(consumed);
                    return Ok(Some(Inbound::Unknown(*frame)));
                }
                Err(error) => {
                    let discard = error.discard();
                    self.record_dropped(&error);
                    src.advance(discard);
                }
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = crate::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        let encoded = self.encode_frame(&item)?;
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}
