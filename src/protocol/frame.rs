//! Frame structure and handling.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, BytesMut};

use crate::error::CodecError;
use crate::types::{EndpointIdentity, PeerIdentity};

use super::message::MessageData;
use super::{trim_payload, CHECKSUM_SIZE, HEADER_SIZE, IFLAG_SIGNED, MAV_STX_V2, SIGNATURE_SIZE};

/// Signing trailer of a v2 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Link the signature was produced for.
    pub link_id: u8,
    /// 48-bit timestamp in 10 µs units since 2015-01-01.
    pub timestamp: u64,
    /// First six bytes of the SHA-256 digest.
    pub value: [u8; 6],
}

impl Signature {
    /// Parse the 13-byte trailer.
    pub fn parse(buf: &[u8]) -> Self {
        let mut value = [0u8; 6];
        value.copy_from_slice(&buf[7..13]);
        Self {
            link_id: buf[0],
            timestamp: LittleEndian::read_u48(&buf[1..7]),
            value,
        }
    }

    /// Append the 13-byte trailer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        let mut ts = [0u8; 6];
        LittleEndian::write_u48(&mut ts, self.timestamp & 0xFFFF_FFFF_FFFF);
        dst.put_u8(self.link_id);
        dst.put_slice(&ts);
        dst.put_slice(&self.value);
    }
}

/// Outcome of signature checking on a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Frame carried no signature.
    Unsigned,
    /// Signature matched the configured key.
    Verified,
    /// Frame was signed but could not be verified.
    Unverified,
}

/// A MAVLink v2 frame: header fields, payload, checksum and optional signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub incompat_flags: u8,
    pub compat_flags: u8,
    /// Link-level sequence, wraps at 256.
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    /// 24-bit message id.
    pub message_id: u32,
    pub payload: Vec<u8>,
    pub checksum: u16,
    pub signature: Option<Signature>,
}

impl Frame {
    /// Protocol version marker written in front of every frame.
    pub const MAGIC: u8 = MAV_STX_V2;

    /// Build an unsent frame carrying `message` from `source`.
    ///
    /// Sequence and checksum stay zero until the codec encodes the frame.
    pub fn from_message<M: MessageData>(source: EndpointIdentity, message: &M) -> Self {
        Self {
            incompat_flags: 0,
            compat_flags: 0,
            sequence: 0,
            system_id: source.system_id,
            component_id: source.component_id,
            message_id: M::ID,
            payload: message.to_payload(),
            checksum: 0,
            signature: None,
        }
    }

    /// Interpret the payload as `M`.
    pub fn decode_message<M: MessageData>(&self) -> Result<M, CodecError> {
        if self.message_id != M::ID {
            return Err(CodecError::MessageMismatch {
                message_id: self.message_id,
                expected: M::NAME,
            });
        }
        Ok(M::from_payload(&self.payload))
    }

    /// Sender of this frame.
    pub fn peer(&self) -> PeerIdentity {
        PeerIdentity::new(self.system_id, self.component_id)
    }

    /// Payload length as carried in the header.
    pub fn payload_len(&self) -> u8 {
        self.payload.len() as u8
    }

    /// Check if the signing flag is set.
    pub fn is_signed(&self) -> bool {
        self.incompat_flags & IFLAG_SIGNED != 0
    }

    /// Total size on the wire.
    pub fn encoded_len(&self) -> usize {
        let signature = if self.is_signed() { SIGNATURE_SIZE } else { 0 };
        1 + HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE + signature
    }

    /// The nine header bytes following the marker.
    pub fn header_bytes(&self) -> [u8; HEADER_SIZE] {
        let id = self.message_id.to_le_bytes();
        [
            self.payload_len(),
            self.incompat_flags,
            self.compat_flags,
            self.sequence,
            self.system_id,
            self.component_id,
            id[0],
            id[1],
            id[2],
        ]
    }

    /// Compute the checksum over header and payload.
    pub fn compute_checksum(&self, crc_extra: u8) -> u16 {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header_bytes());
        buf.extend_from_slice(&self.payload);
        super::checksum(&buf, crc_extra)
    }

    /// Write marker, header, payload and checksum (no signature).
    pub fn write_unsigned(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(Self::MAGIC);
        dst.put_slice(&self.header_bytes());
        dst.put_slice(&self.payload);
        dst.put_u16_le(self.checksum);
    }

    /// Write the complete frame including the signature trailer, if any.
    pub fn write_to(&self, dst: &mut BytesMut) {
        self.write_unsigned(dst);
        if let Some(signature) = self.signature {
            signature.write_to(dst);
        }
    }

    /// Replace the payload with its truncated v2 form.
    pub fn trim(&mut self) {
        let len = trim_payload(&self.payload).len();
        self.payload.truncate(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PingMessage;

    #[test]
    fn test_from_message_trims_payload() {
        let ping = PingMessage::new(0, 42, 0, 0);
        let frame = Frame::from_message(EndpointIdentity::new(12, 1), &ping);
        assert_eq!(frame.message_id, PingMessage::ID);
        assert_eq!(frame.system_id, 12);
        // seq=42 sits at offset 8, everything after it is zero
        assert_eq!(frame.payload.len(), 9);
        assert_eq!(frame.decode_message::<PingMessage>().unwrap(), ping);
    }

    #[test]
    fn test_header_bytes_layout() {
        let frame = Frame {
            incompat_flags: 0,
            compat_flags: 0,
            sequence: 7,
            system_id: 1,
            component_id: 2,
            message_id: 0x01_02_03,
            payload: vec![9; 3],
            checksum: 0,
            signature: None,
        };
        assert_eq!(frame.header_bytes(), [3, 0, 0, 7, 1, 2, 0x03, 0x02, 0x01]);
        assert_eq!(frame.encoded_len(), 1 + 9 + 3 + 2);
    }

    #[test]
    fn test_signature_trailer_layout() {
        let signature = Signature {
            link_id: 3,
            timestamp: 0x0000_0102_0304_0506,
            value: [0xAA; 6],
        };
        let mut buf = BytesMut::new();
        signature.write_to(&mut buf);
        assert_eq!(buf.len(), SIGNATURE_SIZE);
        assert_eq!(&buf[1..7], &[0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(Signature::parse(&buf), signature);
    }

    #[test]
    fn test_decode_message_mismatch() {
        let frame = Frame::from_message(EndpointIdentity::default(), &PingMessage::new(1, 2, 3, 4));
        let err = frame
            .decode_message::<crate::protocol::HeartbeatMessage>()
            .unwrap_err();
        assert!(matches!(err, CodecError::MessageMismatch { message_id: 4, .. }));
    }
}
