//! Message registry: id → payload layout and CRC_EXTRA.

use std::collections::HashMap;
use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use super::message::{HeartbeatMessage, MessageData, PingMessage};

/// Primitive field type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Char,
}

impl FieldType {
    /// Width in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 | Self::Char => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    fn read(self, buf: &[u8]) -> FieldValue {
        match self {
            Self::U8 => FieldValue::Unsigned(u64::from(buf[0])),
            Self::I8 => FieldValue::Signed(i64::from(buf[0] as i8)),
            Self::U16 => FieldValue::Unsigned(u64::from(LittleEndian::read_u16(buf))),
            Self::I16 => FieldValue::Signed(i64::from(LittleEndian::read_i16(buf))),
            Self::U32 => FieldValue::Unsigned(u64::from(LittleEndian::read_u32(buf))),
            Self::I32 => FieldValue::Signed(i64::from(LittleEndian::read_i32(buf))),
            Self::U64 => FieldValue::Unsigned(LittleEndian::read_u64(buf)),
            Self::I64 => FieldValue::Signed(LittleEndian::read_i64(buf)),
            Self::F32 => FieldValue::Float(f64::from(LittleEndian::read_f32(buf))),
            Self::F64 => FieldValue::Float(LittleEndian::read_f64(buf)),
            Self::Char => FieldValue::Text(char::from(buf[0]).to_string()),
        }
    }
}

/// Placement of one field inside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub ty: FieldType,
    /// Byte offset in the untruncated payload.
    pub offset: usize,
    /// Array length, 1 for scalars.
    pub count: usize,
    /// Field belongs to the v2 extension block.
    pub extension: bool,
}

impl FieldDescriptor {
    pub const fn scalar(name: &'static str, ty: FieldType, offset: usize) -> Self {
        Self {
            name,
            ty,
            offset,
            count: 1,
            extension: false,
        }
    }

    /// Bytes occupied by the field.
    pub const fn width(&self) -> usize {
        self.ty.size() * self.count
    }
}

/// Decoded field value, for logging and inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    Array(Vec<FieldValue>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Layout of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub id: u32,
    pub name: &'static str,
    pub crc_extra: u8,
    pub fields: &'static [FieldDescriptor],
}

impl MessageDescriptor {
    /// Untruncated payload length, extensions included.
    pub fn encoded_len(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.offset + f.width())
            .max()
            .unwrap_or(0)
    }

    /// Payload length without extension fields (the v1 length).
    pub fn base_len(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| !f.extension)
            .map(|f| f.offset + f.width())
            .max()
            .unwrap_or(0)
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Read every field out of a (possibly truncated) payload.
    pub fn decode_fields(&self, payload: &[u8]) -> Vec<(&'static str, FieldValue)> {
        let mut buf = vec![0u8; self.encoded_len()];
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);

        self.fields
            .iter()
            .map(|field| {
                let bytes = &buf[field.offset..field.offset + field.width()];
                let value = if field.count == 1 {
                    field.ty.read(bytes)
                } else if field.ty == FieldType::Char {
                    let text = bytes.iter().take_while(|b| **b != 0).map(|b| char::from(*b)).collect();
                    FieldValue::Text(text)
                } else {
                    FieldValue::Array(
                        bytes
                            .chunks_exact(field.ty.size())
                            .map(|chunk| field.ty.read(chunk))
                            .collect(),
                    )
                };
                (field.name, value)
            })
            .collect()
    }

    /// One-line rendering used in debug logs.
    pub fn describe(&self, payload: &[u8]) -> String {
        let fields = self
            .decode_fields(payload)
            .into_iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} {{{fields}}}", self.name)
    }
}

/// PING layout.
pub const PING: MessageDescriptor = MessageDescriptor {
    id: PingMessage::ID,
    name: PingMessage::NAME,
    crc_extra: PingMessage::CRC_EXTRA,
    fields: &[
        FieldDescriptor::scalar("time_usec", FieldType::U64, 0),
        FieldDescriptor::scalar("seq", FieldType::U32, 8),
        FieldDescriptor::scalar("target_system", FieldType::U8, 12),
        FieldDescriptor::scalar("target_component", FieldType::U8, 13),
    ],
};

/// HEARTBEAT layout.
pub const HEARTBEAT: MessageDescriptor = MessageDescriptor {
    id: HeartbeatMessage::ID,
    name: HeartbeatMessage::NAME,
    crc_extra: HeartbeatMessage::CRC_EXTRA,
    fields: &[
        FieldDescriptor::scalar("custom_mode", FieldType::U32, 0),
        FieldDescriptor::scalar("type", FieldType::U8, 4),
        FieldDescriptor::scalar("autopilot", FieldType::U8, 5),
        FieldDescriptor::scalar("base_mode", FieldType::U8, 6),
        FieldDescriptor::scalar("system_status", FieldType::U8, 7),
        FieldDescriptor::scalar("mavlink_version", FieldType::U8, 8),
    ],
};

/// Messages every registry starts with.
pub static STANDARD_MESSAGES: &[MessageDescriptor] = &[HEARTBEAT, PING];

/// Lookup table from message id to descriptor.
///
/// Built once, then shared read-only (usually behind an `Arc`) by every
/// codec instance.
#[derive(Debug, Clone, Default)]
pub struct MessageRegistry {
    messages: HashMap<u32, MessageDescriptor>,
}

impl MessageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with [`STANDARD_MESSAGES`].
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for descriptor in STANDARD_MESSAGES {
            registry.register(*descriptor);
        }
        registry
    }

    /// Add or replace a descriptor. Returns the one it replaced.
    pub fn register(&mut self, descriptor: MessageDescriptor) -> Option<MessageDescriptor> {
        self.messages.insert(descriptor.id, descriptor)
    }

    /// Find the descriptor for a message id.
    pub fn lookup(&self, message_id: u32) -> Option<&MessageDescriptor> {
        self.messages.get(&message_id)
    }

    /// CRC_EXTRA for a message id.
    pub fn crc_extra(&self, message_id: u32) -> Option<u8> {
        self.lookup(message_id).map(|d| d.crc_extra)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterate over registered descriptors in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &MessageDescriptor> {
        self.messages.values()
    }
}
