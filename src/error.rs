//! Error types for mavping.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::protocol::Frame;

/// Result type alias for mavping operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mavping.
#[derive(Error, Debug)]
pub enum Error {
    // Codec errors
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    // Transport errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("transport closed")]
    TransportClosed,

    #[error("operation timed out")]
    Timeout,

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Frame decoding and encoding errors.
///
/// Every variant except [`CodecError::MessageMismatch`] and
/// [`CodecError::PayloadTooLarge`] describes what happened
/// to a region of the input buffer and how many bytes of it may be dropped
/// before the next decode attempt.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Not enough bytes for a full frame yet. Not a failure.
    #[error("incomplete frame ({discard} garbage bytes skipped)")]
    Incomplete { discard: usize },

    #[error("checksum mismatch for message {message_id}: expected {expected:#06x}, got {actual:#06x}")]
    Checksum {
        message_id: u32,
        expected: u16,
        actual: u16,
        discard: usize,
    },

    /// Structurally complete frame whose message id is not registered.
    #[error("unknown message id {}", .frame.message_id)]
    UnknownMessage { frame: Box<Frame>, consumed: usize },

    #[error("unverifiable signature on message {}", .frame.message_id)]
    Signature { frame: Box<Frame>, consumed: usize },

    #[error("unsupported incompatibility flags {flags:#04x}")]
    IncompatibleFlags { flags: u8, discard: usize },

    #[error("MAVLink v{version} frame is not supported")]
    UnsupportedVersion { version: u8, discard: usize },

    #[error("payload of message {message_id} cannot be read as {expected}")]
    MessageMismatch { message_id: u32, expected: &'static str },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

impl CodecError {
    /// Number of leading buffer bytes the caller can drop after this error.
    pub fn discard(&self) -> usize {
        match self {
            CodecError::Incomplete { discard }
            | CodecError::Checksum { discard, .. }
            | CodecError::IncompatibleFlags { discard, .. }
            | CodecError::UnsupportedVersion { discard, .. } => *discard,
            CodecError::UnknownMessage { consumed, .. } | CodecError::Signature { consumed, .. } => {
                *consumed
            }
            CodecError::MessageMismatch { .. } | CodecError::PayloadTooLarge { .. } => 0,
        }
    }

    /// Check if the decoder simply needs more input.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, CodecError::Incomplete { .. })
    }
}

/// Transport layer errors.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("bind failed on {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("connect failed to {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("address resolution failed for {addr}: {reason}")]
    ResolveFailed { addr: String, reason: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("socket error: {0}")]
    SocketError(String),

    #[error("serial port error: {0}")]
    Serial(String),

    #[error("no peer to send to yet")]
    NoPeer,
}

impl Error {
    /// Check if error ends the receive loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::TransportClosed | Error::Transport(_) | Error::Io(_)
        )
    }

    /// Check if error means the stream closed normally.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::TransportClosed)
    }
}

/// Error context for debugging.
#[derive(Debug)]
pub struct ErrorContext {
    pub endpoint: Option<String>,
    pub operation: String,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation={}", self.operation)?;
        if let Some(ref endpoint) = self.endpoint {
            write!(f, ", endpoint={endpoint}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discard_counts() {
        assert_eq!(CodecError::Incomplete { discard: 3 }.discard(), 3);
        assert_eq!(
            CodecError::Checksum {
                message_id: 4,
                expected: 1,
                actual: 2,
                discard: 5
            }
            .discard(),
            5
        );
        assert_eq!(
            CodecError::MessageMismatch {
                message_id: 0,
                expected: "PING"
            }
            .discard(),
            0
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::TransportClosed.is_fatal());
        assert!(Error::TransportClosed.is_closed());
        assert!(Error::Transport(TransportError::SendFailed("x".into())).is_fatal());
        assert!(!Error::Codec(CodecError::Incomplete { discard: 0 }).is_fatal());
        assert!(!Error::Config("bad".into()).is_fatal());
    }

    #[test]
    fn test_context_display() {
        let ctx = ErrorContext {
            endpoint: Some("udp://127.0.0.1:14550".into()),
            operation: "recv".into(),
        };
        assert_eq!(ctx.to_string(), "operation=recv, endpoint=udp://127.0.0.1:14550");
    }
}
