//! MAVLink v2 message signing.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

use super::Signature;

/// Signing key length in bytes.
pub const SIGNING_KEY_LEN: usize = 32;

/// 2015-01-01T00:00:00Z as seconds since the UNIX epoch.
const SIGNING_EPOCH_SECS: u64 = 1_420_070_400;

/// Current signing timestamp: 10 µs ticks since 2015-01-01.
pub fn signing_timestamp_now() -> u64 {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    let since_epoch = since_unix.saturating_sub(Duration::from_secs(SIGNING_EPOCH_SECS));
    (since_epoch.as_micros() / 10) as u64
}

/// Shared secret and link parameters for signing.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningConfig {
    secret_key: [u8; SIGNING_KEY_LEN],
    /// Link id stamped into outgoing signatures.
    pub link_id: u8,
    /// Sign frames this node sends.
    pub sign_outgoing: bool,
}

impl SigningConfig {
    pub fn new(secret_key: [u8; SIGNING_KEY_LEN], link_id: u8, sign_outgoing: bool) -> Self {
        Self {
            secret_key,
            link_id,
            sign_outgoing,
        }
    }

    /// Parse a key given as 64 hex characters.
    pub fn from_hex(key: &str, link_id: u8, sign_outgoing: bool) -> Result<Self> {
        let bytes = hex::decode(key.trim())
            .map_err(|e| Error::InvalidConfig(format!("signing key is not valid hex: {e}")))?;
        let secret_key: [u8; SIGNING_KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::InvalidConfig(format!(
                "signing key must be {SIGNING_KEY_LEN} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self::new(secret_key, link_id, sign_outgoing))
    }

    /// Compute the 6-byte signature value.
    ///
    /// `frame` runs from the start marker through the checksum.
    pub fn compute(&self, frame: &[u8], link_id: u8, timestamp: u64) -> [u8; 6] {
        let ts = timestamp.to_le_bytes();
        let mut hasher = Sha256::new();
        hasher.update(self.secret_key);
        hasher.update(frame);
        hasher.update([link_id]);
        hasher.update(&ts[..6]);
        let digest = hasher.finalize();

        let mut value = [0u8; 6];
        value.copy_from_slice(&digest[..6]);
        value
    }

    /// Check a received signature against this key.
    pub fn verify(&self, frame: &[u8], signature: &Signature) -> bool {
        self.compute(frame, signature.link_id, signature.timestamp) == signature.value
    }

    /// Produce a trailer for an outgoing frame.
    pub fn sign(&self, frame: &[u8], timestamp: u64) -> Signature {
        Signature {
            link_id: self.link_id,
            timestamp,
            value: self.compute(frame, self.link_id, timestamp),
        }
    }
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret_key", &"<redacted>")
            .field("link_id", &self.link_id)
            .field("sign_outgoing", &self.sign_outgoing)
            .finish()
    }
}
