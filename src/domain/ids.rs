use crate::error::{AppError, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Number of digest bytes kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 16;

/// Generates a new local message identifier.
///
/// Identifiers are UUIDv7 so they sort by creation time.
#[must_use]
pub fn new_message_id() -> Uuid {
    Uuid::now_v7()
}

/// Derives a stable conversation identifier for an account talking to a peer address.
///
/// The same `(account, peer)` pair always yields the same identifier.
#[must_use]
pub fn conversation_id_for(account: &str, peer_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account.as_bytes());
    hasher.update([0u8]);
    hasher.update(peer_address.as_bytes());
    let digest = hasher.finalize();
    format!("conv_{}", hex::encode(&digest[..12]))
}

/// Strong type for key fingerprints: the first 16 bytes of a SHA-256 digest, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyFingerprint(String);

impl KeyFingerprint {
    /// Computes the fingerprint of a public key.
    #[must_use]
    pub fn of(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    /// Parses a fingerprint reference supplied by a client.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the value is not exactly 32 hex characters.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.len() != FINGERPRINT_BYTES * 2 {
            return Err(AppError::BadRequest(format!(
                "Invalid key fingerprint length: {} (expected {})",
                trimmed.len(),
                FINGERPRINT_BYTES * 2
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AppError::BadRequest("Key fingerprint must be hexadecimal".into()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders the fingerprint in groups of four characters for display.
    #[must_use]
    pub fn display_grouped(&self) -> String {
        self.0
            .as_bytes()
            .chunks(4)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<KeyFingerprint> for String {
    fn from(fingerprint: KeyFingerprint) -> Self {
        fingerprint.0
    }
}
