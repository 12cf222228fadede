//! # Stream Encryption
//!
//! Optional AES-256-CBC encryption of dump streams. A backup is encrypted when
//! an `ENCRYPT_KEY` is configured: 64 hex characters decoding to a 32-byte key.
//! Each backup gets a fresh random IV which is stored hex-encoded next to the
//! backup at `<key>.iv`; the ciphertext uses PKCS#7 padding.
//!
//! Decrypting a backup by hand:
//!
//! ```text
//! openssl enc -d -aes-256-cbc -K "$ENCRYPT_KEY" -iv "$(cat backup.iv)" \
//!     -in backup.backup -out backup.dump
//! ```

mod reader;

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use tokio::io::AsyncRead;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub use reader::EncryptingReader;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// CBC initialization vector length in bytes.
pub const IV_LEN: usize = 16;

/// Initialization vector for one encrypted backup.
pub type Iv = [u8; IV_LEN];

/// A configured encryption key failed validation.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct InvalidKeyError {
    reason: String,
}

impl InvalidKeyError {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// A validated AES-256 key, zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Parse a hex-encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidKeyError`] if the value is not hex or does not decode
    /// to exactly [`KEY_LEN`] bytes.
    pub fn from_hex(value: &str) -> Result<Self, InvalidKeyError> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| InvalidKeyError::new(format!("key is not valid hex: {}", e)))?;

        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            InvalidKeyError::new(format!(
                "key must be {} bytes ({} hex characters), got {} bytes",
                KEY_LEN,
                KEY_LEN * 2,
                bytes.len()
            ))
        })?;

        Ok(Self(bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Generate a random IV from the operating system RNG.
pub fn generate_iv() -> Iv {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Storage key of the IV companion object for a backup key.
pub fn iv_object_key(backup_key: &str) -> String {
    format!("{}.iv", backup_key)
}

/// Wrap a byte stream so it is encrypted as it is read.
pub fn encrypt_stream<R>(source: R, key: &EncryptionKey, iv: &Iv) -> EncryptingReader<R>
where
    R: AsyncRead + Unpin,
{
    EncryptingReader::new(source, key, iv)
}
