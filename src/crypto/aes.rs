//! AES-256-GCM authenticated decryption.
//!
//! Ciphertext format: `nonce(12 bytes) || ciphertext || auth_tag(16 bytes)`,
//! the same layout the encode-side tooling this crate pairs with produces.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

use crate::config::{AES_NONCE_SIZE, KEY_SIZE};
use crate::error::{DecodeError, Result};

/// Wraps an `Aes256Gcm` instance keyed for one repository.
pub struct AesGcm {
    inner: Aes256Gcm,
}

impl AesGcm {
    /// # Errors
    /// Returns an error if `key` isn't a valid AES-256 key (it always is,
    /// since the type is `[u8; KEY_SIZE]`, but the underlying crate's API
    /// is itself fallible).
    pub fn new(key: &[u8; KEY_SIZE]) -> Result<Self> {
        let inner = Aes256Gcm::new_from_slice(key).map_err(|e| anyhow::anyhow!("invalid AES key: {e}"))?;
        Ok(Self { inner })
    }

    /// Authenticated decryption of a chunk's ciphertext.
    ///
    /// # Errors
    /// Returns `DecodeError::CipherAuth` if the ciphertext is too short to
    /// contain a nonce, or if AEAD authentication fails — both cases must
    /// surface the exact, publicly-contracted error string rather than any
    /// detail about why (a short ciphertext is itself evidence of
    /// tampering/corruption, not a distinct failure mode worth its own
    /// message).
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < AES_NONCE_SIZE {
            return Err(DecodeError::CipherAuth);
        }
        let (nonce, data) = ciphertext.split_at(AES_NONCE_SIZE);
        self.inner.decrypt(Nonce::from_slice(nonce), data).map_err(|_| DecodeError::CipherAuth)
    }
}
