//! SHA-256 content hashing, used both as the `ShaSum` dedup key (over
//! ciphertext, computed by the out-of-scope encoder) and as the
//! `DecryptedShaSum` integrity check the Codec applies after decode.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::CONTENT_HASH_SIZE;
use crate::error::{DecodeError, Result};

pub struct ContentHash {
    hash: [u8; CONTENT_HASH_SIZE],
}

impl ContentHash {
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        let hash = Sha256::digest(data).into();
        Self { hash }
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CONTENT_HASH_SIZE] {
        &self.hash
    }

    /// Verifies this hash against an expected digest in constant time.
    ///
    /// # Errors
    /// Returns `DecodeError::ChecksumError` with both digests hex-encoded
    /// if they don't match.
    pub fn verify(&self, expected: &[u8; CONTENT_HASH_SIZE]) -> Result<()> {
        if bool::from(self.hash.ct_eq(expected)) {
            Ok(())
        } else {
            Err(DecodeError::ChecksumError {
                method: "sha256",
                expected: hex::encode(expected),
                got: hex::encode(self.hash),
            })
        }
    }
}
