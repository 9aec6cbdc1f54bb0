//! C1 — the per-chunk decode pipeline: authenticated decrypt, decompress,
//! content-hash verify, in that fixed order.
//!
//! The order is load-bearing, not stylistic: ciphertext authentication must
//! gate decompression, or an attacker who can inject unauthenticated
//! ciphertext could trigger a decompression bomb before any integrity check
//! runs. The content hash is computed over the final plaintext so it stays
//! meaningful across codec changes (it doesn't care whether a chunk was
//! ever encrypted or compressed).

use tracing::instrument;

use crate::compression;
use crate::config::KEY_SIZE;
use crate::crypto::AesGcm;
use crate::error::Result;
use crate::hash::ContentHash;
use crate::model::{Chunk, Compressed, Encrypted};

/// Decodes chunk bytes using a single repository-wide AES key.
///
/// Construction is cheap to share: one `Codec` serves every chunk in a
/// repository, since all chunks are decrypted under the same derived key.
pub struct Codec {
    aes: AesGcm,
}

impl Codec {
    /// # Errors
    /// Returns an error if `key` can't initialize the underlying AEAD.
    pub fn new(key: &[u8; KEY_SIZE]) -> Result<Self> {
        Ok(Self { aes: AesGcm::new(key)? })
    }

    /// Decodes `bytes` (the reassembled ciphertext for `chunk`) into
    /// plaintext, applying decrypt/decompress/verify per `chunk`'s flags.
    ///
    /// # Errors
    /// - `DecodeError::CipherAuth` if `chunk.encrypted == Aes` and AEAD
    ///   authentication fails.
    /// - An `Other` error if `chunk.compressed == GZip` and the bytes
    ///   aren't valid Gzip.
    /// - `DecodeError::ChecksumError` if the final plaintext's SHA-256
    ///   doesn't match `chunk.decrypted_sha_sum`.
    #[instrument(skip(self, bytes), fields(size = chunk.size))]
    pub fn decode(&self, chunk: &Chunk, bytes: &[u8]) -> Result<Vec<u8>> {
        let bytes = match chunk.encrypted {
            Encrypted::None => bytes.to_vec(),
            Encrypted::Aes => self.aes.decrypt(bytes)?,
        };

        let bytes = match chunk.compressed {
            Compressed::None => bytes,
            Compressed::GZip => compression::decompress(&bytes)?,
        };

        ContentHash::new(&bytes).verify(&chunk.decrypted_sha_sum)?;
        Ok(bytes)
    }
}
