//! The typed error taxonomy for the decode pipeline.
//!
//! Most of the crate propagates `DecodeError` so callers (and tests) can
//! match on the structured variants from the error table; a handful of
//! setup-time helpers (key derivation, backend wiring) use `anyhow::Result`
//! for plain "this should just work or bubble up with context" failures.

use thiserror::Error;

/// Every error the decode core can surface to a caller.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A logical chunk index was requested that the archive doesn't have.
    #[error("chunk {index} not present in archive")]
    ChunkError { index: u64 },

    /// `ArchiveReader` was asked to read from an offset past end-of-file.
    #[error("seek offset {offset} outside file")]
    SeekError { offset: u64 },

    /// The decoded plaintext's content hash didn't match `DecryptedShaSum`.
    #[error("{method} checksum mismatch: expected {expected}, got {got}")]
    ChecksumError { method: &'static str, expected: String, got: String },

    /// Fewer than `DataParts` shards could be fetched and reconstructed.
    #[error("data reconstruction failed: found {found} shards, missing {missing}")]
    DataReconstructionError { found: u32, missing: u32 },

    /// AEAD authentication failed. The message is a public contract shared
    /// with the (out-of-scope) encrypted configuration store; it must never
    /// be reworded.
    #[error("{}", crate::config::CIPHER_AUTH_FAILURE_MESSAGE)]
    CipherAuth,

    /// A backend returned an opaque failure while fetching a shard.
    #[error("backend error: {0}")]
    Backend(#[from] crate::backend::BackendError),

    /// A filesystem operation failed while materializing an archive entry.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure from the decode pipeline (compression, encoding
    /// parameter validation, …) not worth its own variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
