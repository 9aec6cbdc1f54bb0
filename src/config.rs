//! Constants shared across the decode pipeline.
//!
//! Mirrors the "single source of truth" role `config.rs` plays in the
//! encode-side tooling this crate's decode core is paired with: shard
//! counts and cryptographic sizes all live here so the codec and the shard
//! loader agree on them.

/// Size of the AES-GCM nonce in bytes (96 bits, NIST SP 800-38D).
pub const AES_NONCE_SIZE: usize = 12;

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of a SHA-256 content digest in bytes.
pub const CONTENT_HASH_SIZE: usize = 32;

/// Default number of data shards (k) for a freshly-created `Repository`.
pub const DEFAULT_DATA_SHARDS: u32 = 4;

/// Default number of parity shards (m) for a freshly-created `Repository`.
pub const DEFAULT_PARITY_SHARDS: u32 = 2;

/// Exact error string the cipher must surface on AEAD authentication
/// failure. A separate, out-of-scope encrypted config-file store matches on
/// this string verbatim, so it cannot drift from whatever text the
/// underlying `aes-gcm` crate happens to produce.
pub const CIPHER_AUTH_FAILURE_MESSAGE: &str = "cipher: message authentication failed";

/// Default permission bits applied to directories the archive writer
/// creates when an entry's own `Mode` can't be honoured ahead of its
/// children (parent directories are created with this mode, then
/// `chmod`'d to their recorded mode once the entry itself is restored).
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Capacity of the bounded prefetch task pool used by `ArchiveReader`.
pub const PREFETCH_POOL_SIZE: usize = 4;
