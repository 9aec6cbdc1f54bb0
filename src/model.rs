//! Immutable data model shared by every component of the decode pipeline.
//!
//! Everything here is read from the (out-of-scope) snapshot index and never
//! mutated afterwards — the only mutable state in the whole crate is the
//! `ChunkCache` map and the filesystem side-effects `ArchiveWriter` produces.

use std::time::SystemTime;

use secrecy::SecretBox;

/// Content hash of a chunk, either pre-decode (`ShaSum`, over ciphertext) or
/// post-decode (`DecryptedShaSum`, over plaintext). Stored as the raw
/// 32-byte SHA-256 digest; hex formatting is done at the edges (error
/// messages, the S1/S2 fixtures) rather than carried as a `String`.
pub type ShaSum = [u8; crate::config::CONTENT_HASH_SIZE];

/// Whether a chunk's ciphertext needs authenticated decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encrypted {
    None,
    Aes,
}

/// Whether a chunk's post-decrypt bytes need decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressed {
    None,
    GZip,
}

/// A content-addressed unit of backup data, possibly split into Reed–Solomon
/// shards across one or more backends.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Original plaintext byte length, used to trim the erasure-decoder's
    /// join output.
    pub size: u64,
    /// Number of data shards (N). `N >= 1`.
    pub data_parts: u32,
    /// Number of parity shards (M). `M == 0` means a single opaque blob.
    pub parity_parts: u32,
    /// Content hash of the ciphertext — the cache key and dedup identity.
    pub sha_sum: ShaSum,
    /// Content hash of the plaintext — checked after decode.
    pub decrypted_sha_sum: ShaSum,
    pub encrypted: Encrypted,
    pub compressed: Compressed,
}

impl Chunk {
    /// Total shard count, `N + M`.
    #[must_use]
    pub const fn total_parts(&self) -> u32 {
        self.data_parts + self.parity_parts
    }
}

/// One entry in an `Archive`'s chunk sequence: a `Chunk` descriptor tagged
/// with its logical position in the file. The sequence itself may be stored
/// out of order; `Archive::index_of_chunk` is the indirection that resolves
/// a logical index back to a position in `chunks`.
#[derive(Debug, Clone)]
pub struct ChunkSlot {
    pub logical_index: u64,
    pub chunk: Chunk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    File,
    Directory,
    SymLink,
}

/// One filesystem entry inside a snapshot.
#[derive(Debug, Clone)]
pub struct Archive {
    pub archive_type: ArchiveType,
    /// Path relative to the snapshot root.
    pub path: std::path::PathBuf,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mod_time: SystemTime,
    /// Symlink target; only meaningful when `archive_type == SymLink`.
    pub points_to: Option<std::path::PathBuf>,
    /// Logical plaintext size in bytes; only meaningful for `File`.
    pub size: u64,
    /// On-backend byte count (post-compress, post-encrypt, post-shard);
    /// only meaningful for `File`.
    pub storage_size: u64,
    /// Ordered-by-storage, not necessarily by logical index.
    pub chunks: Vec<ChunkSlot>,
}

impl Archive {
    /// Returns the position in `self.chunks` whose logical index is `i`, or
    /// `None` if no chunk carries that index.
    #[must_use]
    pub fn index_of_chunk(&self, i: u64) -> Option<usize> {
        self.chunks.iter().position(|slot| slot.logical_index == i)
    }

    /// Returns `(logical_chunk_index, internal_offset)` such that `offset`
    /// falls inside the chunk at that logical index. `None` if `offset` is
    /// past the end of the file.
    #[must_use]
    pub fn chunk_for_offset(&self, offset: u64) -> Option<(u64, u64)> {
        if offset >= self.size {
            return None;
        }
        // Chunks are logically contiguous 0..n-1 regardless of storage
        // order, so we walk logical indices sorted by position.
        let mut sorted: Vec<&ChunkSlot> = self.chunks.iter().collect();
        sorted.sort_unstable_by_key(|slot| slot.logical_index);

        let mut base = 0u64;
        for slot in sorted {
            let end = base + slot.chunk.size;
            if offset < end {
                return Some((slot.logical_index, offset - base));
            }
            base = end;
        }
        None
    }

    /// Number of logical chunks in this archive.
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        self.chunks.len() as u64
    }
}

/// An ordered, named, immutable collection of `Archive`s.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub archives: Vec<Archive>,
}

/// The password used to derive an AES-256-GCM key for this repository's
/// chunks. Wrapped the way `secrecy` wraps any secret: `Debug` redacts it,
/// and the backing bytes are zeroized on drop.
pub type Password = SecretBox<Vec<u8>>;

/// Carries the password and backend handle shared by every decode
/// operation against one repository.
pub struct Repository<B> {
    pub password: Password,
    pub backend: B,
}

impl<B> Repository<B> {
    pub fn new(password: impl Into<Vec<u8>>, backend: B) -> Self {
        Self { password: SecretBox::new(Box::new(password.into())), backend }
    }
}

/// Running counters for a snapshot decode or a single archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub files: u64,
    pub dirs: u64,
    pub sym_links: u64,
    pub transferred: u64,
    pub total: u64,
    pub storage_size: u64,
}

/// One update emitted on the progress stream during `SnapshotDecoder::decode`.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Path of the archive currently being processed.
    pub archive_path: std::path::PathBuf,
    pub total_stats: Stats,
    pub current_item_stats: Stats,
    /// Present only on the terminal event of a failed decode.
    pub error: Option<String>,
}
