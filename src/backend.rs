//! The abstract backend contract the decode core is written against.
//!
//! Concrete backends (local filesystem, S3, SFTP, …) are out of scope; this
//! module specifies only the trait, grounded the same way `tvix`'s
//! `DirectoryService` is specified as an `async_trait` over a content-store
//! abstraction it doesn't itself implement.

use async_trait::async_trait;
use bytes::Bytes;

use crate::model::Chunk;

/// Opaque failure from a backend. The core never inspects the cause beyond
/// "this shard is unavailable right now" — see `ShardLoader`.
#[derive(Debug, thiserror::Error)]
#[error("backend failed to load shard {shard_index} of chunk: {source}")]
pub struct BackendError {
    pub shard_index: u32,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl BackendError {
    pub fn new(shard_index: u32, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self { shard_index, source: Box::new(source) }
    }
}

/// Fetches raw shard bytes for a chunk. `shard_index` runs
/// `0 .. chunk.total_parts()`; indices below `chunk.data_parts` are data
/// shards, the rest parity.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn load_chunk(&self, chunk: &Chunk, shard_index: u32) -> Result<Bytes, BackendError>;
}
