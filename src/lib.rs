//! Decode-side core of a deduplicating, erasure-coded, encrypted backup
//! engine: reassembles a chunk's Reed-Solomon shards, authenticates and
//! decompresses it, verifies its content hash, and restores archives to the
//! filesystem with their original metadata.

pub mod archive_reader;
pub mod archive_writer;
pub mod backend;
pub mod chunk_cache;
pub mod codec;
pub mod compression;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod model;
pub mod shard_loader;
pub mod snapshot_decoder;

pub use archive_reader::ArchiveReader;
pub use codec::Codec;
pub use error::{DecodeError, Result};
pub use model::{Archive, ArchiveType, Chunk, Password, Repository, Snapshot, Stats};
