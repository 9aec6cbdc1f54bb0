//! C4 — materializes a single archive entry (file, directory, or symlink)
//! to the filesystem, streaming a file's chunks through the cache, shard
//! loader and codec in strict logical order.

use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use filetime::FileTime;
use nix::sys::stat::{Mode, fchmodat, FchmodatFlags};
use nix::unistd::{Gid, Uid, fchownat, FchownatFlags};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::backend::Backend;
use crate::chunk_cache::ChunkCache;
use crate::codec::Codec;
use crate::config::DEFAULT_DIR_MODE;
use crate::error::{DecodeError, Result};
use crate::model::{Archive, ArchiveType, Chunk, ProgressEvent, Repository, Stats};
use crate::shard_loader;

/// Everything `write` needs that's shared across an entire decode run.
pub struct WriteContext<'a, B: Backend> {
    pub repo: &'a Repository<B>,
    pub codec: &'a Codec,
    pub cache: &'a ChunkCache,
}

/// Materializes `archive` at `target_path`, streaming progress onto
/// `progress` and folding byte counts into `total_stats`.
///
/// # Errors
/// Propagates filesystem errors, chunk decode failures, and reconstruction
/// failures as-is; none of them are swallowed (a deliberate divergence
/// from the reference's silent directory/symlink-error handling).
#[instrument(skip(ctx, total_stats, progress), fields(path = %archive.path.display()))]
pub async fn write<B: Backend>(
    archive: &Archive,
    target_path: &Path,
    ctx: &WriteContext<'_, B>,
    total_stats: &mut Stats,
    progress: &mpsc::Sender<ProgressEvent>,
) -> Result<()> {
    match archive.archive_type {
        ArchiveType::Directory => {
            tokio::fs::create_dir_all(target_path).await?;
            set_mode(target_path, archive.mode)?;
            total_stats.dirs += 1;
            emit(progress, archive, *total_stats, Stats::default(), None).await;
        }
        ArchiveType::SymLink => {
            let target = archive.points_to.as_ref().ok_or_else(|| anyhow::anyhow!("symlink archive missing points_to"))?;
            tokio::fs::symlink(target, target_path).await?;
            total_stats.sym_links += 1;
            emit(progress, archive, *total_stats, Stats::default(), None).await;
        }
        ArchiveType::File => {
            write_file(archive, target_path, ctx, total_stats, progress).await?;
        }
    }

    lchown(target_path, archive.uid, archive.gid)?;
    set_mtime(target_path, archive.archive_type, archive.mod_time)?;
    Ok(())
}

async fn write_file<B: Backend>(
    archive: &Archive,
    target_path: &Path,
    ctx: &WriteContext<'_, B>,
    total_stats: &mut Stats,
    progress: &mpsc::Sender<ProgressEvent>,
) -> Result<()> {
    total_stats.files += 1;
    total_stats.total = archive.size;
    total_stats.storage_size = archive.storage_size;
    let mut current_item_stats = Stats { total: archive.size, storage_size: archive.storage_size, ..Stats::default() };
    emit(progress, archive, *total_stats, current_item_stats, None).await;

    // Only fall back to an implicit, default-mode parent directory when
    // nothing has created one yet. A directory with its own `Archive` entry
    // owns its mode/ownership/mtime; re-chmodding it here would clobber
    // whatever that entry already restored.
    if let Some(parent) = target_path.parent()
        && !parent.as_os_str().is_empty()
        && tokio::fs::metadata(parent).await.is_err()
    {
        tokio::fs::create_dir_all(parent).await?;
        set_mode(parent, DEFAULT_DIR_MODE)?;
    }

    let mut file = tokio::fs::OpenOptions::new().write(true).create(true).truncate(true).mode(archive.mode).open(target_path).await?;

    let result = stream_chunks(archive, &mut file, ctx, total_stats, &mut current_item_stats, progress).await;

    if let Err(e) = result {
        // Don't leave a truncated, half-decoded file behind for a caller to
        // mistake for a complete one.
        drop(file);
        let _ = tokio::fs::remove_file(target_path).await;
        return Err(e);
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

async fn stream_chunks<B: Backend>(
    archive: &Archive,
    file: &mut tokio::fs::File,
    ctx: &WriteContext<'_, B>,
    total_stats: &mut Stats,
    current_item_stats: &mut Stats,
    progress: &mpsc::Sender<ProgressEvent>,
) -> Result<()> {
    for logical_index in 0..archive.chunk_count() {
        let position = archive.index_of_chunk(logical_index).ok_or(DecodeError::ChunkError { index: logical_index })?;
        let chunk = &archive.chunks[position].chunk;

        let plaintext = load_chunk(chunk, ctx).await?;
        file.write_all(&plaintext).await?;

        let written = plaintext.len() as u64;
        total_stats.transferred += written;
        current_item_stats.transferred += written;
        emit(progress, archive, *total_stats, *current_item_stats, None).await;
    }
    Ok(())
}

/// Loads one chunk's plaintext through the cache, shard loader and codec.
async fn load_chunk<B: Backend>(chunk: &Chunk, ctx: &WriteContext<'_, B>) -> Result<bytes::Bytes> {
    let backend = &ctx.repo.backend;
    let codec = ctx.codec;
    ctx.cache
        .get_or_load(chunk.sha_sum, || async move {
            let raw = shard_loader::load_raw(chunk, backend).await?;
            codec.decode(chunk, &raw)
        })
        .await
}

async fn emit(progress: &mpsc::Sender<ProgressEvent>, archive: &Archive, total_stats: Stats, current_item_stats: Stats, error: Option<String>) {
    // The channel capacity is 1, so this send blocks until the consumer
    // drains the previous event -- the unbuffered back-pressure the design
    // calls for. A closed receiver just means the caller stopped
    // listening; that's not a decode failure.
    let _ = progress.send(ProgressEvent { archive_path: archive.path.clone(), total_stats, current_item_stats, error }).await;
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fchmodat(None, path, Mode::from_bits_truncate(mode), FchmodatFlags::FollowSymlink).map_err(|e| anyhow::anyhow!("chmod {}: {e}", path.display()))?;
    Ok(())
}

fn set_mtime(path: &Path, archive_type: ArchiveType, mod_time: std::time::SystemTime) -> Result<()> {
    let ft = FileTime::from_system_time(mod_time);
    match archive_type {
        ArchiveType::SymLink => filetime::set_symlink_file_times(path, ft, ft).map_err(|e| anyhow::anyhow!("set mtime on symlink {}: {e}", path.display()))?,
        _ => filetime::set_file_mtime(path, ft).map_err(|e| anyhow::anyhow!("set mtime on {}: {e}", path.display()))?,
    }
    Ok(())
}

/// Applies `Lchown(uid, gid)`, available once the caller knows the archive.
pub fn lchown(path: &Path, uid: u32, gid: u32) -> Result<()> {
    fchownat(None, path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)), FchownatFlags::NoFollowSymlink)
        .map_err(|e| anyhow::anyhow!("lchown {}: {e}", path.display()))?;
    Ok(())
}
