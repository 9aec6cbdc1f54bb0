//! C5 — iterates a snapshot's archives in stored order, drives
//! `ArchiveWriter` for each, and publishes progress over a channel the
//! caller drains.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{error, info, instrument};

use crate::archive_writer::{self, WriteContext};
use crate::backend::Backend;
use crate::chunk_cache::ChunkCache;
use crate::codec::Codec;
use crate::model::{ProgressEvent, Snapshot, Stats};

/// Decodes every archive in `snapshot` into `dest_root`, returning the
/// receiving half of a rendezvous progress channel.
///
/// The producer task halts after the first archive-level error, emitting a
/// final event with `error` set before the channel closes. On success the
/// channel simply closes after the last archive. Archives are assumed
/// stored parents-first; callers backed by a snapshot format that can't
/// guarantee that should stable-sort by path depth before calling this.
#[instrument(skip(snapshot, codec, cache), fields(snapshot_id = %snapshot.id))]
pub fn decode<B>(snapshot: Snapshot, dest_root: PathBuf, codec: std::sync::Arc<Codec>, repo: std::sync::Arc<crate::model::Repository<B>>, cache: std::sync::Arc<ChunkCache>) -> mpsc::Receiver<ProgressEvent>
where
    B: Backend + 'static,
{
    // Capacity 1 approximates the design's unbuffered channel: the
    // producer's next send blocks until this one is drained.
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut total_stats = Stats::default();
        let ctx = WriteContext { repo: &repo, codec: &codec, cache: &cache };

        for archive in &snapshot.archives {
            let target_path: PathBuf = join_under_root(&dest_root, &archive.path);

            if let Err(e) = archive_writer::write(archive, &target_path, &ctx, &mut total_stats, &tx).await {
                error!(path = %archive.path.display(), error = %e, "archive decode failed, halting snapshot decode");
                let _ = tx
                    .send(ProgressEvent {
                        archive_path: archive.path.clone(),
                        total_stats,
                        current_item_stats: Stats::default(),
                        error: Some(e.to_string()),
                    })
                    .await;
                return;
            }
        }

        info!(files = total_stats.files, dirs = total_stats.dirs, sym_links = total_stats.sym_links, "snapshot decode complete");
    });

    rx
}

/// Joins `path` under `root`, rejecting absolute/parent-escaping paths so a
/// malicious or malformed snapshot index can't write outside the
/// destination tree.
fn join_under_root(root: &Path, path: &Path) -> PathBuf {
    let mut target = root.to_path_buf();
    for component in path.components() {
        match component {
            std::path::Component::Normal(part) => target.push(part),
            std::path::Component::CurDir => {}
            _ => continue,
        }
    }
    target
}
