//! C2 — fetches a chunk's shards from a `Backend` and reassembles the
//! ciphertext, reconstructing via Reed–Solomon if some shards are missing.

use bytes::Bytes;
use reed_solomon_simd::ReedSolomonDecoder;
use tracing::{debug, instrument, warn};

use crate::backend::Backend;
use crate::error::{DecodeError, Result};
use crate::model::Chunk;

/// Fetches and reassembles a chunk's ciphertext.
///
/// # Errors
/// Returns `DecodeError::DataReconstructionError` if every shard position
/// `0..chunk.total_parts()` has been tried and no valid reconstruction was
/// found. A backend error on an individual shard is not fatal — it's
/// logged and the loop moves to the next shard index.
#[instrument(skip(backend), fields(data_parts = chunk.data_parts, parity_parts = chunk.parity_parts))]
pub async fn load_raw(chunk: &Chunk, backend: &dyn Backend) -> Result<Vec<u8>> {
    if chunk.parity_parts == 0 {
        // Single-shard fast path: the chunk is stored as one opaque blob.
        let bytes = backend.load_chunk(chunk, 0).await?;
        return Ok(bytes.to_vec());
    }

    let data_parts = chunk.data_parts as usize;
    let total = chunk.total_parts() as usize;
    let mut shards: Vec<Option<Bytes>> = vec![None; total];
    let mut found = 0u32;

    for shard_index in 0..total {
        match backend.load_chunk(chunk, shard_index as u32).await {
            Ok(bytes) => {
                shards[shard_index] = Some(bytes);
                found += 1;
            }
            Err(e) => {
                warn!(shard_index, error = %e, "shard unavailable, continuing");
                continue;
            }
        }

        if found < chunk.data_parts {
            continue;
        }

        match try_join(chunk, &shards, data_parts, total) {
            Ok(joined) => return Ok(joined),
            Err(e) => {
                debug!(error = %e, "reconstruct/join failed, trying another shard");
            }
        }
    }

    // `found` can exceed `chunk.data_parts` (every shard fetched fine but
    // `try_join` kept failing, e.g. a backend returning bit-rotted shard
    // bytes): saturate rather than underflow `missing`.
    Err(DecodeError::DataReconstructionError { found, missing: chunk.data_parts.saturating_sub(found) })
}

/// Attempts to produce `chunk.size` bytes of ciphertext from whatever
/// shards are currently present. Returns an error (not fatal to the outer
/// loop) if there still aren't enough usable shards to reconstruct.
fn try_join(chunk: &Chunk, shards: &[Option<Bytes>], data_parts: usize, total: usize) -> anyhow::Result<Vec<u8>> {
    let all_data_present = shards[..data_parts].iter().all(Option::is_some);

    let originals: Vec<Bytes> = if all_data_present {
        // Optimization from the design: skip the Reed–Solomon reconstruct
        // step entirely when every data shard survived the fetch.
        shards[..data_parts].iter().map(|s| s.clone().unwrap()).collect()
    } else {
        reconstruct(shards, data_parts, total)?
    };

    let mut joined = Vec::with_capacity(originals.iter().map(Bytes::len).sum());
    for shard in &originals {
        joined.extend_from_slice(shard);
    }
    joined.truncate(chunk.size as usize);
    anyhow::ensure!(joined.len() == chunk.size as usize, "joined output shorter than chunk.size");
    Ok(joined)
}

fn reconstruct(shards: &[Option<Bytes>], data_parts: usize, total: usize) -> anyhow::Result<Vec<Bytes>> {
    let parity_parts = total - data_parts;
    let shard_bytes = shards
        .iter()
        .flatten()
        .map(Bytes::len)
        .next()
        .ok_or_else(|| anyhow::anyhow!("no shards available to determine shard size"))?;

    let mut decoder = ReedSolomonDecoder::new(data_parts, parity_parts, shard_bytes)?;
    for (index, shard) in shards.iter().enumerate().take(data_parts) {
        if let Some(bytes) = shard {
            decoder.add_original_shard(index, bytes.as_ref())?;
        }
    }
    for (index, shard) in shards.iter().enumerate().skip(data_parts) {
        if let Some(bytes) = shard {
            decoder.add_recovery_shard(index - data_parts, bytes.as_ref())?;
        }
    }

    let result = decoder.decode()?;

    let mut originals: Vec<Option<Bytes>> = shards[..data_parts].to_vec();
    for (index, restored) in result.restored_original_iter() {
        originals[index] = Some(Bytes::copy_from_slice(restored));
    }

    originals.into_iter().enumerate().map(|(i, s)| s.ok_or_else(|| anyhow::anyhow!("data shard {i} missing after reconstruct"))).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::backend::BackendError;
    use crate::model::{Compressed, Encrypted};

    struct FixedShardBackend {
        shards: Vec<Option<Bytes>>,
        calls: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl Backend for FixedShardBackend {
        async fn load_chunk(&self, _chunk: &Chunk, shard_index: u32) -> std::result::Result<Bytes, BackendError> {
            self.calls.lock().unwrap().push(shard_index);
            self.shards[shard_index as usize].clone().ok_or_else(|| BackendError::new(shard_index, std::io::Error::other("shard missing")))
        }
    }

    fn rs_chunk(data_parts: u32, parity_parts: u32, size: u64) -> Chunk {
        Chunk {
            size,
            data_parts,
            parity_parts,
            sha_sum: [0u8; 32],
            decrypted_sha_sum: [0u8; 32],
            encrypted: Encrypted::None,
            compressed: Compressed::None,
        }
    }

    fn encode_shards(data: &[u8], data_parts: usize, parity_parts: usize) -> Vec<Bytes> {
        let shard_bytes = data.len().div_ceil(data_parts);
        let mut originals = Vec::with_capacity(data_parts);
        for i in 0..data_parts {
            let start = i * shard_bytes;
            let end = (start + shard_bytes).min(data.len());
            let mut shard = vec![0u8; shard_bytes];
            if start < data.len() {
                shard[..end - start].copy_from_slice(&data[start..end]);
            }
            originals.push(shard);
        }

        let mut encoder = reed_solomon_simd::ReedSolomonEncoder::new(data_parts, parity_parts, shard_bytes).unwrap();
        for shard in &originals {
            encoder.add_original_shard(shard).unwrap();
        }
        let result = encoder.encode().unwrap();
        let recovery: Vec<Vec<u8>> = result.recovery_iter().map(<[u8]>::to_vec).collect();

        originals.into_iter().chain(recovery).map(Bytes::from).collect()
    }

    #[tokio::test]
    async fn s3_reconstructs_with_one_shard_missing() {
        let data = b"erasure coded payload spanning multiple shards for testing";
        let all_shards = encode_shards(data, 3, 2);
        let chunk = rs_chunk(3, 2, data.len() as u64);

        let shards: Vec<Option<Bytes>> =
            all_shards.iter().enumerate().map(|(i, s)| if i == 1 { None } else { Some(s.clone()) }).collect();
        let backend = FixedShardBackend { shards, calls: Mutex::new(Vec::new()) };

        let joined = load_raw(&chunk, &backend).await.unwrap();
        assert_eq!(joined.len(), chunk.size as usize);
        assert_eq!(&joined[..], &data[..]);
    }

    #[tokio::test]
    async fn s4_fails_when_too_few_shards_survive() {
        let data = b"erasure coded payload spanning multiple shards for testing";
        let all_shards = encode_shards(data, 3, 2);
        let chunk = rs_chunk(3, 2, data.len() as u64);

        // Only shards 0 and 1 are fetchable; need 3.
        let shards: Vec<Option<Bytes>> =
            all_shards.iter().enumerate().map(|(i, s)| if i < 2 { Some(s.clone()) } else { None }).collect();
        let backend = FixedShardBackend { shards, calls: Mutex::new(Vec::new()) };

        let err = load_raw(&chunk, &backend).await.unwrap_err();
        match err {
            DecodeError::DataReconstructionError { found, missing } => {
                assert_eq!(found, 2);
                assert_eq!(missing, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_count_saturates_instead_of_underflowing() {
        let data = b"erasure coded payload spanning multiple shards for testing";
        let all_shards = encode_shards(data, 2, 1);
        // A `size` larger than any shard combination can produce makes every
        // reconstruction attempt fail `try_join`'s length check, even once
        // all 3 shards are fetched — `found` (3) ends up greater than
        // `data_parts` (2).
        let chunk = rs_chunk(2, 1, data.len() as u64 + 1000);
        let shards: Vec<Option<Bytes>> = all_shards.into_iter().map(Some).collect();
        let backend = FixedShardBackend { shards, calls: Mutex::new(Vec::new()) };

        let err = load_raw(&chunk, &backend).await.unwrap_err();
        match err {
            DecodeError::DataReconstructionError { found, missing } => {
                assert_eq!(found, 3);
                assert_eq!(missing, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_shard_fast_path_skips_reed_solomon() {
        let chunk = rs_chunk(1, 0, 5);
        let shards = vec![Some(Bytes::from_static(b"hello"))];
        let backend = FixedShardBackend { shards, calls: Mutex::new(Vec::new()) };

        let joined = load_raw(&chunk, &backend).await.unwrap();
        assert_eq!(joined, b"hello");
        assert_eq!(*backend.calls.lock().unwrap(), vec![0]);
    }
}
