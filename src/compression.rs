//! Gzip decompression, applied to a chunk's bytes after AEAD authentication
//! succeeds and before the content-hash check — authentication gates
//! decompression so attacker-controlled ciphertext can never reach the
//! decompressor unauthenticated (a decompression-bomb guard, not just a
//! layering convenience).

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::Result;

/// Decompresses a Gzip-compressed byte slice.
///
/// # Errors
/// Returns an error if `data` isn't valid Gzip, or is truncated/corrupted.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).map_err(|e| anyhow::anyhow!("gunzip failed: {e}"))?;
    Ok(decompressed)
}
