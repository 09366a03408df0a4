//! Chunk planning for transfers.
//!
//! A file of `filesize` bytes is split into chunks of `chunk_size` bytes;
//! the chunk with identity `i` covers bytes `[i * chunk_size,
//! min((i + 1) * chunk_size, filesize))`. Identities are dense and 0-based,
//! and only the last chunk may be short.
//!
//! Resume works at whole-chunk granularity: a partially written tail cannot
//! be verified in isolation, so only complete chunks already on disk count
//! as present.

use std::ops::Range;
use std::path::Path;

use crate::error::{Error, Result};

/// Number of chunks needed to cover `filesize` bytes.
///
/// An empty file needs zero chunks.
///
/// # Errors
///
/// Returns [`Error::ZeroChunkSize`] if `chunk_size` is zero.
pub fn total_chunks(filesize: u64, chunk_size: u64) -> Result<u64> {
    if chunk_size == 0 {
        return Err(Error::ZeroChunkSize);
    }
    Ok(filesize.div_ceil(chunk_size))
}

/// Byte range covered by the chunk with the given identity.
///
/// The range is clamped to `filesize`, so the last chunk may be short and
/// an identity past the end yields an empty range.
#[must_use]
pub fn chunk_range(identity: u64, filesize: u64, chunk_size: u64) -> Range<u64> {
    let start = (identity.saturating_mul(chunk_size)).min(filesize);
    let end = start.saturating_add(chunk_size).min(filesize);
    start..end
}

/// Chunk identities the receiver still needs, given the local partial file.
///
/// Looks up `output_path` on disk; a missing file means nothing is present.
/// Only whole chunks count, so a tail shorter than `chunk_size` is treated
/// as absent and will be retransmitted. The returned list is ascending and
/// duplicate-free.
///
/// # Errors
///
/// Returns [`Error::ZeroChunkSize`] if `chunk_size` is zero.
pub fn required_chunks(output_path: &Path, filesize: u64, chunk_size: u64) -> Result<Vec<u64>> {
    let total = total_chunks(filesize, chunk_size)?;

    let present = match std::fs::metadata(output_path) {
        Ok(meta) => meta.len() / chunk_size,
        Err(_) => 0,
    };

    Ok((present.min(total)..total).collect())
}
