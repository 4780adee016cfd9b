//! Content fingerprints used to tell an append from a rewrite.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::ingest::IngestError;

/// SHA-256 of `content`, hex encoded.
#[must_use]
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Fingerprint of the `window` bytes that end at `offset`.
///
/// If the file is now shorter than `offset` the hash covers whatever is left,
/// which will not match a fingerprint taken before the truncation.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub async fn tail_fingerprint(
    path: &Path,
    offset: u64,
    window: u64,
) -> Result<String, IngestError> {
    let io_err = |e| IngestError::from_io(path.to_path_buf(), e);

    let start = offset.saturating_sub(window);
    let mut file = File::open(path).await.map_err(io_err)?;
    file.seek(std::io::SeekFrom::Start(start))
        .await
        .map_err(io_err)?;

    let mut buf = Vec::with_capacity(usize::try_from(offset - start).unwrap_or(0));
    file.take(offset - start)
        .read_to_end(&mut buf)
        .await
        .map_err(io_err)?;
    Ok(fingerprint(&buf))
}
