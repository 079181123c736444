//! Content fingerprints for change detection.
//!
//! Files are hashed with MD5 over 4096-byte chunks, each chunk trimmed of
//! leading and trailing ASCII whitespace before entering the digest. Chunk
//! boundaries therefore matter: readers must deliver full chunks, so short
//! reads are refilled before hashing.

use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::HASH_CHUNK_SIZE;

/// Hashes a stream chunk-wise and returns the lowercase hex digest.
pub async fn digest_reader<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<String> {
    let mut hasher = Md5::new();
    let mut chunk = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let filled = fill_chunk(reader, &mut chunk).await?;
        if filled == 0 {
            break;
        }
        hasher.update(chunk[..filled].trim_ascii());
        if filled < HASH_CHUNK_SIZE {
            break;
        }
    }
    let digest = hasher.finalize();
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

/// Reads until the chunk is full or the stream ends.
async fn fill_chunk<R: AsyncRead + Unpin>(reader: &mut R, chunk: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < chunk.len() {
        let n = reader.read(&mut chunk[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
