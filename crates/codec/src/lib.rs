//! Chunk codec: splits byte streams into fixed-size chunks and rebuilds
//! them, with SHA-256 integrity end to end.
//!
//! Pure transforms only — no I/O lives here.

mod chunks;
mod hash;

pub use chunks::{Chunk, chunk_count, reassemble, split};
pub use hash::{ContentHasher, chunk_hash, content_hash};

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u32 = 1024 * 1024;

/// Errors produced by the codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("chunk size must be non-zero")]
    ZeroChunkSize,

    #[error("incomplete input: {} chunk(s) missing, first missing index {}",
            missing.len(), missing.first().copied().unwrap_or(0))]
    IncompleteInput { missing: Vec<u32> },

    #[error("integrity failure at chunk {index}: declared {declared}, got {actual}")]
    Integrity {
        index: u32,
        declared: String,
        actual: String,
    },
}
