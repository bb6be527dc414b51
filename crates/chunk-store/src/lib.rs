//! Durable chunk persistence, keyed by `(file id, chunk index)`.
//!
//! Chunks live under `<root>/<file_id>/chunk_<index>.bin` with a hex hash
//! sidecar `chunk_<index>.hash`. Every successful `put` survives a process
//! restart; the store re-verifies bytes against the sidecar before serving
//! them so corrupted data is never trusted.

mod store;
mod validate;

pub use store::ChunkStore;
pub use validate::validate_file_id;

use swarmshare_protocol::FileId;

/// Errors produced by the chunk store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hash mismatch for chunk {index} of {file_id}: declared {declared}, got {actual}")]
    HashMismatch {
        file_id: FileId,
        index: u32,
        declared: String,
        actual: String,
    },

    #[error("at-rest corruption in chunk {index} of {file_id}")]
    Integrity { file_id: FileId, index: u32 },

    #[error("chunk {index} of {file_id} not found")]
    ChunkNotFound { file_id: FileId, index: u32 },

    #[error("invalid file id: {0}")]
    InvalidFileId(String),
}
