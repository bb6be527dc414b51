//! Download orchestration: drives one file's acquisition to completion.
//!
//! The [`Orchestrator`] resolves the placement map from the metadata
//! registry, schedules concurrent chunk fetches bounded by a transfer
//! limit, absorbs per-chunk failures into state transitions, and persists
//! enough state for a restart to resume where it left off. A download is
//! complete only when every chunk verified *and* the reassembled file
//! matches the descriptor's whole-file hash.

mod job;
mod job_store;
mod job_table;
mod orchestrator;
mod speed;

pub use job::{DownloadJob, DownloadProgress};
pub use job_store::JobStore;
pub use job_table::JobTable;
pub use orchestrator::Orchestrator;
pub use speed::SpeedCalculator;

use std::time::Duration;

use swarmshare_chunk_store::StoreError;
use swarmshare_codec::CodecError;
use swarmshare_protocol::FileId;
use swarmshare_registry::RegistryError;

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Upper bound on concurrent chunk fetches per job.
    pub max_concurrent: usize,
    /// Whether failed chunks wait for their owner to come back.
    pub auto_resume: bool,
    /// How many directory rechecks to run before stalling.
    pub resume_checks: u32,
    /// Delay between directory rechecks.
    pub resume_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            auto_resume: true,
            resume_checks: 3,
            resume_interval: Duration::from_secs(5),
        }
    }
}

/// Errors produced by the download orchestrator.
///
/// Per-chunk network and integrity failures never appear here — they are
/// absorbed into chunk-state transitions and surface through the job's
/// status instead.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no placement map available for {0}")]
    InsufficientMetadata(FileId),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("local chunk store error: {0}")]
    Store(#[from] StoreError),

    #[error("reassembled content does not match declared hash for {0}")]
    Integrity(FileId),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
