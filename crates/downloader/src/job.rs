//! Mutable download job state, shared between the fetch loop and status
//! readers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use swarmshare_protocol::{
    ChunkState, ChunkStatusAggregate, ChunkStatusEntry, ChunkStatusReport, DownloadJobRecord,
    FileDescriptor, FileId, JobState, PeerId,
};

/// Progress snapshot published on every meaningful transition.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub state: JobState,
    pub aggregate: ChunkStatusAggregate,
    pub bytes_transferred: u64,
    pub bytes_per_sec: f64,
    pub eta: Option<Duration>,
}

struct Inner {
    chunk_states: BTreeMap<u32, ChunkState>,
    unreachable: BTreeSet<PeerId>,
    bytes_transferred: u64,
    state: JobState,
    updated_at: DateTime<Utc>,
}

/// One file's download, from planning to a terminal state.
///
/// Holds a read-only copy of the placement map taken at creation; per-chunk
/// state moves `pending → in_flight → {completed | failed}` under an inner
/// lock so the concurrent fetch tasks and status readers never conflict.
pub struct DownloadJob {
    job_id: String,
    descriptor: FileDescriptor,
    auto_resume: bool,
    created_at: DateTime<Utc>,
    inner: RwLock<Inner>,
    progress: watch::Sender<DownloadProgress>,
}

impl DownloadJob {
    pub fn new(descriptor: FileDescriptor, auto_resume: bool) -> Self {
        let chunk_states = descriptor
            .placement
            .keys()
            .map(|&i| (i, ChunkState::Pending))
            .collect();
        Self::build(
            Uuid::new_v4().to_string(),
            descriptor,
            auto_resume,
            Utc::now(),
            chunk_states,
            BTreeSet::new(),
            0,
            JobState::Planning,
        )
    }

    /// Restores a job from its persisted record.
    ///
    /// In-flight is a live-process state; anything persisted as in-flight
    /// was interrupted and goes back to pending.
    pub fn from_record(record: DownloadJobRecord) -> Self {
        let chunk_states = record
            .chunk_states
            .into_iter()
            .map(|(i, s)| match s {
                ChunkState::InFlight => (i, ChunkState::Pending),
                other => (i, other),
            })
            .collect();
        Self::build(
            record.job_id,
            record.descriptor,
            record.auto_resume,
            record.created_at,
            chunk_states,
            record.unreachable_peers,
            record.bytes_transferred,
            record.state,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        job_id: String,
        descriptor: FileDescriptor,
        auto_resume: bool,
        created_at: DateTime<Utc>,
        chunk_states: BTreeMap<u32, ChunkState>,
        unreachable: BTreeSet<PeerId>,
        bytes_transferred: u64,
        state: JobState,
    ) -> Self {
        let inner = Inner {
            chunk_states,
            unreachable,
            bytes_transferred,
            state,
            updated_at: Utc::now(),
        };
        let initial = snapshot(&job_id, &descriptor, &inner);
        let (progress, _) = watch::channel(DownloadProgress {
            state: initial.state,
            aggregate: initial.aggregate,
            bytes_transferred,
            bytes_per_sec: 0.0,
            eta: None,
        });
        Self {
            job_id,
            descriptor,
            auto_resume,
            created_at,
            inner: RwLock::new(inner),
            progress,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    pub fn file_id(&self) -> &FileId {
        &self.descriptor.file_id
    }

    pub fn auto_resume(&self) -> bool {
        self.auto_resume
    }

    pub fn state(&self) -> JobState {
        self.inner.read().unwrap().state
    }

    pub fn set_state(&self, state: JobState) {
        let mut inner = self.inner.write().unwrap();
        inner.state = state;
        inner.updated_at = Utc::now();
    }

    pub fn chunk_state(&self, index: u32) -> Option<ChunkState> {
        self.inner.read().unwrap().chunk_states.get(&index).copied()
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.inner.read().unwrap().bytes_transferred
    }

    /// Claims a pending chunk for fetching.
    ///
    /// Returns `false` when the chunk is not pending (already claimed,
    /// done, or failed), so concurrent schedulers cannot double-fetch.
    pub fn mark_in_flight(&self, index: u32) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.chunk_states.get_mut(&index) {
            Some(state @ ChunkState::Pending) => {
                *state = ChunkState::InFlight;
                inner.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub fn mark_completed(&self, index: u32, bytes: u64) {
        let mut inner = self.inner.write().unwrap();
        inner.chunk_states.insert(index, ChunkState::Completed);
        inner.bytes_transferred += bytes;
        inner.updated_at = Utc::now();
    }

    /// Fails a chunk and records its owner as currently unreachable.
    pub fn mark_failed(&self, index: u32, owner: PeerId) {
        let mut inner = self.inner.write().unwrap();
        inner.chunk_states.insert(index, ChunkState::Failed);
        inner.unreachable.insert(owner);
        inner.updated_at = Utc::now();
    }

    /// Reconciles one chunk against the local store at admission.
    ///
    /// A chunk already held locally is completed without a fetch; a chunk
    /// marked completed that the store no longer has goes back to pending.
    pub fn reconcile_local_chunk(&self, index: u32, present: bool) {
        let mut inner = self.inner.write().unwrap();
        let Some(state) = inner.chunk_states.get_mut(&index) else {
            return;
        };
        if present {
            *state = ChunkState::Completed;
        } else if *state == ChunkState::Completed {
            *state = ChunkState::Pending;
        }
        inner.updated_at = Utc::now();
    }

    /// Returns a recovered owner's failed chunks to pending.
    pub fn requeue_owner_chunks(&self, owner: &PeerId) -> Vec<u32> {
        let mut inner = self.inner.write().unwrap();
        let mut requeued = Vec::new();
        for (&index, state) in inner.chunk_states.iter_mut() {
            if *state == ChunkState::Failed && self.descriptor.owner_of(index) == Some(owner) {
                *state = ChunkState::Pending;
                requeued.push(index);
            }
        }
        if !requeued.is_empty() {
            inner.unreachable.remove(owner);
            inner.updated_at = Utc::now();
        }
        requeued
    }

    pub fn pending_chunks(&self) -> Vec<u32> {
        self.chunks_in(ChunkState::Pending)
    }

    pub fn failed_chunks(&self) -> Vec<u32> {
        self.chunks_in(ChunkState::Failed)
    }

    fn chunks_in(&self, wanted: ChunkState) -> Vec<u32> {
        self.inner
            .read()
            .unwrap()
            .chunk_states
            .iter()
            .filter(|&(_, &s)| s == wanted)
            .map(|(&i, _)| i)
            .collect()
    }

    pub fn unreachable_peers(&self) -> BTreeSet<PeerId> {
        self.inner.read().unwrap().unreachable.clone()
    }

    /// Full per-chunk and aggregate status.
    pub fn status_report(&self) -> ChunkStatusReport {
        let inner = self.inner.read().unwrap();
        snapshot(&self.job_id, &self.descriptor, &inner).into_report()
    }

    /// Persistable form of the current state.
    pub fn to_record(&self) -> DownloadJobRecord {
        let inner = self.inner.read().unwrap();
        DownloadJobRecord {
            job_id: self.job_id.clone(),
            descriptor: self.descriptor.clone(),
            chunk_states: inner.chunk_states.clone(),
            unreachable_peers: inner.unreachable.clone(),
            auto_resume: self.auto_resume,
            bytes_transferred: inner.bytes_transferred,
            state: inner.state,
            created_at: self.created_at,
            updated_at: inner.updated_at,
        }
    }

    /// Watches progress updates; the receiver always holds the latest
    /// snapshot.
    pub fn subscribe(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.subscribe()
    }

    /// Publishes a progress snapshot to all watchers.
    pub fn publish_progress(&self, bytes_per_sec: f64, eta: Option<Duration>) {
        let inner = self.inner.read().unwrap();
        let snap = snapshot(&self.job_id, &self.descriptor, &inner);
        self.progress.send_replace(DownloadProgress {
            state: snap.state,
            aggregate: snap.aggregate,
            bytes_transferred: inner.bytes_transferred,
            bytes_per_sec,
            eta,
        });
    }
}

struct Snapshot {
    job_id: String,
    file_id: FileId,
    state: JobState,
    chunks: BTreeMap<u32, ChunkStatusEntry>,
    aggregate: ChunkStatusAggregate,
}

impl Snapshot {
    fn into_report(self) -> ChunkStatusReport {
        ChunkStatusReport {
            job_id: self.job_id,
            file_id: self.file_id,
            state: self.state,
            chunks: self.chunks,
            aggregate: self.aggregate,
        }
    }
}

fn snapshot(job_id: &str, descriptor: &FileDescriptor, inner: &Inner) -> Snapshot {
    let mut chunks = BTreeMap::new();
    let mut completed = 0u32;
    let mut in_flight = 0u32;
    let mut pending = 0u32;
    let mut failed = 0u32;

    for (&index, owner) in &descriptor.placement {
        let state = inner
            .chunk_states
            .get(&index)
            .copied()
            .unwrap_or(ChunkState::Pending);
        match state {
            ChunkState::Completed => completed += 1,
            ChunkState::InFlight => in_flight += 1,
            ChunkState::Pending => pending += 1,
            ChunkState::Failed => failed += 1,
        }
        chunks.insert(
            index,
            ChunkStatusEntry {
                state,
                owner: owner.clone(),
            },
        );
    }

    let total = descriptor.chunk_count;
    let percent_complete = if total == 0 {
        100.0
    } else {
        completed as f64 / total as f64 * 100.0
    };

    Snapshot {
        job_id: job_id.to_string(),
        file_id: descriptor.file_id.clone(),
        state: inner.state,
        chunks,
        aggregate: ChunkStatusAggregate {
            total,
            completed,
            in_flight,
            pending,
            failed,
            percent_complete,
        },
    }
}
