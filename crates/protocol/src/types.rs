use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a peer in the swarm.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-derived identifier of a shared file.
///
/// The id is the lowercase hex SHA-256 of the whole file, which doubles as
/// the declared whole-file hash checked after reassembly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata describing a shared file and where its chunks live.
///
/// The placement map is fixed at share time and immutable afterwards:
/// every chunk index in `[0, chunk_count)` maps to exactly one owning peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_id: FileId,
    pub name: String,
    pub size: u64,
    pub chunk_size: u32,
    pub chunk_count: u32,
    /// Hex SHA-256 per chunk, ordered by index.
    pub chunk_hashes: Vec<String>,
    /// `true` when chunks are spread over multiple peers.
    pub distributed: bool,
    /// chunk index -> owning peer.
    pub placement: BTreeMap<u32, PeerId>,
    pub min_peers: u32,
    pub published_at: DateTime<Utc>,
}

impl FileDescriptor {
    /// Returns the peer that owns the given chunk index.
    pub fn owner_of(&self, index: u32) -> Option<&PeerId> {
        self.placement.get(&index)
    }

    /// `true` when every index in `[0, chunk_count)` has an owner and the
    /// per-chunk hash list matches the chunk count.
    pub fn has_complete_placement(&self) -> bool {
        self.chunk_hashes.len() == self.chunk_count as usize
            && (0..self.chunk_count).all(|i| self.placement.contains_key(&i))
    }

    /// Declared whole-file hash (same value as the content-derived id).
    pub fn file_hash(&self) -> &str {
        self.file_id.as_str()
    }
}

/// A chunk held by the local store.
///
/// Owned exclusively by the storing peer; created on receipt or local
/// split and deleted with the owning file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub file_id: FileId,
    pub index: u32,
    pub hash: String,
    pub len: u64,
    pub path: PathBuf,
    pub available: bool,
}

/// A reachable peer as reported by the discovery mechanism.
///
/// Supplied read-only; this subsystem never mutates endpoints it did not
/// create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEndpoint {
    pub id: PeerId,
    pub name: String,
    pub addr: SocketAddr,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

impl PeerEndpoint {
    /// Returns `true` if the endpoint has not been seen within `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        Utc::now() - self.last_seen > max_age
    }
}

/// Per-chunk download state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChunkState {
    Pending,
    InFlight,
    Completed,
    Failed,
}

/// File-level download state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Planning,
    Active,
    Complete,
    PartialStalled,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::PartialStalled | JobState::Cancelled
        )
    }
}

/// Status of one chunk within a download job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStatusEntry {
    pub state: ChunkState,
    pub owner: PeerId,
}

/// Aggregate counters over all chunks of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStatusAggregate {
    pub total: u32,
    pub completed: u32,
    pub in_flight: u32,
    pub pending: u32,
    pub failed: u32,
    pub percent_complete: f64,
}

/// Full per-chunk + aggregate status of a download job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStatusReport {
    pub job_id: String,
    pub file_id: FileId,
    pub state: JobState,
    pub chunks: BTreeMap<u32, ChunkStatusEntry>,
    pub aggregate: ChunkStatusAggregate,
}

/// Persisted form of a download job, durable across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJobRecord {
    pub job_id: String,
    /// Read-only copy of the descriptor taken at job creation.
    pub descriptor: FileDescriptor,
    pub chunk_states: BTreeMap<u32, ChunkState>,
    pub unreachable_peers: BTreeSet<PeerId>,
    pub auto_resume: bool,
    pub bytes_transferred: u64,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
