//! Shared data model and wire message types for SwarmShare.
//!
//! Everything a peer and the tracker exchange or persist is defined here:
//! file descriptors, placement maps, peer endpoints, download job records,
//! and the JSON envelope used on the registry channel.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

pub use constants::MessageType;
pub use envelope::{Message, WsError};
pub use types::{
    ChunkRecord, ChunkState, ChunkStatusAggregate, ChunkStatusEntry, ChunkStatusReport,
    DownloadJobRecord, FileDescriptor, FileId, JobState, PeerEndpoint, PeerId,
};
