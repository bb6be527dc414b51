//! Distributed upload driver.
//!
//! [`Distributor`] takes a file through the whole sharing pipeline: scan
//! and hash, plan chunk ownership, place every chunk (local store or
//! remote push), and publish the descriptor to the metadata registry.
//! The descriptor is only published once every chunk is durably placed.

mod distributor;

pub use distributor::Distributor;

use swarmshare_chunk_store::StoreError;
use swarmshare_codec::CodecError;
use swarmshare_placement::PlanError;
use swarmshare_protocol::PeerId;
use swarmshare_registry::RegistryError;
use swarmshare_transfer::TransferError;

/// Errors produced while distributing a file.
#[derive(Debug, thiserror::Error)]
pub enum DistributeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("distribution refused: {0}")]
    InsufficientPeers(#[from] PlanError),

    #[error("local chunk store error: {0}")]
    Store(#[from] StoreError),

    #[error("pushing chunk {index} to {peer} failed: {source}")]
    ChunkPush {
        index: u32,
        peer: PeerId,
        #[source]
        source: TransferError,
    },

    #[error("peer {0} owns chunks but is not in the directory")]
    UnknownPeer(PeerId),

    #[error("publishing descriptor failed: {0}")]
    Registry(#[from] RegistryError),
}
