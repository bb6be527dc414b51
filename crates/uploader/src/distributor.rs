use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use swarmshare_chunk_store::ChunkStore;
use swarmshare_codec::{ContentHasher, DEFAULT_CHUNK_SIZE, chunk_count, chunk_hash};
use swarmshare_directory::PeerDirectory;
use swarmshare_placement::{Planner, placement_summary};
use swarmshare_protocol::{FileDescriptor, FileId, PeerId};
use swarmshare_registry::MetadataRegistry;
use swarmshare_transfer::{ChunkClient, TransferConfig};

use crate::DistributeError;

/// Result of the scan pass over a file.
struct FileScan {
    size: u64,
    file_id: FileId,
    chunk_hashes: Vec<String>,
}

/// Drives one file through split, plan, place, and publish.
pub struct Distributor {
    local: PeerId,
    planner: Planner,
    store: Arc<ChunkStore>,
    directory: Arc<dyn PeerDirectory>,
    client: ChunkClient,
    chunk_size: u32,
}

impl Distributor {
    pub fn new(
        local: PeerId,
        planner: Planner,
        store: Arc<ChunkStore>,
        directory: Arc<dyn PeerDirectory>,
    ) -> Self {
        Self {
            local,
            planner,
            store,
            directory,
            client: ChunkClient::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.client = ChunkClient::new(config);
        self
    }

    /// Distributes the file at `path` and publishes its descriptor.
    ///
    /// Files at or above the distribution threshold are spread round robin
    /// over the local peer and the live directory listing; the upload is
    /// refused outright when too few peers are live. Smaller files get a
    /// degenerate all-local placement so the download path stays uniform.
    pub async fn distribute(
        &self,
        path: &Path,
        registry: &dyn MetadataRegistry,
    ) -> Result<FileDescriptor, DistributeError> {
        let scan = self.scan(path).await?;
        let count = chunk_count(scan.size, self.chunk_size)?;

        let (placement, distributed) = if self.planner.should_distribute(scan.size) {
            let available = self.directory.list_available_peers();
            let map = self.planner.plan(count, &self.local, &available)?;
            (map, true)
        } else {
            (self.planner.plan_local(count, &self.local), false)
        };

        info!(
            file_id = %scan.file_id,
            size = scan.size,
            chunks = count,
            distributed,
            peers = placement_summary(&placement).len(),
            "placement planned"
        );

        self.place_chunks(path, &scan, &placement).await?;

        let descriptor = FileDescriptor {
            file_id: scan.file_id,
            name: file_name(path),
            size: scan.size,
            chunk_size: self.chunk_size,
            chunk_count: count,
            chunk_hashes: scan.chunk_hashes,
            distributed,
            placement,
            min_peers: self.planner.config().min_peers,
            published_at: Utc::now(),
        };
        registry.publish(descriptor.clone()).await?;

        info!(file_id = %descriptor.file_id, "descriptor published");
        Ok(descriptor)
    }

    /// First pass: stream the file once, computing the whole-file hash
    /// (the file id) and the per-chunk hashes.
    async fn scan(&self, path: &Path) -> Result<FileScan, DistributeError> {
        let mut file = File::open(path).await?;
        let mut file_hasher = ContentHasher::new();
        let mut chunk_hashes = Vec::new();
        let mut size = 0u64;
        let mut buf = vec![0u8; self.chunk_size as usize];

        loop {
            let n = fill_chunk(&mut file, &mut buf).await?;
            if n == 0 {
                break;
            }
            size += n as u64;
            file_hasher.update(&buf[..n]);
            chunk_hashes.push(chunk_hash(&buf[..n]));
            if n < buf.len() {
                break;
            }
        }

        Ok(FileScan {
            size,
            file_id: FileId::new(file_hasher.finish()),
            chunk_hashes,
        })
    }

    /// Second pass: re-read each chunk and hand it to its owner.
    ///
    /// Chunks the local peer owns go straight into the local store; the
    /// rest are pushed over the chunk channel. The declared hash comes
    /// from the scan pass, so a file modified between passes surfaces as
    /// a hash mismatch instead of a silently inconsistent descriptor.
    async fn place_chunks(
        &self,
        path: &Path,
        scan: &FileScan,
        placement: &std::collections::BTreeMap<u32, PeerId>,
    ) -> Result<(), DistributeError> {
        let mut file = File::open(path).await?;
        let mut buf = vec![0u8; self.chunk_size as usize];

        for (&index, owner) in placement {
            let n = fill_chunk(&mut file, &mut buf).await?;
            let data = &buf[..n];
            let declared = &scan.chunk_hashes[index as usize];

            if owner == &self.local {
                self.store.put(&scan.file_id, index, data, declared).await?;
                debug!(file_id = %scan.file_id, index, "chunk stored locally");
                continue;
            }

            let endpoint = self
                .directory
                .find(owner)
                .filter(|p| p.online)
                .ok_or_else(|| DistributeError::UnknownPeer(owner.clone()))?;
            self.client
                .send_chunk(endpoint.addr, scan.file_id.as_str(), index, declared, data)
                .await
                .map_err(|source| DistributeError::ChunkPush {
                    index,
                    peer: owner.clone(),
                    source,
                })?;
            debug!(file_id = %scan.file_id, index, peer = %owner, "chunk pushed");
        }
        Ok(())
    }
}

/// Reads until `buf` is full or the file ends; returns the bytes read.
async fn fill_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string()
}
