//! In-process registry for tests and single-process swarms.

use std::collections::HashMap;
use std::sync::RwLock;

use swarmshare_protocol::{FileDescriptor, FileId};

use crate::{MetadataRegistry, RegistryError, RegistryFuture};

/// Registry backed by an in-memory map.
///
/// Applies the same placement validation as the tracker, so a descriptor
/// that a test publishes here would also be accepted over the wire.
#[derive(Default)]
pub struct MemoryRegistry {
    descriptors: RwLock<HashMap<FileId, FileDescriptor>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().unwrap().is_empty()
    }
}

impl MetadataRegistry for MemoryRegistry {
    fn publish(&self, descriptor: FileDescriptor) -> RegistryFuture<'_, ()> {
        Box::pin(async move {
            if !descriptor.has_complete_placement() {
                return Err(RegistryError::InvalidDescriptor(format!(
                    "placement incomplete for {}",
                    descriptor.file_id
                )));
            }
            self.descriptors
                .write()
                .unwrap()
                .insert(descriptor.file_id.clone(), descriptor);
            Ok(())
        })
    }

    fn fetch(&self, file_id: FileId) -> RegistryFuture<'_, Option<FileDescriptor>> {
        Box::pin(async move { Ok(self.descriptors.read().unwrap().get(&file_id).cloned()) })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use swarmshare_protocol::PeerId;

    use super::*;

    fn descriptor(id: &str) -> FileDescriptor {
        FileDescriptor {
            file_id: FileId::new(id),
            name: "sample.bin".into(),
            size: 2048,
            chunk_size: 1024,
            chunk_count: 2,
            chunk_hashes: vec!["0".repeat(64), "1".repeat(64)],
            distributed: true,
            placement: BTreeMap::from([(0, PeerId::new("a")), (1, PeerId::new("b"))]),
            min_peers: 2,
            published_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_then_fetch() {
        let registry = MemoryRegistry::new();
        let d = descriptor("file-1");
        registry.publish(d.clone()).await.unwrap();

        let fetched = registry.fetch(d.file_id.clone()).await.unwrap();
        assert_eq!(fetched, Some(d));
    }

    #[tokio::test]
    async fn fetch_unknown_is_none() {
        let registry = MemoryRegistry::new();
        let fetched = registry.fetch(FileId::new("ghost")).await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn publish_rejects_incomplete_placement() {
        let registry = MemoryRegistry::new();
        let mut d = descriptor("file-1");
        d.placement.remove(&1);

        let err = registry.publish(d).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDescriptor(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn republish_replaces_entry() {
        let registry = MemoryRegistry::new();
        let mut d = descriptor("file-1");
        registry.publish(d.clone()).await.unwrap();

        d.name = "renamed.bin".into();
        registry.publish(d.clone()).await.unwrap();

        let fetched = registry.fetch(d.file_id.clone()).await.unwrap().unwrap();
        assert_eq!(fetched.name, "renamed.bin");
        assert_eq!(registry.len(), 1);
    }
}
