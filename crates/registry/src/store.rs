//! Durable descriptor persistence: one JSON file per descriptor.

use std::path::{Path, PathBuf};

use tracing::debug;

use swarmshare_protocol::{FileDescriptor, FileId};

use crate::RegistryError;

/// Durable keyed store of file descriptors, rooted at a directory.
///
/// Descriptors live under `<root>/<file_id>.json` and are written
/// atomically (temp file + rename), so a crash mid-publish never leaves a
/// truncated descriptor behind. Nothing is cached: reads go to disk, which
/// keeps the store trivially correct across restarts.
pub struct DescriptorStore {
    root: PathBuf,
}

impl DescriptorStore {
    /// Opens a store at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists a descriptor, replacing any previous version.
    pub async fn save(&self, descriptor: &FileDescriptor) -> Result<(), RegistryError> {
        validate(descriptor)?;

        let json = serde_json::to_vec_pretty(descriptor)?;
        let final_path = self.descriptor_path(&descriptor.file_id);
        let tmp_path = final_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        debug!(file_id = %descriptor.file_id, "descriptor saved");
        Ok(())
    }

    /// Loads a descriptor; `Ok(None)` when the store has no entry.
    pub async fn load(&self, file_id: &FileId) -> Result<Option<FileDescriptor>, RegistryError> {
        validate_id(file_id.as_str())?;

        let path = self.descriptor_path(file_id);
        let json = match tokio::fs::read(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&json)?))
    }

    /// All stored descriptors, in directory order.
    pub async fn list(&self) -> Result<Vec<FileDescriptor>, RegistryError> {
        let mut descriptors = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(".json") {
                continue;
            }
            let json = tokio::fs::read(entry.path()).await?;
            descriptors.push(serde_json::from_slice(&json)?);
        }
        Ok(descriptors)
    }

    /// Removes a descriptor; missing entries are fine.
    pub async fn remove(&self, file_id: &FileId) -> Result<(), RegistryError> {
        validate_id(file_id.as_str())?;

        match tokio::fs::remove_file(self.descriptor_path(file_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn descriptor_path(&self, file_id: &FileId) -> PathBuf {
        self.root.join(format!("{}.json", file_id.as_str()))
    }
}

/// Rejects descriptors whose placement does not cover every chunk index.
fn validate(descriptor: &FileDescriptor) -> Result<(), RegistryError> {
    validate_id(descriptor.file_id.as_str())?;
    if !descriptor.has_complete_placement() {
        return Err(RegistryError::InvalidDescriptor(format!(
            "placement incomplete for {}: {} chunks, {} placed, {} hashes",
            descriptor.file_id,
            descriptor.chunk_count,
            descriptor.placement.len(),
            descriptor.chunk_hashes.len(),
        )));
    }
    Ok(())
}

/// File ids become filenames, so they must be a single safe path component.
fn validate_id(file_id: &str) -> Result<(), RegistryError> {
    let safe = !file_id.is_empty()
        && file_id.len() <= 128
        && file_id != "."
        && file_id != ".."
        && file_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if safe {
        Ok(())
    } else {
        Err(RegistryError::InvalidDescriptor(format!(
            "unsafe file id: {file_id:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use swarmshare_protocol::PeerId;

    use super::*;

    fn descriptor(id: &str, chunk_count: u32) -> FileDescriptor {
        FileDescriptor {
            file_id: FileId::new(id),
            name: "payload.bin".into(),
            size: chunk_count as u64 * 1024,
            chunk_size: 1024,
            chunk_count,
            chunk_hashes: (0..chunk_count).map(|i| format!("{i:064x}")).collect(),
            distributed: true,
            placement: (0..chunk_count)
                .map(|i| (i, PeerId::new(if i % 2 == 0 { "a" } else { "b" })))
                .collect(),
            min_peers: 2,
            published_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::open(dir.path()).await.unwrap();

        let d = descriptor("file-1", 4);
        store.save(&d).await.unwrap();

        let loaded = store.load(&d.file_id).await.unwrap().unwrap();
        assert_eq!(loaded, d);
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::open(dir.path()).await.unwrap();
        assert!(store.load(&FileId::new("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn descriptors_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let d = descriptor("file-1", 3);
        {
            let store = DescriptorStore::open(dir.path()).await.unwrap();
            store.save(&d).await.unwrap();
        }

        let reopened = DescriptorStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.load(&d.file_id).await.unwrap().unwrap(), d);
    }

    #[tokio::test]
    async fn save_replaces_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::open(dir.path()).await.unwrap();

        let mut d = descriptor("file-1", 2);
        store.save(&d).await.unwrap();
        d.name = "renamed.bin".into();
        store.save(&d).await.unwrap();

        let loaded = store.load(&d.file_id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "renamed.bin");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn incomplete_placement_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::open(dir.path()).await.unwrap();

        let mut d = descriptor("file-1", 4);
        d.placement.remove(&2);
        let err = store.save(&d).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDescriptor(_)));
        assert!(store.load(&d.file_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsafe_file_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::open(dir.path()).await.unwrap();

        let err = store.load(&FileId::new("../escape")).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDescriptor(_)));
    }

    #[tokio::test]
    async fn list_returns_all_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::open(dir.path()).await.unwrap();

        store.save(&descriptor("file-1", 2)).await.unwrap();
        store.save(&descriptor("file-2", 3)).await.unwrap();

        let mut ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.file_id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["file-1", "file-2"]);
    }

    #[tokio::test]
    async fn remove_deletes_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let store = DescriptorStore::open(dir.path()).await.unwrap();

        let d = descriptor("doomed", 2);
        store.save(&d).await.unwrap();
        store.remove(&d.file_id).await.unwrap();
        assert!(store.load(&d.file_id).await.unwrap().is_none());

        // Removing again is fine.
        store.remove(&d.file_id).await.unwrap();
    }
}
