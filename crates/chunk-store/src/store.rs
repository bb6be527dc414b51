use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use swarmshare_codec::chunk_hash;
use swarmshare_protocol::{ChunkRecord, FileId};

use crate::{StoreError, validate_file_id};

type ChunkKey = (FileId, u32);

/// Durable chunk store rooted at a directory.
///
/// Reads are safely concurrent; writes to a given `(file_id, index)` key
/// are exclusive while the chunk is persisted.
pub struct ChunkStore {
    root: PathBuf,
    records: RwLock<HashMap<ChunkKey, ChunkRecord>>,
    /// Per-key write locks, created on demand.
    put_locks: Mutex<HashMap<ChunkKey, Arc<Mutex<()>>>>,
}

impl ChunkStore {
    /// Opens a store at `root`, creating the directory if needed and
    /// rebuilding the record index from chunks already on disk.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let store = Self {
            root,
            records: RwLock::new(HashMap::new()),
            put_locks: Mutex::new(HashMap::new()),
        };
        store.rescan().await?;
        Ok(store)
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists a chunk after verifying its declared hash.
    ///
    /// All-or-nothing: bytes are written to a temp file and renamed into
    /// place, so a failed or interrupted `put` never leaves a partial
    /// chunk behind. Re-putting an identical chunk is a no-op success.
    pub async fn put(
        &self,
        file_id: &FileId,
        index: u32,
        data: &[u8],
        declared_hash: &str,
    ) -> Result<(), StoreError> {
        validate_file_id(file_id.as_str())?;

        let key = (file_id.clone(), index);
        let lock = self.key_lock(&key).await;
        let _guard = lock.lock().await;

        let actual = chunk_hash(data);
        if actual != declared_hash {
            warn!(%file_id, index, "rejecting chunk with hash mismatch");
            return Err(StoreError::HashMismatch {
                file_id: file_id.clone(),
                index,
                declared: declared_hash.to_string(),
                actual,
            });
        }

        if let Some(existing) = self.records.read().await.get(&key) {
            if existing.hash == actual && existing.available {
                debug!(%file_id, index, "chunk already stored, no-op");
                return Ok(());
            }
        }

        let dir = self.file_dir(file_id);
        tokio::fs::create_dir_all(&dir).await?;

        let final_path = chunk_path(&dir, index);
        let tmp_path = dir.join(format!("chunk_{index}.bin.tmp"));
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        tokio::fs::write(hash_path(&dir, index), &actual).await?;

        let record = ChunkRecord {
            file_id: file_id.clone(),
            index,
            hash: actual,
            len: data.len() as u64,
            path: final_path,
            available: true,
        };
        self.records.write().await.insert(key, record);

        debug!(%file_id, index, len = data.len(), "chunk stored");
        Ok(())
    }

    /// Returns the chunk bytes, re-verifying the stored hash first.
    ///
    /// At-rest corruption fails with [`StoreError::Integrity`]; corrupted
    /// bytes are never returned.
    pub async fn get(&self, file_id: &FileId, index: u32) -> Result<Vec<u8>, StoreError> {
        validate_file_id(file_id.as_str())?;

        let key = (file_id.clone(), index);
        let record = self
            .records
            .read()
            .await
            .get(&key)
            .filter(|r| r.available)
            .cloned()
            .ok_or_else(|| StoreError::ChunkNotFound {
                file_id: file_id.clone(),
                index,
            })?;

        let data = match tokio::fs::read(&record.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ChunkNotFound {
                    file_id: file_id.clone(),
                    index,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if chunk_hash(&data) != record.hash {
            warn!(%file_id, index, "at-rest corruption detected");
            if let Some(r) = self.records.write().await.get_mut(&key) {
                r.available = false;
            }
            return Err(StoreError::Integrity {
                file_id: file_id.clone(),
                index,
            });
        }

        Ok(data)
    }

    /// `true` if the chunk is stored and available.
    pub async fn has(&self, file_id: &FileId, index: u32) -> bool {
        self.records
            .read()
            .await
            .get(&(file_id.clone(), index))
            .is_some_and(|r| r.available)
    }

    /// Records for all stored chunks of a file, ordered by index.
    pub async fn records(&self, file_id: &FileId) -> Vec<ChunkRecord> {
        let mut records: Vec<ChunkRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| &r.file_id == file_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.index);
        records
    }

    /// Deletes every chunk belonging to `file_id`.
    pub async fn remove_file(&self, file_id: &FileId) -> Result<(), StoreError> {
        validate_file_id(file_id.as_str())?;

        let dir = self.file_dir(file_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.records
            .write()
            .await
            .retain(|(id, _), _| id != file_id);
        debug!(%file_id, "file chunks removed");
        Ok(())
    }

    /// Rebuilds the record index from chunks on disk.
    ///
    /// A chunk counts only when both its data file and hash sidecar exist;
    /// anything else is a leftover from an interrupted write and ignored.
    async fn rescan(&self) -> Result<(), StoreError> {
        let mut records = HashMap::new();

        let mut dirs = tokio::fs::read_dir(&self.root).await?;
        while let Some(dir_entry) = dirs.next_entry().await? {
            if !dir_entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(id) = dir_entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if validate_file_id(&id).is_err() {
                continue;
            }
            let file_id = FileId::new(id);

            let mut files = tokio::fs::read_dir(dir_entry.path()).await?;
            while let Some(entry) = files.next_entry().await? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Some(index) = parse_chunk_index(name) else {
                    continue;
                };

                let dir = dir_entry.path();
                let hash = match tokio::fs::read_to_string(hash_path(&dir, index)).await {
                    Ok(h) => h.trim().to_string(),
                    Err(_) => continue,
                };
                let len = entry.metadata().await?.len();

                records.insert(
                    (file_id.clone(), index),
                    ChunkRecord {
                        file_id: file_id.clone(),
                        index,
                        hash,
                        len,
                        path: entry.path(),
                        available: true,
                    },
                );
            }
        }

        debug!(count = records.len(), root = %self.root.display(), "chunk index rebuilt");
        *self.records.write().await = records;
        Ok(())
    }

    fn file_dir(&self, file_id: &FileId) -> PathBuf {
        self.root.join(file_id.as_str())
    }

    async fn key_lock(&self, key: &ChunkKey) -> Arc<Mutex<()>> {
        let mut locks = self.put_locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }
}

fn chunk_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("chunk_{index}.bin"))
}

fn hash_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("chunk_{index}.hash"))
}

fn parse_chunk_index(name: &str) -> Option<u32> {
    name.strip_prefix("chunk_")?
        .strip_suffix(".bin")?
        .parse()
        .ok()
}
