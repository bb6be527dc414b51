//! Durable download-job persistence: one JSON file per job.

use std::path::{Path, PathBuf};

use tracing::debug;

use swarmshare_protocol::DownloadJobRecord;

use crate::DownloadError;

/// Keyed store of job records under a directory, `<root>/<job_id>.json`.
///
/// Records are written atomically (temp + rename) so a crash mid-save
/// leaves the previous version intact. Jobs found here at startup are
/// candidates for resumption.
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn save(&self, record: &DownloadJobRecord) -> Result<(), DownloadError> {
        validate_job_id(&record.job_id)?;

        let json = serde_json::to_vec_pretty(record)?;
        let final_path = self.job_path(&record.job_id);
        let tmp_path = final_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        debug!(job_id = %record.job_id, state = ?record.state, "job persisted");
        Ok(())
    }

    pub async fn load(&self, job_id: &str) -> Result<Option<DownloadJobRecord>, DownloadError> {
        validate_job_id(job_id)?;

        let json = match tokio::fs::read(self.job_path(job_id)).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&json)?))
    }

    /// All persisted jobs, in directory order.
    pub async fn list(&self) -> Result<Vec<DownloadJobRecord>, DownloadError> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(".json") {
                continue;
            }
            let json = tokio::fs::read(entry.path()).await?;
            records.push(serde_json::from_slice(&json)?);
        }
        Ok(records)
    }

    pub async fn remove(&self, job_id: &str) -> Result<(), DownloadError> {
        validate_job_id(job_id)?;

        match tokio::fs::remove_file(self.job_path(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.root.join(format!("{job_id}.json"))
    }
}

/// Job ids become filenames; anything beyond a UUID-shaped single path
/// component is refused.
fn validate_job_id(job_id: &str) -> Result<(), DownloadError> {
    let safe = !job_id.is_empty()
        && job_id.len() <= 64
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if safe {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unsafe job id: {job_id:?}"),
        )
        .into())
    }
}
