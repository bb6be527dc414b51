//! In-process registry of live download jobs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use swarmshare_protocol::ChunkStatusReport;
use swarmshare_transfer::StatusSource;

use crate::job::DownloadJob;

/// Live jobs on this peer, keyed by job id.
///
/// Implements the transfer channel's [`StatusSource`] so remote peers can
/// query any local job's chunk status over the wire.
#[derive(Default)]
pub struct JobTable {
    jobs: RwLock<HashMap<String, Arc<DownloadJob>>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Arc<DownloadJob>) {
        self.jobs
            .write()
            .unwrap()
            .insert(job.job_id().to_string(), job);
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<DownloadJob>> {
        self.jobs.read().unwrap().get(job_id).cloned()
    }

    pub fn remove(&self, job_id: &str) -> Option<Arc<DownloadJob>> {
        self.jobs.write().unwrap().remove(job_id)
    }

    pub fn jobs(&self) -> Vec<Arc<DownloadJob>> {
        self.jobs.read().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().unwrap().is_empty()
    }
}

impl StatusSource for JobTable {
    fn job_status(&self, job_id: &str) -> Option<ChunkStatusReport> {
        self.get(job_id).map(|job| job.status_report())
    }
}
