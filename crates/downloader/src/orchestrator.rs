//! The download orchestrator: resolves a placement map and drives every
//! chunk of one file into the local store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use swarmshare_chunk_store::ChunkStore;
use swarmshare_codec::{Chunk, chunk_hash, content_hash, reassemble};
use swarmshare_directory::PeerDirectory;
use swarmshare_protocol::{DownloadJobRecord, FileId, JobState, PeerId};
use swarmshare_registry::MetadataRegistry;
use swarmshare_transfer::{ChunkClient, TransferConfig};

use crate::job::DownloadJob;
use crate::job_store::JobStore;
use crate::speed::SpeedCalculator;
use crate::{DownloadConfig, DownloadError};

/// Drives download jobs from planning to a terminal state.
///
/// Per-chunk failures are absorbed into chunk-state transitions and feed
/// the resume logic; only job-level conditions (no metadata, local I/O,
/// a failed final integrity gate) surface as errors.
pub struct Orchestrator {
    local: PeerId,
    config: DownloadConfig,
    store: Arc<ChunkStore>,
    directory: Arc<dyn PeerDirectory>,
    job_store: Arc<JobStore>,
    client: ChunkClient,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        local: PeerId,
        store: Arc<ChunkStore>,
        directory: Arc<dyn PeerDirectory>,
        job_store: Arc<JobStore>,
    ) -> Self {
        Self {
            local,
            config: DownloadConfig::default(),
            store,
            directory,
            job_store,
            client: ChunkClient::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: DownloadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.client = ChunkClient::new(config);
        self
    }

    /// Token that cancels this orchestrator's jobs.
    ///
    /// Cancellation stops new scheduling promptly; in-flight fetches drain
    /// before the job settles in `Cancelled`.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Creates a job for `file_id` from the registry's descriptor.
    ///
    /// Fails with [`DownloadError::InsufficientMetadata`] when the registry
    /// has no descriptor (or an unusable one); a later retry needs a fresh
    /// metadata fetch, not a resumed job.
    pub async fn start(
        &self,
        file_id: FileId,
        registry: &dyn MetadataRegistry,
    ) -> Result<Arc<DownloadJob>, DownloadError> {
        let descriptor = registry
            .fetch(file_id.clone())
            .await?
            .ok_or_else(|| DownloadError::InsufficientMetadata(file_id.clone()))?;
        if !descriptor.has_complete_placement() {
            return Err(DownloadError::InsufficientMetadata(file_id));
        }

        let job = Arc::new(DownloadJob::new(descriptor, self.config.auto_resume));
        self.persist(&job).await?;
        info!(job_id = %job.job_id(), %file_id, "download job created");
        Ok(job)
    }

    /// Restores a persisted job for another `run`.
    pub fn resume(&self, record: DownloadJobRecord) -> Arc<DownloadJob> {
        let job = Arc::new(DownloadJob::from_record(record));
        info!(job_id = %job.job_id(), file_id = %job.file_id(), "download job resumed");
        job
    }

    /// Runs the job to a terminal state, writing the reassembled file to
    /// `output` on completion.
    ///
    /// Returns the terminal state reached. `Complete` requires every chunk
    /// verified *and* the reassembled content matching the descriptor's
    /// declared whole-file hash.
    pub async fn run(
        &self,
        job: Arc<DownloadJob>,
        output: &Path,
    ) -> Result<JobState, DownloadError> {
        // Planning: chunks the local store already holds are completed up
        // front, so a resumed job never refetches them. Completed chunks
        // the store lost (deleted, corrupted) go back to pending.
        let indices: Vec<u32> = job.descriptor().placement.keys().copied().collect();
        for index in indices {
            let present = self.store.get(job.file_id(), index).await.is_ok();
            job.reconcile_local_chunk(index, present);
        }
        job.set_state(JobState::Active);
        self.persist(&job).await?;
        info!(
            job_id = %job.job_id(),
            file_id = %job.file_id(),
            chunks = job.descriptor().chunk_count,
            pending = job.pending_chunks().len(),
            "download active"
        );

        let speed = Arc::new(Mutex::new(SpeedCalculator::default()));
        let mut rechecks = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return self.finish(&job, JobState::Cancelled).await;
            }

            self.fetch_wave(&job, &speed).await;
            self.persist(&job).await?;

            if self.cancel.is_cancelled() {
                return self.finish(&job, JobState::Cancelled).await;
            }
            if !job.pending_chunks().is_empty() {
                continue;
            }
            if job.failed_chunks().is_empty() {
                return self.finalize(&job, output).await;
            }

            // Only failed chunks remain. With auto-resume, wait for their
            // owners to come back; each recheck that recovers nothing eats
            // into the budget, then the job stalls for a later resume.
            if !job.auto_resume() || rechecks >= self.config.resume_checks {
                return self.finish(&job, JobState::PartialStalled).await;
            }
            rechecks += 1;
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return self.finish(&job, JobState::Cancelled).await;
                }
                _ = tokio::time::sleep(self.config.resume_interval) => {}
            }
            let recovered = self.recheck_owners(&job);
            if recovered > 0 {
                info!(
                    job_id = %job.job_id(),
                    recovered,
                    "owners back online, chunks requeued"
                );
            }
        }
    }

    /// One pass over the pending chunks, fetching concurrently up to the
    /// configured limit. Each fetch is bounded by the transfer timeouts,
    /// so one slow peer never holds up the rest of the wave.
    async fn fetch_wave(&self, job: &Arc<DownloadJob>, speed: &Arc<Mutex<SpeedCalculator>>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for index in job.pending_chunks() {
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    }
                }
            };
            if !job.mark_in_flight(index) {
                continue;
            }

            let local = self.local.clone();
            let store = Arc::clone(&self.store);
            let directory = Arc::clone(&self.directory);
            let client = self.client.clone();
            let job = Arc::clone(job);
            let speed = Arc::clone(speed);
            tasks.spawn(async move {
                let _permit = permit;
                let fetched = fetch_one(local, store, directory, client, &job, index).await;
                if fetched > 0 {
                    speed.lock().unwrap().record(fetched);
                }
                publish_progress(&job, &speed);
            });
        }

        // Cancellation stops scheduling above; whatever is in flight is
        // allowed to drain here.
        while tasks.join_next().await.is_some() {}
    }

    /// Requeues failed chunks whose owners the directory reports live
    /// again. Returns how many chunks went back to pending.
    fn recheck_owners(&self, job: &DownloadJob) -> usize {
        let mut recovered = 0;
        for owner in job.unreachable_peers() {
            if self
                .directory
                .find(&owner)
                .is_some_and(|endpoint| endpoint.online)
            {
                recovered += job.requeue_owner_chunks(&owner).len();
            }
        }
        recovered
    }

    /// Final gate: reassemble from the local store, verify the whole-file
    /// hash, and write the output atomically.
    async fn finalize(
        &self,
        job: &Arc<DownloadJob>,
        output: &Path,
    ) -> Result<JobState, DownloadError> {
        let descriptor = job.descriptor();
        let chunk_size = descriptor.chunk_size as u64;

        let mut chunks = Vec::with_capacity(descriptor.chunk_count as usize);
        for &index in descriptor.placement.keys() {
            let data = self.store.get(job.file_id(), index).await?;
            chunks.push(Chunk {
                index,
                offset: index as u64 * chunk_size,
                hash: chunk_hash(&data),
                data,
            });
        }

        let data = reassemble(&chunks, &descriptor.chunk_hashes)?;
        if content_hash(&data) != descriptor.file_hash() {
            warn!(
                job_id = %job.job_id(),
                file_id = %job.file_id(),
                "reassembled content fails the whole-file hash gate"
            );
            return Err(DownloadError::Integrity(job.file_id().clone()));
        }

        let tmp = output.with_extension("part");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, output).await?;

        info!(
            job_id = %job.job_id(),
            file_id = %job.file_id(),
            bytes = data.len(),
            output = %output.display(),
            "download complete"
        );
        self.finish(job, JobState::Complete).await
    }

    async fn finish(
        &self,
        job: &Arc<DownloadJob>,
        state: JobState,
    ) -> Result<JobState, DownloadError> {
        job.set_state(state);
        job.publish_progress(0.0, None);
        self.persist(job).await?;
        info!(job_id = %job.job_id(), ?state, "download finished");
        Ok(state)
    }

    async fn persist(&self, job: &DownloadJob) -> Result<(), DownloadError> {
        self.job_store.save(&job.to_record()).await
    }
}

/// Fetches one chunk into the local store, absorbing any failure into the
/// chunk's state. Returns how many bytes came over the network (zero for
/// local reads and failures).
async fn fetch_one(
    local: PeerId,
    store: Arc<ChunkStore>,
    directory: Arc<dyn PeerDirectory>,
    client: ChunkClient,
    job: &DownloadJob,
    index: u32,
) -> u64 {
    let Some(owner) = job.descriptor().owner_of(index).cloned() else {
        return 0;
    };
    let file_id = job.file_id().clone();
    let declared = job.descriptor().chunk_hashes[index as usize].clone();

    // Local owner: the chunk lives in our own store, no network hop.
    if owner == local {
        match store.get(&file_id, index).await {
            Ok(_) => job.mark_completed(index, 0),
            Err(e) => {
                warn!(%file_id, index, "local chunk unavailable: {e}");
                job.mark_failed(index, owner);
            }
        }
        return 0;
    }

    let Some(endpoint) = directory.find(&owner).filter(|p| p.online) else {
        debug!(%file_id, index, peer = %owner, "owner not reachable");
        job.mark_failed(index, owner);
        return 0;
    };

    match client.fetch_chunk(endpoint.addr, file_id.as_str(), index).await {
        Ok(data) => match store.put(&file_id, index, &data, &declared).await {
            Ok(()) => {
                debug!(%file_id, index, peer = %owner, len = data.len(), "chunk fetched");
                job.mark_completed(index, data.len() as u64);
                data.len() as u64
            }
            Err(e) => {
                // Bytes disagreeing with the declared hash are discarded,
                // never stored or counted.
                warn!(%file_id, index, peer = %owner, "fetched chunk rejected: {e}");
                job.mark_failed(index, owner);
                0
            }
        },
        Err(e) => {
            debug!(%file_id, index, peer = %owner, "chunk fetch failed: {e}");
            job.mark_failed(index, owner);
            0
        }
    }
}

fn publish_progress(job: &DownloadJob, speed: &Mutex<SpeedCalculator>) {
    let report = job.status_report();
    let chunk_size = job.descriptor().chunk_size as u64;
    let remaining =
        (report.aggregate.total - report.aggregate.completed) as u64 * chunk_size;

    let (rate, eta) = {
        let mut speed = speed.lock().unwrap();
        (speed.bytes_per_sec(), speed.eta(remaining))
    };
    job.publish_progress(rate, eta);
}
