//! Chunk client: issues single chunk operations against a remote peer.
//!
//! Every call opens one connection and is bounded by the configured
//! timeouts. A timeout or connection failure is reported for that
//! specific (peer, chunk) as [`TransferError::PeerUnreachable`] without
//! retrying — the orchestrator owns the retry/resume policy.

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use swarmshare_codec::chunk_hash;
use swarmshare_protocol::ChunkStatusReport;

use crate::wire::{
    self, STATUS_CORRUPT, STATUS_HASH_MISMATCH, STATUS_NOT_FOUND, STATUS_OK,
};
use crate::{TCP_BUFFER_SIZE, TransferConfig, TransferError};

type Reader = BufReader<OwnedReadHalf>;
type Writer = BufWriter<OwnedWriteHalf>;

/// Client side of the chunk channel.
#[derive(Debug, Clone, Default)]
pub struct ChunkClient {
    config: TransferConfig,
}

impl ChunkClient {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// Stores a chunk on the remote peer.
    ///
    /// Re-storing an identical chunk is a no-op success on the remote
    /// side, so retried pushes are safe.
    pub async fn send_chunk(
        &self,
        addr: SocketAddr,
        file_id: &str,
        index: u32,
        hash: &str,
        data: &[u8],
    ) -> Result<(), TransferError> {
        let (mut reader, mut writer) = self.connect(addr).await?;

        let status = self
            .bounded(addr, async {
                wire::write_store_request(&mut writer, file_id, index, hash, data).await?;
                flush(&mut writer).await?;
                wire::read_status(&mut reader).await
            })
            .await?;

        match status {
            STATUS_OK => {
                debug!(%addr, file_id, index, "chunk sent");
                Ok(())
            }
            STATUS_HASH_MISMATCH => Err(TransferError::HashMismatch),
            other => Err(TransferError::Protocol(format!(
                "unexpected store-chunk status: {other:#04x}"
            ))),
        }
    }

    /// Fetches a chunk from the remote peer, verifying the frame hash
    /// before returning the bytes.
    pub async fn fetch_chunk(
        &self,
        addr: SocketAddr,
        file_id: &str,
        index: u32,
    ) -> Result<Vec<u8>, TransferError> {
        let (mut reader, mut writer) = self.connect(addr).await?;

        let response = self
            .bounded(addr, async {
                wire::write_fetch_request(&mut writer, file_id, index).await?;
                flush(&mut writer).await?;
                let status = wire::read_status(&mut reader).await?;
                if status == STATUS_OK {
                    let payload = wire::read_chunk_payload(&mut reader).await?;
                    Ok((status, Some(payload)))
                } else {
                    Ok((status, None))
                }
            })
            .await?;

        match response {
            (STATUS_OK, Some((hash, data))) => {
                if chunk_hash(&data) != hash {
                    return Err(TransferError::HashMismatch);
                }
                debug!(%addr, file_id, index, len = data.len(), "chunk fetched");
                Ok(data)
            }
            (STATUS_NOT_FOUND, _) => Err(TransferError::NotFound),
            (STATUS_CORRUPT, _) => Err(TransferError::Corrupt),
            (other, _) => Err(TransferError::Protocol(format!(
                "unexpected fetch-chunk status: {other:#04x}"
            ))),
        }
    }

    /// Queries a remote peer for the status of one of its download jobs.
    pub async fn job_status(
        &self,
        addr: SocketAddr,
        job_id: &str,
    ) -> Result<ChunkStatusReport, TransferError> {
        let (mut reader, mut writer) = self.connect(addr).await?;

        let response = self
            .bounded(addr, async {
                wire::write_status_request(&mut writer, job_id).await?;
                flush(&mut writer).await?;
                let status = wire::read_status(&mut reader).await?;
                if status == STATUS_OK {
                    let report = wire::read_report_payload(&mut reader).await?;
                    Ok((status, Some(report)))
                } else {
                    Ok((status, None))
                }
            })
            .await?;

        match response {
            (STATUS_OK, Some(report)) => Ok(report),
            (STATUS_NOT_FOUND, _) => Err(TransferError::NotFound),
            (other, _) => Err(TransferError::Protocol(format!(
                "unexpected job-status status: {other:#04x}"
            ))),
        }
    }

    async fn connect(&self, addr: SocketAddr) -> Result<(Reader, Writer), TransferError> {
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransferError::PeerUnreachable {
                addr,
                reason: "connect timed out".into(),
            })?
            .map_err(|e| TransferError::PeerUnreachable {
                addr,
                reason: e.to_string(),
            })?;

        let (reader, writer) = stream.into_split();
        Ok((
            BufReader::with_capacity(TCP_BUFFER_SIZE, reader),
            BufWriter::with_capacity(TCP_BUFFER_SIZE, writer),
        ))
    }

    /// Runs one request/response exchange under the request timeout,
    /// mapping timeouts and transport failures to `PeerUnreachable`.
    async fn bounded<T>(
        &self,
        addr: SocketAddr,
        exchange: impl Future<Output = Result<T, TransferError>>,
    ) -> Result<T, TransferError> {
        match tokio::time::timeout(self.config.request_timeout, exchange).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(TransferError::Io(e))) => Err(TransferError::PeerUnreachable {
                addr,
                reason: e.to_string(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransferError::PeerUnreachable {
                addr,
                reason: "request timed out".into(),
            }),
        }
    }
}

async fn flush(writer: &mut Writer) -> Result<(), TransferError> {
    tokio::io::AsyncWriteExt::flush(writer).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use swarmshare_chunk_store::ChunkStore;
    use swarmshare_protocol::{
        ChunkState, ChunkStatusAggregate, ChunkStatusEntry, FileId, JobState, PeerId,
    };

    use super::*;
    use crate::server::{ChunkServer, StatusSource};

    async fn spawn_server(
        store: Arc<ChunkStore>,
        status: Option<Arc<dyn StatusSource>>,
    ) -> (SocketAddr, CancellationToken) {
        let cancel = CancellationToken::new();
        let mut server = ChunkServer::new(store, cancel.clone());
        if let Some(status) = status {
            server = server.with_status_source(status);
        }
        let server = Arc::new(server);
        let (addr, listener) = server.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        tokio::spawn(async move { server.serve(listener).await });
        (addr, cancel)
    }

    fn quick_config() -> TransferConfig {
        TransferConfig {
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn store_then_fetch_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let (addr, _cancel) = spawn_server(Arc::clone(&store), None).await;

        let client = ChunkClient::default();
        let data = b"remote chunk".to_vec();
        let hash = chunk_hash(&data);

        client
            .send_chunk(addr, "file-1", 2, &hash, &data)
            .await
            .unwrap();
        assert!(store.has(&FileId::new("file-1"), 2).await);

        let fetched = client.fetch_chunk(addr, "file-1", 2).await.unwrap();
        assert_eq!(fetched, data);
    }

    #[tokio::test]
    async fn restore_identical_chunk_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let (addr, _cancel) = spawn_server(Arc::clone(&store), None).await;

        let client = ChunkClient::default();
        let data = b"same bytes".to_vec();
        let hash = chunk_hash(&data);

        client.send_chunk(addr, "f", 0, &hash, &data).await.unwrap();
        client.send_chunk(addr, "f", 0, &hash, &data).await.unwrap();

        let first = client.fetch_chunk(addr, "f", 0).await.unwrap();
        let second = client.fetch_chunk(addr, "f", 0).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn store_with_bad_hash_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let (addr, _cancel) = spawn_server(Arc::clone(&store), None).await;

        let client = ChunkClient::default();
        let err = client
            .send_chunk(addr, "file-1", 0, &"0".repeat(64), b"payload")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::HashMismatch));
        assert!(!store.has(&FileId::new("file-1"), 0).await);
    }

    #[tokio::test]
    async fn fetch_missing_chunk_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let (addr, _cancel) = spawn_server(store, None).await;

        let client = ChunkClient::default();
        let err = client.fetch_chunk(addr, "ghost", 0).await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound));
    }

    #[tokio::test]
    async fn fetch_corrupt_chunk_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());

        let data = b"will be corrupted";
        store
            .put(&FileId::new("file-1"), 0, data, &chunk_hash(data))
            .await
            .unwrap();
        std::fs::write(dir.path().join("file-1/chunk_0.bin"), b"garbage").unwrap();

        let (addr, _cancel) = spawn_server(store, None).await;
        let client = ChunkClient::default();
        let err = client.fetch_chunk(addr, "file-1", 0).await.unwrap_err();
        assert!(matches!(err, TransferError::Corrupt));
    }

    #[tokio::test]
    async fn dead_peer_reports_unreachable() {
        // Bind a port, then drop the listener so connections are refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ChunkClient::new(quick_config());
        let err = client.fetch_chunk(addr, "file-1", 0).await.unwrap_err();
        assert!(matches!(err, TransferError::PeerUnreachable { .. }));
    }

    #[tokio::test]
    async fn unresponsive_peer_times_out() {
        // A listener that accepts but never responds.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = ChunkClient::new(quick_config());
        let err = client.fetch_chunk(addr, "file-1", 0).await.unwrap_err();
        match err {
            TransferError::PeerUnreachable { reason, .. } => {
                assert!(reason.contains("timed out"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct FixedStatus(ChunkStatusReport);

    impl StatusSource for FixedStatus {
        fn job_status(&self, job_id: &str) -> Option<ChunkStatusReport> {
            (job_id == self.0.job_id).then(|| self.0.clone())
        }
    }

    fn sample_report() -> ChunkStatusReport {
        ChunkStatusReport {
            job_id: "job-1".into(),
            file_id: FileId::new("file-1"),
            state: JobState::Active,
            chunks: BTreeMap::from([(
                0,
                ChunkStatusEntry {
                    state: ChunkState::Completed,
                    owner: PeerId::new("peer-a"),
                },
            )]),
            aggregate: ChunkStatusAggregate {
                total: 1,
                completed: 1,
                in_flight: 0,
                pending: 0,
                failed: 0,
                percent_complete: 100.0,
            },
        }
    }

    #[tokio::test]
    async fn job_status_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let report = sample_report();
        let (addr, _cancel) =
            spawn_server(store, Some(Arc::new(FixedStatus(report.clone())))).await;

        let client = ChunkClient::default();
        let fetched = client.job_status(addr, "job-1").await.unwrap();
        assert_eq!(fetched, report);

        let err = client.job_status(addr, "unknown").await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound));
    }

    #[tokio::test]
    async fn job_status_without_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let (addr, _cancel) = spawn_server(store, None).await;

        let client = ChunkClient::default();
        let err = client.job_status(addr, "job-1").await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound));
    }

    #[tokio::test]
    async fn server_cancellation_stops_accepting() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ChunkStore::open(dir.path()).await.unwrap());
        let (addr, cancel) = spawn_server(store, None).await;

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = ChunkClient::new(quick_config());
        let result = client.fetch_chunk(addr, "file-1", 0).await;
        assert!(result.is_err());
    }
}
