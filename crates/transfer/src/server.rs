//! Chunk server: serves store-chunk / fetch-chunk / job-status requests
//! against the peer's local chunk store.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use swarmshare_chunk_store::{ChunkStore, StoreError};
use swarmshare_codec::chunk_hash;
use swarmshare_protocol::{ChunkStatusReport, FileId};

use crate::wire::{
    self, Request, STATUS_CORRUPT, STATUS_HASH_MISMATCH, STATUS_NOT_FOUND, STATUS_OK,
};
use crate::{TCP_BUFFER_SIZE, TransferError};

/// Source of download-job status reports, served over the wire.
///
/// Implemented by the downloader's job table; the server answers
/// job-status requests with not-found when no source is attached.
pub trait StatusSource: Send + Sync {
    fn job_status(&self, job_id: &str) -> Option<ChunkStatusReport>;
}

/// TCP server exposing the local chunk store to remote peers.
pub struct ChunkServer {
    store: Arc<ChunkStore>,
    status: Option<Arc<dyn StatusSource>>,
    cancel: CancellationToken,
}

impl ChunkServer {
    pub fn new(store: Arc<ChunkStore>, cancel: CancellationToken) -> Self {
        Self {
            store,
            status: None,
            cancel,
        }
    }

    /// Attaches a job-status source.
    pub fn with_status_source(mut self, status: Arc<dyn StatusSource>) -> Self {
        self.status = Some(status);
        self
    }

    /// Binds a listener and returns the bound address with it.
    ///
    /// Pass port 0 in `bind` for an OS-assigned port.
    pub async fn listen(
        &self,
        bind: SocketAddr,
    ) -> Result<(SocketAddr, TcpListener), TransferError> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "chunk server listening");
        Ok((addr, listener))
    }

    /// Accepts connections until cancelled, serving any number of
    /// requests per connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), TransferError> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("chunk server shutting down");
                    return Ok(());
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    warn!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), TransferError> {
        debug!(%peer_addr, "chunk connection accepted");
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::with_capacity(TCP_BUFFER_SIZE, reader);
        let mut writer = BufWriter::with_capacity(TCP_BUFFER_SIZE, writer);

        loop {
            let request = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                request = wire::read_request(&mut reader) => request?,
            };
            let Some(request) = request else {
                debug!(%peer_addr, "chunk connection closed");
                return Ok(());
            };

            match request {
                Request::StoreChunk {
                    file_id,
                    index,
                    hash,
                    data,
                } => {
                    self.handle_store(&mut writer, &file_id, index, &hash, &data)
                        .await?;
                }
                Request::FetchChunk { file_id, index } => {
                    self.handle_fetch(&mut writer, &file_id, index).await?;
                }
                Request::JobStatus { job_id } => {
                    self.handle_status(&mut writer, &job_id).await?;
                }
            }
        }
    }

    async fn handle_store<W: tokio::io::AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        file_id: &str,
        index: u32,
        hash: &str,
        data: &[u8],
    ) -> Result<(), TransferError> {
        let file_id = FileId::new(file_id);
        match self.store.put(&file_id, index, data, hash).await {
            Ok(()) => {
                debug!(%file_id, index, len = data.len(), "chunk stored for remote peer");
                wire::write_status(writer, STATUS_OK).await
            }
            Err(StoreError::HashMismatch { .. }) => {
                warn!(%file_id, index, "store-chunk rejected: hash mismatch");
                wire::write_status(writer, STATUS_HASH_MISMATCH).await
            }
            Err(StoreError::InvalidFileId(reason)) => {
                Err(TransferError::Protocol(format!("invalid file id: {reason}")))
            }
            Err(e) => {
                error!(%file_id, index, "store-chunk failed: {e}");
                Err(TransferError::Io(std::io::Error::other(e.to_string())))
            }
        }
    }

    async fn handle_fetch<W: tokio::io::AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        file_id: &str,
        index: u32,
    ) -> Result<(), TransferError> {
        let file_id = FileId::new(file_id);
        match self.store.get(&file_id, index).await {
            Ok(data) => {
                debug!(%file_id, index, len = data.len(), "serving chunk");
                let hash = chunk_hash(&data);
                wire::write_chunk_response(writer, &hash, &data).await
            }
            Err(StoreError::ChunkNotFound { .. }) | Err(StoreError::InvalidFileId(_)) => {
                debug!(%file_id, index, "fetch-chunk: not found");
                wire::write_status(writer, STATUS_NOT_FOUND).await
            }
            Err(StoreError::Integrity { .. }) => {
                warn!(%file_id, index, "fetch-chunk: refusing to serve corrupt chunk");
                wire::write_status(writer, STATUS_CORRUPT).await
            }
            Err(e) => {
                error!(%file_id, index, "fetch-chunk failed: {e}");
                Err(TransferError::Io(std::io::Error::other(e.to_string())))
            }
        }
    }

    async fn handle_status<W: tokio::io::AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        job_id: &str,
    ) -> Result<(), TransferError> {
        let report = self
            .status
            .as_ref()
            .and_then(|source| source.job_status(job_id));
        match report {
            Some(report) => wire::write_report_response(writer, &report).await,
            None => wire::write_status(writer, STATUS_NOT_FOUND).await,
        }
    }
}
