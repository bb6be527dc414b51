//! Binary wire format for the chunk channel.
//!
//! ```text
//! REQUEST:  [1 byte op][body]
//!   op 0x01 store-chunk: [2 BE id_len][file_id][4 BE index]
//!                        [64 bytes hash hex][8 BE data_len][data]
//!   op 0x02 fetch-chunk: [2 BE id_len][file_id][4 BE index]
//!   op 0x03 job-status:  [2 BE id_len][job_id]
//!
//! RESPONSE: [1 byte status][body]
//!   status 0x01 ok:      store-chunk: empty
//!                        fetch-chunk: [64 bytes hash][8 BE data_len][data]
//!                        job-status:  [4 BE json_len][JSON ChunkStatusReport]
//!   status 0x02 not-found, 0x03 hash-mismatch, 0x04 corrupt: empty
//! ```
//!
//! All integers are big-endian; hashes travel as 64 ASCII hex bytes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use swarmshare_protocol::ChunkStatusReport;

use crate::TransferError;

pub const OP_STORE_CHUNK: u8 = 0x01;
pub const OP_FETCH_CHUNK: u8 = 0x02;
pub const OP_JOB_STATUS: u8 = 0x03;

pub const STATUS_OK: u8 = 0x01;
pub const STATUS_NOT_FOUND: u8 = 0x02;
pub const STATUS_HASH_MISMATCH: u8 = 0x03;
pub const STATUS_CORRUPT: u8 = 0x04;

/// Hex SHA-256 digest length on the wire.
pub const HASH_LEN: usize = 64;

/// Longest accepted file or job id.
pub const MAX_ID_LEN: usize = 256;

/// Largest accepted chunk payload (64 MiB).
pub const MAX_CHUNK_LEN: u64 = 64 * 1024 * 1024;

/// Largest accepted job-status JSON payload (16 MiB).
pub const MAX_STATUS_LEN: u32 = 16 * 1024 * 1024;

/// A parsed request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    StoreChunk {
        file_id: String,
        index: u32,
        hash: String,
        data: Vec<u8>,
    },
    FetchChunk {
        file_id: String,
        index: u32,
    },
    JobStatus {
        job_id: String,
    },
}

// ---------------------------------------------------------------------------
// Request framing
// ---------------------------------------------------------------------------

/// Writes a store-chunk request.
pub async fn write_store_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    file_id: &str,
    index: u32,
    hash: &str,
    data: &[u8],
) -> Result<(), TransferError> {
    writer.write_u8(OP_STORE_CHUNK).await?;
    write_id(writer, file_id).await?;
    writer.write_u32(index).await?;
    write_hash(writer, hash).await?;
    if data.len() as u64 > MAX_CHUNK_LEN {
        return Err(TransferError::Protocol(format!(
            "chunk too large: {} bytes (max {MAX_CHUNK_LEN})",
            data.len()
        )));
    }
    writer.write_u64(data.len() as u64).await?;
    writer.write_all(data).await?;
    Ok(())
}

/// Writes a fetch-chunk request.
pub async fn write_fetch_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    file_id: &str,
    index: u32,
) -> Result<(), TransferError> {
    writer.write_u8(OP_FETCH_CHUNK).await?;
    write_id(writer, file_id).await?;
    writer.write_u32(index).await?;
    Ok(())
}

/// Writes a job-status request.
pub async fn write_status_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    job_id: &str,
) -> Result<(), TransferError> {
    writer.write_u8(OP_JOB_STATUS).await?;
    write_id(writer, job_id).await?;
    Ok(())
}

/// Reads the next request frame.
///
/// Returns `None` on a clean end of stream (the peer closed the
/// connection between requests).
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Request>, TransferError> {
    let op = match reader.read_u8().await {
        Ok(op) => op,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match op {
        OP_STORE_CHUNK => {
            let file_id = read_id(reader).await?;
            let index = reader.read_u32().await?;
            let hash = read_hash(reader).await?;
            let len = reader.read_u64().await?;
            if len > MAX_CHUNK_LEN {
                return Err(TransferError::Protocol(format!(
                    "chunk too large: {len} bytes (max {MAX_CHUNK_LEN})"
                )));
            }
            let mut data = vec![0u8; len as usize];
            reader.read_exact(&mut data).await?;
            Ok(Some(Request::StoreChunk {
                file_id,
                index,
                hash,
                data,
            }))
        }
        OP_FETCH_CHUNK => {
            let file_id = read_id(reader).await?;
            let index = reader.read_u32().await?;
            Ok(Some(Request::FetchChunk { file_id, index }))
        }
        OP_JOB_STATUS => {
            let job_id = read_id(reader).await?;
            Ok(Some(Request::JobStatus { job_id }))
        }
        other => Err(TransferError::Protocol(format!(
            "unknown request op: {other:#04x}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Response framing
// ---------------------------------------------------------------------------

/// Writes a bare status byte (ok ack or any failure status).
pub async fn write_status<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: u8,
) -> Result<(), TransferError> {
    writer.write_u8(status).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes a successful fetch-chunk response with payload.
pub async fn write_chunk_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    hash: &str,
    data: &[u8],
) -> Result<(), TransferError> {
    writer.write_u8(STATUS_OK).await?;
    write_hash(writer, hash).await?;
    writer.write_u64(data.len() as u64).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes a successful job-status response with a JSON report.
pub async fn write_report_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    report: &ChunkStatusReport,
) -> Result<(), TransferError> {
    let json = serde_json::to_vec(report)?;
    writer.write_u8(STATUS_OK).await?;
    writer.write_u32(json.len() as u32).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a response status byte.
pub async fn read_status<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u8, TransferError> {
    Ok(reader.read_u8().await?)
}

/// Reads the payload of a successful fetch-chunk response.
pub async fn read_chunk_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<(String, Vec<u8>), TransferError> {
    let hash = read_hash(reader).await?;
    let len = reader.read_u64().await?;
    if len > MAX_CHUNK_LEN {
        return Err(TransferError::Protocol(format!(
            "chunk too large: {len} bytes (max {MAX_CHUNK_LEN})"
        )));
    }
    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data).await?;
    Ok((hash, data))
}

/// Reads the payload of a successful job-status response.
pub async fn read_report_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ChunkStatusReport, TransferError> {
    let len = reader.read_u32().await?;
    if len > MAX_STATUS_LEN {
        return Err(TransferError::Protocol(format!(
            "status payload too large: {len} bytes (max {MAX_STATUS_LEN})"
        )));
    }
    let mut json = vec![0u8; len as usize];
    reader.read_exact(&mut json).await?;
    Ok(serde_json::from_slice(&json)?)
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

async fn write_id<W: AsyncWrite + Unpin>(writer: &mut W, id: &str) -> Result<(), TransferError> {
    let bytes = id.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_ID_LEN {
        return Err(TransferError::Protocol(format!(
            "id length {} out of range (1..={MAX_ID_LEN})",
            bytes.len()
        )));
    }
    writer.write_u16(bytes.len() as u16).await?;
    writer.write_all(bytes).await?;
    Ok(())
}

async fn read_id<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, TransferError> {
    let len = reader.read_u16().await? as usize;
    if len == 0 || len > MAX_ID_LEN {
        return Err(TransferError::Protocol(format!(
            "id length {len} out of range (1..={MAX_ID_LEN})"
        )));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| TransferError::Protocol(format!("invalid UTF-8 id: {e}")))
}

async fn write_hash<W: AsyncWrite + Unpin>(
    writer: &mut W,
    hash: &str,
) -> Result<(), TransferError> {
    if hash.len() != HASH_LEN {
        return Err(TransferError::Protocol(format!(
            "hash must be {HASH_LEN} bytes, got {}",
            hash.len()
        )));
    }
    writer.write_all(hash.as_bytes()).await?;
    Ok(())
}

async fn read_hash<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, TransferError> {
    let mut buf = [0u8; HASH_LEN];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf.to_vec())
        .map_err(|e| TransferError::Protocol(format!("invalid hash encoding: {e}")))
}
