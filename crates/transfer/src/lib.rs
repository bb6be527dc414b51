//! TCP chunk channel between peers.
//!
//! Moves individual chunks over a dedicated binary protocol: a peer's
//! [`ChunkServer`] serves store-chunk / fetch-chunk / job-status requests
//! against its local chunk store, and [`ChunkClient`] issues them with
//! per-request timeouts. The client never retries on its own — retry and
//! resume decisions belong to the download orchestrator, which has
//! cross-chunk context.
//!
//! # Wire format
//!
//! See the [`wire`] module for the frame layout.

pub mod client;
pub mod server;
pub mod wire;

pub use client::ChunkClient;
pub use server::{ChunkServer, StatusSource};

use std::net::SocketAddr;
use std::time::Duration;

/// TCP read/write buffer size (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Timeouts for a single chunk operation.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Timeout for the TCP connection attempt.
    pub connect_timeout: Duration,
    /// Timeout for one full request/response exchange.
    pub request_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Errors produced by the chunk channel.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer {addr} unreachable: {reason}")]
    PeerUnreachable { addr: SocketAddr, reason: String },

    #[error("chunk not found on remote peer")]
    NotFound,

    #[error("remote peer rejected chunk: hash mismatch")]
    HashMismatch,

    #[error("remote chunk is corrupt")]
    Corrupt,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
