//! Tracker metadata registry: publishes and serves file descriptors so
//! any peer can start a download without having performed the original
//! distribution.
//!
//! The tracker end is [`TrackerServer`] (WebSocket + JSON envelope over
//! a durable [`DescriptorStore`]); peers talk to it through
//! [`RegistryClient`]. [`MemoryRegistry`] backs tests and single-process
//! swarms.

pub mod client;
pub mod memory;
pub mod server;
pub mod store;

pub use client::RegistryClient;
pub use memory::MemoryRegistry;
pub use server::TrackerServer;
pub use store::DescriptorStore;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use swarmshare_protocol::{FileDescriptor, FileId};

/// Timeout for one registry request/response exchange.
pub const REGISTRY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A boxed future returned by registry methods.
pub type RegistryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RegistryError>> + Send + 'a>>;

/// Metadata registry interface consumed by uploaders and downloaders.
///
/// Injected as a collaborator so components can be unit-tested against
/// [`MemoryRegistry`] instead of a live tracker.
pub trait MetadataRegistry: Send + Sync {
    /// Publishes a descriptor, making the file discoverable.
    fn publish(&self, descriptor: FileDescriptor) -> RegistryFuture<'_, ()>;

    /// Fetches a descriptor; `Ok(None)` when the registry has no entry.
    fn fetch(&self, file_id: FileId) -> RegistryFuture<'_, Option<FileDescriptor>>;
}

/// Errors produced by the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed before response")]
    Closed,

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("registry error {code}: {message}")]
    Remote { code: i32, message: String },
}
