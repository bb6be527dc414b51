use serde::{Deserialize, Serialize};

use crate::types::{FileDescriptor, FileId};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Publishes a file descriptor to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishDescriptorRequest {
    pub descriptor: FileDescriptor,
}

/// Requests a file descriptor by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDescriptorRequest {
    pub file_id: FileId,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Acknowledges a published descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishAck {
    pub file_id: FileId,
}

/// Carries a fetched descriptor, or `None` when the registry has no entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<FileDescriptor>,
}
