use serde::{Deserialize, Serialize};

/// Protocol version advertised on the registry channel.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Minimum number of live remote peers required for a distributed upload.
pub const DEFAULT_MIN_PEERS: u32 = 2;

/// File size at and above which multi-peer distribution is mandatory (1 GiB).
pub const DEFAULT_DISTRIBUTION_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Maximum registry WebSocket message size (16 MiB).
///
/// Descriptors carry one 64-char hash per chunk, so even very large files
/// stay well under this bound.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Message types on the registry WebSocket channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    PublishDescriptor,
    PublishAck,
    FetchDescriptor,
    DescriptorResponse,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serializes_snake_case() {
        let json = serde_json::to_string(&MessageType::PublishDescriptor).unwrap();
        assert_eq!(json, "\"publish_descriptor\"");

        let parsed: MessageType = serde_json::from_str("\"descriptor_response\"").unwrap();
        assert_eq!(parsed, MessageType::DescriptorResponse);
    }
}
