//! Registry client: talks to the tracker over WebSocket.
//!
//! Each call opens one connection, sends a single request, and waits for
//! the reply carrying the same message id, bounded by a request timeout.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite;
use tracing::debug;
use uuid::Uuid;

use swarmshare_protocol::constants::WS_MAX_MESSAGE_SIZE;
use swarmshare_protocol::messages::{
    DescriptorResponse, FetchDescriptorRequest, PublishAck, PublishDescriptorRequest,
};
use swarmshare_protocol::{FileDescriptor, FileId, Message, MessageType};

use crate::{MetadataRegistry, RegistryError, RegistryFuture, REGISTRY_REQUEST_TIMEOUT};

/// Client side of the registry channel.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    url: String,
    timeout: Duration,
}

impl RegistryClient {
    /// Creates a client for a tracker URL, e.g. `ws://10.0.0.5:9500`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: REGISTRY_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs one request/response exchange on a fresh connection.
    async fn request<T: Serialize>(
        &self,
        msg_type: MessageType,
        payload: &T,
    ) -> Result<Message, RegistryError> {
        let id = Uuid::new_v4().to_string();
        let request = Message::new(&id, msg_type, Some(payload))?;
        let json = serde_json::to_string(&request)?;

        let exchange = async {
            let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
            ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
            ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
            let (mut ws_stream, _) =
                connect_async_with_config(&self.url, Some(ws_config), false).await?;

            ws_stream
                .send(tungstenite::Message::Text(json.into()))
                .await?;

            // Replies carry the request id; anything else on the channel
            // is not ours and is skipped.
            loop {
                let Some(frame) = ws_stream.next().await else {
                    return Err(RegistryError::Closed);
                };
                match frame? {
                    tungstenite::Message::Text(text) => {
                        let response: Message = serde_json::from_str(&text)?;
                        if response.id == id {
                            let _ = ws_stream.close(None).await;
                            return Ok(response);
                        }
                        debug!(id = %response.id, "skipping unrelated registry message");
                    }
                    tungstenite::Message::Close(_) => return Err(RegistryError::Closed),
                    _ => {}
                }
            }
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RegistryError::Timeout)??;

        if let Some(err) = &response.error {
            return Err(RegistryError::Remote {
                code: err.code,
                message: err.message.clone(),
            });
        }
        Ok(response)
    }
}

impl MetadataRegistry for RegistryClient {
    fn publish(&self, descriptor: FileDescriptor) -> RegistryFuture<'_, ()> {
        Box::pin(async move {
            let file_id = descriptor.file_id.clone();
            let request = PublishDescriptorRequest { descriptor };
            let response = self
                .request(MessageType::PublishDescriptor, &request)
                .await?;

            let ack: Option<PublishAck> = response.parse_payload()?;
            match ack {
                Some(ack) if ack.file_id == file_id => Ok(()),
                _ => Err(RegistryError::Closed),
            }
        })
    }

    fn fetch(&self, file_id: FileId) -> RegistryFuture<'_, Option<FileDescriptor>> {
        Box::pin(async move {
            let request = FetchDescriptorRequest { file_id };
            let response = self.request(MessageType::FetchDescriptor, &request).await?;

            let payload: Option<DescriptorResponse> = response.parse_payload()?;
            Ok(payload.and_then(|p| p.descriptor))
        })
    }
}
