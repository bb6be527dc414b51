//! Tracker WebSocket server.
//!
//! Accepts any number of peer connections, reads envelope messages, and
//! answers publish/fetch requests against the durable descriptor store,
//! preserving the request id on every reply.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use swarmshare_protocol::constants::WS_MAX_MESSAGE_SIZE;
use swarmshare_protocol::messages::{
    DescriptorResponse, FetchDescriptorRequest, PublishAck, PublishDescriptorRequest,
};
use swarmshare_protocol::{Message, MessageType};

use crate::store::DescriptorStore;
use crate::RegistryError;

/// The tracker's registry server.
pub struct TrackerServer {
    store: Arc<DescriptorStore>,
    cancel: CancellationToken,
}

impl TrackerServer {
    pub fn new(store: Arc<DescriptorStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Binds a listener and returns the bound address with it.
    ///
    /// Pass port 0 in `bind` for an OS-assigned port.
    pub async fn listen(
        &self,
        bind: SocketAddr,
    ) -> Result<(SocketAddr, TcpListener), RegistryError> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "tracker registry listening");
        Ok((addr, listener))
    }

    /// Accepts connections until cancelled.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), RegistryError> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("tracker registry shutting down");
                    return Ok(());
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    warn!(%peer_addr, "registry connection error: {e}");
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
    ) -> Result<(), RegistryError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;
        debug!(%peer_addr, "registry connection established");

        let (mut write, mut read) = ws_stream.split();

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                frame = read.next() => frame,
            };
            let Some(frame) = frame else {
                debug!(%peer_addr, "registry connection closed");
                return Ok(());
            };

            match frame? {
                tungstenite::Message::Text(text) => {
                    let reply = match serde_json::from_str::<Message>(&text) {
                        Ok(request) => self.handle_message(request).await,
                        Err(e) => {
                            warn!(%peer_addr, "malformed registry message: {e}");
                            Message::error("", 400, format!("malformed message: {e}"))
                        }
                    };
                    let json = serde_json::to_string(&reply)?;
                    write.send(tungstenite::Message::Text(json.into())).await?;
                }
                tungstenite::Message::Close(_) => {
                    debug!(%peer_addr, "registry connection closed by peer");
                    return Ok(());
                }
                // Ping/pong are answered by the protocol layer.
                _ => {}
            }
        }
    }

    async fn handle_message(&self, request: Message) -> Message {
        match request.msg_type {
            MessageType::PublishDescriptor => self.handle_publish(&request).await,
            MessageType::FetchDescriptor => self.handle_fetch(&request).await,
            other => request.reply_error(400, format!("unsupported message type: {other:?}")),
        }
    }

    async fn handle_publish(&self, request: &Message) -> Message {
        let payload = match request.parse_payload::<PublishDescriptorRequest>() {
            Ok(Some(payload)) => payload,
            Ok(None) => return request.reply_error(400, "missing payload"),
            Err(e) => return request.reply_error(400, format!("malformed payload: {e}")),
        };

        let file_id = payload.descriptor.file_id.clone();
        match self.store.save(&payload.descriptor).await {
            Ok(()) => {
                info!(%file_id, chunks = payload.descriptor.chunk_count, "descriptor published");
                let ack = PublishAck { file_id };
                request
                    .reply(MessageType::PublishAck, Some(&ack))
                    .unwrap_or_else(|e| request.reply_error(500, e.to_string()))
            }
            Err(RegistryError::InvalidDescriptor(reason)) => {
                warn!(%file_id, "rejecting descriptor: {reason}");
                request.reply_error(400, reason)
            }
            Err(e) => {
                error!(%file_id, "descriptor save failed: {e}");
                request.reply_error(500, e.to_string())
            }
        }
    }

    async fn handle_fetch(&self, request: &Message) -> Message {
        let payload = match request.parse_payload::<FetchDescriptorRequest>() {
            Ok(Some(payload)) => payload,
            Ok(None) => return request.reply_error(400, "missing payload"),
            Err(e) => return request.reply_error(400, format!("malformed payload: {e}")),
        };

        match self.store.load(&payload.file_id).await {
            Ok(descriptor) => {
                debug!(file_id = %payload.file_id, found = descriptor.is_some(), "descriptor fetch");
                let response = DescriptorResponse { descriptor };
                request
                    .reply(MessageType::DescriptorResponse, Some(&response))
                    .unwrap_or_else(|e| request.reply_error(500, e.to_string()))
            }
            Err(RegistryError::InvalidDescriptor(reason)) => request.reply_error(400, reason),
            Err(e) => {
                error!(file_id = %payload.file_id, "descriptor load failed: {e}");
                request.reply_error(500, e.to_string())
            }
        }
    }
}
