//! Transport seam: the duplex connection trait, its WebSocket
//! implementation, and the shared outbound frame sender.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing::{debug, warn};

use koi_core::error::ClientError;
use koi_core::result::ClientResult;
use koi_core::types::UserId;

use crate::message::types::OutboundFrame;

use super::state::ConnectionState;

/// Where and as whom to connect.
#[derive(Debug, Clone)]
pub struct TransportEndpoint {
    /// WebSocket URL of the messaging backend.
    pub url: String,
    /// Bearer credential attached at connect time.
    pub bearer_token: String,
    /// Optional user identity header.
    pub user_id: Option<UserId>,
}

/// Send half of an established connection.
///
/// Frames are handed to a pump task through a bounded channel; a full
/// buffer fails the send rather than blocking the dispatch path.
#[derive(Debug, Clone)]
pub struct TransportLink {
    outbound: mpsc::Sender<String>,
}

impl TransportLink {
    /// Creates a link over an outbound text channel.
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self { outbound }
    }

    /// Queues a raw text frame for transmission.
    pub fn send(&self, text: String) -> ClientResult<()> {
        match self.outbound.try_send(text) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(ClientError::transport("outbound buffer full"))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(ClientError::transport("transport closed"))
            }
        }
    }

    /// Whether the underlying pump is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

/// A persistent duplex transport to the messaging backend.
///
/// `connect` returns the send half plus a receiver of raw inbound text
/// frames. The receiver yielding `None` means the connection dropped.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes one connection.
    async fn connect(
        &self,
        endpoint: &TransportEndpoint,
    ) -> ClientResult<(TransportLink, mpsc::Receiver<String>)>;
}

/// Consumes inbound frames one at a time, in arrival order.
#[async_trait]
pub trait FrameDispatcher: Send + Sync {
    /// Handles one raw frame.
    async fn dispatch(&self, raw: &str);
}

/// Shared outbound sender handed to the registry, router, and call
/// machine. The manager installs and clears the live link; holders only
/// ever observe the current one.
#[derive(Debug, Clone)]
pub struct FrameSender {
    link: Arc<RwLock<Option<TransportLink>>>,
    state: watch::Receiver<ConnectionState>,
}

impl FrameSender {
    /// Creates a sender observing the given connection state channel.
    pub fn new(state: watch::Receiver<ConnectionState>) -> Self {
        Self {
            link: Arc::new(RwLock::new(None)),
            state,
        }
    }

    /// Whether the connection is currently `Connected`.
    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    /// Serializes and sends a frame over the live link.
    pub fn send(&self, frame: &OutboundFrame) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::transport("not connected"));
        }
        let text = serde_json::to_string(frame)?;
        let guard = self
            .link
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.as_ref() {
            Some(link) => link.send(text),
            None => Err(ClientError::transport("no live link")),
        }
    }

    /// Whether a live link is installed and open.
    pub fn link_open(&self) -> bool {
        self.link
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .is_some_and(TransportLink::is_open)
    }

    pub(crate) fn install(&self, link: TransportLink) {
        *self
            .link
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(link);
    }

    pub(crate) fn clear(&self) {
        *self
            .link
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }
}

/// WebSocket transport backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsTransport {
    buffer_size: usize,
}

impl WsTransport {
    /// Creates a WebSocket transport with the given pump buffer size.
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        endpoint: &TransportEndpoint,
    ) -> ClientResult<(TransportLink, mpsc::Receiver<String>)> {
        let mut request = endpoint
            .url
            .clone()
            .into_client_request()
            .map_err(|e| ClientError::with_source(koi_core::error::ErrorKind::Transport, format!("invalid endpoint URL: {e}"), e))?;

        let bearer = format!("Bearer {}", endpoint.bearer_token);
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| ClientError::transport(format!("invalid bearer credential: {e}")))?,
        );
        if let Some(user_id) = endpoint.user_id {
            request.headers_mut().insert(
                "x-koi-user",
                HeaderValue::from_str(&user_id.to_string())
                    .map_err(|e| ClientError::transport(format!("invalid identity header: {e}")))?,
            );
        }

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| {
                ClientError::with_source(
                    koi_core::error::ErrorKind::Transport,
                    format!("WebSocket connect failed: {e}"),
                    e,
                )
            })?;

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(self.buffer_size);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(self.buffer_size);

        // Write pump: drains the outbound channel into the socket.
        // Ends when the link is dropped or the socket errors.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("WebSocket write pump ended");
        });

        // Read pump: forwards text frames to the dispatcher channel.
        // Dropping `inbound_tx` signals the drop to the reader task.
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text.as_str().to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
            debug!("WebSocket read pump ended");
        });

        Ok((TransportLink::new(outbound_tx), inbound_rx))
    }
}
