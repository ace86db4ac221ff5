//! Client side of the WebSocket relay.

use super::protocol::{PeerNotice, PeerRequest};
use crate::config::ClientConfig;
use crate::transport::{Transport, TransportEvent, TransportFactory};
use anyhow::anyhow;
use async_trait::async_trait;
use callcore::{Envelope, PeerId};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

/// One WebSocket connection to a relay.
pub struct WebSocketTransport {
    ws_sink: Mutex<Option<WsSink>>,
}

impl WebSocketTransport {
    fn new(sink: WsSink) -> Self {
        Self {
            ws_sink: Mutex::new(Some(sink)),
        }
    }

    async fn send_request(&self, request: &PeerRequest) -> Result<(), anyhow::Error> {
        let mut sink_guard = self.ws_sink.lock().await;
        let sink = sink_guard
            .as_mut()
            .ok_or_else(|| anyhow!("Socket is closed"))?;

        let frame = request.encode()?;
        trace!("--> {frame}");
        sink.send(Message::text(frame))
            .await
            .map_err(|e| anyhow!("WebSocket send error: {}", e))
    }

    /// Tells the relay we are still here.
    async fn keep_alive(&self) -> Result<(), anyhow::Error> {
        self.send_request(&PeerRequest::KeepAlive).await
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, to: &PeerId, envelope: &Envelope) -> Result<(), anyhow::Error> {
        self.send_request(&PeerRequest::Message {
            receiver: to.clone(),
            envelope: envelope.clone(),
        })
        .await
    }

    async fn disconnect(&self) {
        if let Some(mut sink) = self.ws_sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!("Error closing websocket: {e}");
            }
        }
    }
}

/// Factory for relay connections over WebSocket.
pub struct WebSocketTransportFactory {
    config: ClientConfig,
}

impl WebSocketTransportFactory {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn with_url(relay_url: impl Into<String>) -> Self {
        Self::new(ClientConfig {
            relay_url: relay_url.into(),
            ..ClientConfig::default()
        })
    }
}

impl Default for WebSocketTransportFactory {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[async_trait]
impl TransportFactory for WebSocketTransportFactory {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        info!("Dialing {}", self.config.relay_url);
        let (client, _response) = tokio_tungstenite::connect_async(self.config.relay_url.as_str())
            .await
            .map_err(|e| anyhow!("WebSocket connect failed: {}", e))?;

        let (sink, stream) = client.split();
        let (event_tx, event_rx) = mpsc::channel(self.config.event_capacity);
        let transport = Arc::new(WebSocketTransport::new(sink));

        tokio::spawn(read_pump(stream, event_tx));
        tokio::spawn(keep_alive_loop(
            Arc::downgrade(&transport),
            self.config.keep_alive_interval(),
        ));

        Ok((transport as Arc<dyn Transport>, event_rx))
    }
}

async fn read_pump(mut stream: WsStream, event_tx: mpsc::Sender<TransportEvent>) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!("<-- {}", text.as_str());
                let notice: PeerNotice = match serde_json::from_str(text.as_str()) {
                    Ok(notice) => notice,
                    Err(e) => {
                        warn!("Ignoring malformed relay frame: {e}");
                        continue;
                    }
                };
                if event_tx.send(notice.into()).await.is_err() {
                    warn!("Event receiver dropped, closing read pump");
                    break;
                }
            }
            Some(Ok(Message::Close(_))) => {
                trace!("Received close frame");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("Error reading from websocket: {e}");
                break;
            }
            None => {
                trace!("Websocket stream ended");
                break;
            }
        }
    }

    let _ = event_tx.send(TransportEvent::Disconnected).await;
}

/// Sends a keepalive frame every `interval` until the transport is dropped
/// or its socket is closed.
async fn keep_alive_loop(transport: Weak<WebSocketTransport>, interval: Duration) {
    if interval.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(transport) = transport.upgrade() else {
            return;
        };
        if let Err(e) = transport.keep_alive().await {
            debug!("Not connected, exiting keepalive loop: {e}");
            return;
        }
        trace!("Keepalive sent");
    }
}
