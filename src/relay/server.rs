//! WebSocket relay server.
//!
//! Each connection is named with a fresh id, announced to it as the first
//! frame. `Message` requests are forwarded to the receiver as-is; if the
//! receiver is not connected the sender gets `ReceiverNotFound` instead.

use super::error::RelayError;
use super::protocol::{RawNotice, RawRequest, RelayRequest};
use crate::config::RelayConfig;
use callcore::PeerId;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;

/// Outgoing frame queues of the connected peers.
type Peers = Arc<DashMap<PeerId, mpsc::Sender<String>>>;

pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
    peers: Peers,
}

impl RelayServer {
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        Ok(Self {
            listener,
            config,
            peers: Arc::new(DashMap::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> Result<(), RelayError> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            debug!("Accepted TCP connection from {addr}");
            let peers = self.peers.clone();
            let capacity = self.config.inbox_capacity;
            tokio::spawn(async move {
                if let Err(e) = serve_peer(stream, peers, capacity).await {
                    warn!("Connection from {addr} failed: {e}");
                }
            });
        }
    }
}

async fn serve_peer(stream: TcpStream, peers: Peers, capacity: usize) -> Result<(), RelayError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    let (outbox, mut frames) = mpsc::channel::<String>(capacity);
    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sink.send(Message::text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let peer_id = PeerId::generate();
    outbox
        .send(RawNotice::IdAssigned(peer_id.clone()).encode()?)
        .await
        .map_err(|_| RelayError::Closed)?;
    peers.insert(peer_id.clone(), outbox.clone());
    info!("Peer {peer_id} connected");

    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => forward(&peers, &peer_id, &outbox, text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Error reading from {peer_id}: {e}");
                break;
            }
        }
    }

    peers.remove(&peer_id);
    drop(outbox);
    let _ = writer.await;
    info!("Peer {peer_id} disconnected");
    Ok(())
}

fn forward(peers: &Peers, sender: &PeerId, outbox: &mpsc::Sender<String>, frame: &str) {
    let request: RawRequest = match serde_json::from_str(frame) {
        Ok(request) => request,
        Err(e) => {
            warn!("Ignoring malformed frame from {sender}: {e}");
            return;
        }
    };

    let RelayRequest::Message { receiver, envelope } = request else {
        trace!("Keepalive from {sender}");
        return;
    };

    let notice = RawNotice::Message {
        sender: sender.clone(),
        envelope,
    };
    let frame = match notice.encode() {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Cannot encode frame for {receiver}: {e}");
            return;
        }
    };

    let result = match peers.get(&receiver) {
        Some(inbox) => inbox.try_send(frame),
        None => Err(TrySendError::Closed(frame)),
    };
    match result {
        Ok(()) => debug!("Forwarded frame {sender} -> {receiver}"),
        Err(TrySendError::Full(_)) => warn!("Outbox of {receiver} is full, dropping frame"),
        Err(TrySendError::Closed(_)) => {
            debug!("Receiver {receiver} not found, telling {sender}");
            match RawNotice::ReceiverNotFound(receiver).encode() {
                Ok(notice) => {
                    let _ = outbox.try_send(notice);
                }
                Err(e) => warn!("Cannot encode frame for {sender}: {e}"),
            }
        }
    }
}
