//! In-process relay.
//!
//! Every transport created from the same [`MemoryRelay`] can reach the others
//! by id. Delivery is in order per connection and at most once: when a
//! peer's inbox is full the envelope is dropped.

use crate::transport::{Transport, TransportEvent, TransportFactory};
use anyhow::anyhow;
use async_trait::async_trait;
use callcore::{Envelope, PeerId};
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

const INBOX_CAPACITY: usize = 100;

pub struct MemoryRelay {
    this: Weak<MemoryRelay>,
    peers: DashMap<PeerId, mpsc::Sender<TransportEvent>>,
    inbox_capacity: usize,
}

impl MemoryRelay {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(INBOX_CAPACITY)
    }

    pub fn with_capacity(inbox_capacity: usize) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            peers: DashMap::new(),
            inbox_capacity,
        })
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Drops the connection of `peer_id` as if its network went away.
    ///
    /// The peer's event stream gets `Disconnected` if its inbox has room and
    /// ends right after either way.
    pub fn disconnect_peer(&self, peer_id: &PeerId) {
        let Some((_, inbox)) = self.peers.remove(peer_id) else {
            return;
        };
        info!("Peer {peer_id} disconnected");
        if let Err(e) = inbox.try_send(TransportEvent::Disconnected) {
            debug!("Peer {peer_id} only sees its stream end: {e}");
        }
    }

    fn route(&self, sender: &PeerId, receiver: &PeerId, envelope: Envelope) {
        let event = TransportEvent::Message {
            from: sender.clone(),
            envelope,
        };
        if !self.deliver(receiver, event) {
            debug!("Receiver {receiver} not found, telling {sender}");
            self.deliver(sender, TransportEvent::PeerUnreachable(receiver.clone()));
        }
    }

    /// Returns false if `peer_id` is not connected.
    fn deliver(&self, peer_id: &PeerId, event: TransportEvent) -> bool {
        let result = match self.peers.get(peer_id) {
            Some(inbox) => inbox.try_send(event),
            None => return false,
        };
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Inbox of {peer_id} is full, dropping event");
                true
            }
            Err(TrySendError::Closed(_)) => {
                self.peers.remove(peer_id);
                false
            }
        }
    }
}

struct MemoryTransport {
    id: PeerId,
    relay: Arc<MemoryRelay>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, to: &PeerId, envelope: &Envelope) -> Result<(), anyhow::Error> {
        if !self.relay.is_connected(&self.id) {
            return Err(anyhow!("connection {} is closed", self.id));
        }
        self.relay.route(&self.id, to, envelope.clone());
        Ok(())
    }

    async fn disconnect(&self) {
        self.relay.disconnect_peer(&self.id);
    }
}

#[async_trait]
impl TransportFactory for MemoryRelay {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        let relay = self
            .this
            .upgrade()
            .ok_or_else(|| anyhow!("relay is shutting down"))?;

        let id = PeerId::generate();
        let (inbox, events) = mpsc::channel(self.inbox_capacity);
        inbox.try_send(TransportEvent::IdAssigned(id.clone()))?;
        self.peers.insert(id.clone(), inbox);
        info!("Peer {id} connected");

        let transport: Arc<dyn Transport> = Arc::new(MemoryTransport { id, relay });
        Ok((transport, events))
    }
}
