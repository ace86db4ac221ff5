//! Transport adapter between the call core and a relay.
//!
//! A transport is one connection to a relay. Envelopes go out through
//! [`Transport::send`]; everything the relay tells us arrives, in order, on the
//! event receiver returned next to the transport.

use async_trait::async_trait;
use callcore::{Envelope, PeerId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// An event produced by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The relay accepted the connection and named us.
    IdAssigned(PeerId),
    /// An envelope addressed to us.
    Message { from: PeerId, envelope: Envelope },
    /// An envelope we sent could not be delivered: the receiver is not
    /// connected.
    PeerUnreachable(PeerId),
    /// The connection was lost.
    Disconnected,
}

/// Represents an active relay connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hands an envelope to the relay. Fire-and-forget: success only means
    /// the relay got it, undeliverable envelopes come back as
    /// [`TransportEvent::PeerUnreachable`].
    async fn send(&self, to: &PeerId, envelope: &Envelope) -> Result<(), anyhow::Error>;

    /// Closes the connection.
    async fn disconnect(&self);
}

/// A factory responsible for creating new transport instances.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Creates a new transport and returns it, along with a stream of events.
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records every envelope instead of sending it.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Mutex<Vec<(PeerId, Envelope)>>,
    }

    impl MockTransport {
        pub fn sent(&self) -> Vec<(PeerId, Envelope)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, to: &PeerId, envelope: &Envelope) -> Result<(), anyhow::Error> {
            self.sent.lock().unwrap().push((to.clone(), envelope.clone()));
            Ok(())
        }

        async fn disconnect(&self) {}
    }

    /// Hands out one shared [`MockTransport`] that announces `local_id`.
    ///
    /// The event stream of every connection stays open until
    /// [`MockTransportFactory::close_stream`] is called for it.
    pub struct MockTransportFactory {
        pub transport: Arc<MockTransport>,
        pub local_id: PeerId,
        streams: Mutex<Vec<Option<mpsc::Sender<TransportEvent>>>>,
    }

    impl MockTransportFactory {
        pub fn new(local_id: impl Into<PeerId>) -> Self {
            Self {
                transport: Arc::new(MockTransport::default()),
                local_id: local_id.into(),
                streams: Mutex::default(),
            }
        }

        /// Pushes `event` on the stream of the `index`-th connection.
        pub fn push(&self, index: usize, event: TransportEvent) {
            let streams = self.streams.lock().unwrap();
            if let Some(Some(tx)) = streams.get(index) {
                tx.try_send(event).unwrap();
            }
        }

        /// Ends the stream of the `index`-th connection without a
        /// `Disconnected` event.
        pub fn close_stream(&self, index: usize) {
            if let Some(stream) = self.streams.lock().unwrap().get_mut(index) {
                stream.take();
            }
        }
    }

    #[async_trait]
    impl TransportFactory for MockTransportFactory {
        async fn create_transport(
            &self,
        ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
            let (tx, rx) = mpsc::channel(8);
            tx.try_send(TransportEvent::IdAssigned(self.local_id.clone()))?;
            self.streams.lock().unwrap().push(Some(tx));
            let transport: Arc<dyn Transport> = self.transport.clone();
            Ok((transport, rx))
        }
    }
}
