use crate::media::MediaStream;
use crate::peer::PeerId;
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Lifecycle notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CallEvent {
    /// The relay assigned us an id.
    IdObtained(PeerId),
    /// Somebody is calling us.
    Call { caller_id: PeerId },
    CallAcceptance { callee_id: PeerId },
    CallRejection { callee_id: PeerId },
    CallTermination { peer_id: PeerId },
    CallUnavailable { peer_id: PeerId },
    /// The callee was not connected to the relay when the offer was sent.
    InterlocutorNotFound { peer_id: PeerId },
    InterlocutorDisconnected { peer_id: PeerId },
    IncomingVideo(MediaStream),
    OutgoingVideo(MediaStream),
    /// Our own relay connection dropped.
    ConnectionLost,
}

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &CallEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&CallEvent) + Send + Sync,
{
    fn handle_event(&self, event: &CallEvent) {
        self(event)
    }
}

#[derive(Default, Clone)]
pub struct CoreEventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl CoreEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .expect("RwLock should not be poisoned")
            .push(handler);
    }

    /// Returns true if there are any event handlers registered.
    pub fn has_handlers(&self) -> bool {
        !self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .is_empty()
    }

    pub fn dispatch(&self, event: &CallEvent) {
        // Snapshot so a handler may register another one without deadlocking.
        let handlers = self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .clone();
        for handler in handlers {
            handler.handle_event(event);
        }
    }
}

impl std::fmt::Debug for CoreEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreEventBus")
            .field("has_handlers", &self.has_handlers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn dispatches_to_every_handler_in_order() {
        let bus = CoreEventBus::new();
        assert!(!bus.has_handlers());

        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            bus.add_handler(Arc::new(move |event: &CallEvent| {
                seen.lock().unwrap().push((tag, event.clone()));
            }));
        }
        assert!(bus.has_handlers());

        bus.dispatch(&CallEvent::IdObtained(PeerId::from("me")));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "first");
        assert_eq!(seen[1].0, "second");
        assert_eq!(seen[1].1, CallEvent::IdObtained(PeerId::from("me")));
    }
}
