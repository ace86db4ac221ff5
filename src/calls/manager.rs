//! Call manager: the signaling state machine of one peer.
//!
//! Every transition happens under `inner`'s lock and is committed before any
//! session work is awaited. The lock is never held across a session call, so
//! after each such `await` the manager checks that the call it was working on
//! (identified by its epoch) is still the current one and gives up quietly
//! otherwise. Envelopes are sent while holding the lock, which keeps their
//! order on the wire identical to the order of the transitions.

use super::error::CallError;
use super::session::{ConnectivitySession, SessionEvent, SessionFactory};
use super::state::{CallLeg, CallSnapshot, CallState};
use crate::transport::{Transport, TransportFactory};
use callcore::{
    ActionForbidden, CallDirection, CallEvent, CallStatus, CoreEventBus, Envelope, EventHandler,
    LocalAction, PeerId, SessionDescription,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

#[derive(Default)]
pub(crate) struct Inner {
    pub local_id: Option<PeerId>,
    pub transport: Option<Arc<dyn Transport>>,
    pub call: CallState,
    last_epoch: u64,
    /// Tags the transport pump of the current relay connection.
    pub generation: u64,
}

impl Inner {
    pub fn next_epoch(&mut self) -> u64 {
        self.last_epoch += 1;
        self.last_epoch
    }

    fn connection(&self) -> Result<(PeerId, Arc<dyn Transport>), CallError> {
        match (&self.local_id, &self.transport) {
            (Some(local_id), Some(transport)) => Ok((local_id.clone(), transport.clone())),
            _ => Err(CallError::NotConnected),
        }
    }
}

/// Drives one peer's side of a call.
pub struct CallManager {
    transport_factory: Arc<dyn TransportFactory>,
    session_factory: Arc<dyn SessionFactory>,
    pub(crate) event_bus: CoreEventBus,
    pub(crate) inner: Mutex<Inner>,
}

impl CallManager {
    pub fn new(
        transport_factory: Arc<dyn TransportFactory>,
        session_factory: Arc<dyn SessionFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport_factory,
            session_factory,
            event_bus: CoreEventBus::new(),
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.event_bus.add_handler(handler);
    }

    pub fn event_bus(&self) -> &CoreEventBus {
        &self.event_bus
    }

    pub(crate) fn session_factory(&self) -> &Arc<dyn SessionFactory> {
        &self.session_factory
    }

    pub async fn status(&self) -> CallStatus {
        self.inner.lock().await.call.status()
    }

    pub async fn snapshot(&self) -> CallSnapshot {
        self.inner.lock().await.call.snapshot()
    }

    /// Our relay-assigned id, once the relay has named us.
    pub async fn local_id(&self) -> Option<PeerId> {
        self.inner.lock().await.local_id.clone()
    }

    /// Opens the relay connection.
    ///
    /// The id arrives later as [`CallEvent::IdObtained`]. After the connection
    /// is lost this may be called again; the relay then names us anew.
    pub async fn connect(self: &Arc<Self>) -> Result<(), CallError> {
        if self.inner.lock().await.transport.is_some() {
            return Err(CallError::AlreadyConnected);
        }

        let (transport, mut events) = self
            .transport_factory
            .create_transport()
            .await
            .map_err(CallError::Transport)?;

        let generation = {
            let mut inner = self.inner.lock().await;
            if inner.transport.is_some() {
                drop(inner);
                transport.disconnect().await;
                return Err(CallError::AlreadyConnected);
            }
            inner.transport = Some(transport);
            inner.generation += 1;
            inner.generation
        };

        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                if manager.inner.lock().await.generation != generation {
                    debug!("Dropping event of a replaced connection");
                    return;
                }
                manager.handle_transport_event(event).await;
            }
            debug!("Transport event stream ended");
            if let Some(manager) = manager.upgrade() {
                manager.handle_stream_end(generation).await;
            }
        });
        Ok(())
    }

    /// Starts a call to `callee_id`.
    pub async fn call(self: &Arc<Self>, callee_id: PeerId) -> Result<(), CallError> {
        let (session, epoch) = {
            let mut inner = self.inner.lock().await;
            inner.call.status().check(LocalAction::Call)?;
            let (local_id, _) = inner.connection()?;
            let (session, events) = self
                .session_factory
                .create_session()
                .map_err(CallError::Session)?;
            let epoch = inner.next_epoch();
            let leg = self.new_leg(
                local_id,
                callee_id.clone(),
                CallDirection::Outgoing,
                session.clone(),
                events,
                epoch,
            );
            inner.call = CallState::Calling(leg);
            (session, epoch)
        };
        info!("Calling {callee_id}");

        let offer = match self
            .create_local_description(&session, epoch, CallDirection::Outgoing)
            .await
        {
            Ok(Some(offer)) => offer,
            Ok(None) => {
                debug!("Call to {callee_id} ended before the offer was ready");
                return Ok(());
            }
            Err(e) => {
                self.abandon(epoch, None).await;
                return Err(e);
            }
        };

        match self.signal(epoch, Envelope::offer(offer)).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!("Call to {callee_id} ended before the offer was sent");
                Ok(())
            }
            Err(e) => {
                self.abandon(epoch, None).await;
                Err(e)
            }
        }
    }

    /// Accepts the call we are being offered.
    ///
    /// Forbidden until the offer has been applied, i.e. before
    /// [`CallEvent::Call`] was emitted.
    pub async fn accept(&self) -> Result<(), CallError> {
        let (session, epoch, caller_id) = {
            let mut inner = self.inner.lock().await;
            let leg = inner.call.guard(LocalAction::Accept)?;
            if !leg.offer_applied {
                return Err(ActionForbidden {
                    action: LocalAction::Accept,
                    status: CallStatus::Receiving,
                }
                .into());
            }
            let taken = (leg.session.clone(), leg.epoch, leg.caller_id.clone());
            inner.call.activate();
            taken
        };
        info!("Accepting call from {caller_id}");

        let answer = match self
            .create_local_description(&session, epoch, CallDirection::Incoming)
            .await
        {
            Ok(Some(answer)) => answer,
            Ok(None) => return Ok(()),
            Err(e) => {
                self.abandon(epoch, Some(Envelope::call_termination())).await;
                return Err(e);
            }
        };

        match self.signal(epoch, Envelope::answer(answer)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.abandon(epoch, Some(Envelope::call_termination())).await;
                Err(e)
            }
        }
    }

    /// Turns down the call we are being offered.
    pub async fn reject(&self) -> Result<(), CallError> {
        self.hang_up(LocalAction::Reject, Envelope::call_rejection())
            .await
    }

    /// Ends the call we started or are taking part in.
    pub async fn terminate(&self) -> Result<(), CallError> {
        self.hang_up(LocalAction::Terminate, Envelope::call_termination())
            .await
    }

    /// Leaves whatever call is in progress, e.g. because the user is going
    /// away. Telling the interlocutor is best-effort.
    pub async fn disconnect(&self) -> Result<(), CallError> {
        match self
            .hang_up(LocalAction::Disconnect, Envelope::interlocutor_disconnected())
            .await
        {
            Err(CallError::ActionForbidden(e)) => Err(e.into()),
            Err(e) => {
                warn!("Could not tell interlocutor about disconnect: {e}");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    async fn hang_up(&self, action: LocalAction, envelope: Envelope) -> Result<(), CallError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.call.guard(action)?;
        let Some(leg) = inner.call.take() else {
            return Ok(());
        };
        let interlocutor = leg.interlocutor().clone();
        leg.release();
        info!("Call with {interlocutor} ended locally ({action})");

        let transport = inner.transport.as_ref().ok_or(CallError::NotConnected)?;
        send(transport, &interlocutor, envelope).await
    }

    pub(crate) fn new_leg(
        self: &Arc<Self>,
        caller_id: PeerId,
        callee_id: PeerId,
        direction: CallDirection,
        session: Arc<dyn ConnectivitySession>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        epoch: u64,
    ) -> CallLeg {
        let manager = Arc::downgrade(self);
        let session_pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.handle_session_event(epoch, event).await;
            }
        });

        CallLeg {
            caller_id,
            callee_id,
            direction,
            session,
            session_pump,
            epoch,
            started_at: Utc::now(),
            signaled: false,
            pending_candidates: Vec::new(),
            offer_applied: false,
        }
    }

    /// Creates and applies our offer (outgoing) or answer (incoming).
    ///
    /// `Ok(None)` means call `epoch` ended while we were waiting.
    async fn create_local_description(
        &self,
        session: &Arc<dyn ConnectivitySession>,
        epoch: u64,
        direction: CallDirection,
    ) -> Result<Option<SessionDescription>, CallError> {
        let description = match direction {
            CallDirection::Outgoing => session.create_offer().await,
            CallDirection::Incoming => session.create_answer().await,
        }
        .map_err(CallError::Session)?;
        if !self.is_current(epoch).await {
            return Ok(None);
        }

        session
            .apply_local_description(description.clone())
            .await
            .map_err(CallError::Session)?;
        if !self.is_current(epoch).await {
            return Ok(None);
        }
        Ok(Some(description))
    }

    /// Sends our description for call `epoch`, followed by the candidates
    /// gathered while it was being prepared.
    ///
    /// Returns false if the call is already over.
    async fn signal(&self, epoch: u64, envelope: Envelope) -> Result<bool, CallError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(leg) = inner.call.current(epoch) else {
            return Ok(false);
        };
        let transport = inner.transport.as_ref().ok_or(CallError::NotConnected)?;
        let interlocutor = leg.interlocutor().clone();

        send(transport, &interlocutor, envelope).await?;
        leg.signaled = true;
        let pending = std::mem::take(&mut leg.pending_candidates);
        if !pending.is_empty() {
            debug!("Flushing {} buffered candidates", pending.len());
        }
        for candidate in pending {
            send_best_effort(transport, &interlocutor, Envelope::ice_candidate(candidate)).await;
        }
        Ok(true)
    }

    pub(crate) async fn is_current(&self, epoch: u64) -> bool {
        self.inner
            .lock()
            .await
            .call
            .leg()
            .is_some_and(|leg| leg.epoch == epoch)
    }

    /// Ends call `epoch` after a failure, optionally telling the interlocutor.
    ///
    /// Returns false if that call had already ended.
    pub(crate) async fn abandon(&self, epoch: u64, notice: Option<Envelope>) -> bool {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.call.current(epoch).is_none() {
            return false;
        }
        let Some(leg) = inner.call.take() else {
            return false;
        };
        let interlocutor = leg.interlocutor().clone();
        leg.release();
        warn!("Abandoned call with {interlocutor}");

        if let (Some(notice), Some(transport)) = (notice, &inner.transport) {
            send_best_effort(transport, &interlocutor, notice).await;
        }
        true
    }

    async fn handle_session_event(&self, epoch: u64, event: SessionEvent) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(leg) = inner.call.current(epoch) else {
            debug!("Dropping session event of a finished call");
            return;
        };

        match event {
            SessionEvent::LocalCandidate(candidate) => {
                if !leg.signaled {
                    leg.pending_candidates.push(candidate);
                    return;
                }
                let interlocutor = leg.interlocutor().clone();
                if let Some(transport) = &inner.transport {
                    send_best_effort(transport, &interlocutor, Envelope::ice_candidate(candidate))
                        .await;
                }
            }
            SessionEvent::LocalStream(stream) => {
                self.event_bus.dispatch(&CallEvent::OutgoingVideo(stream));
            }
            SessionEvent::RemoteStream(stream) => {
                debug!("Remote media arrived (stream {})", stream.id);
                self.event_bus.dispatch(&CallEvent::IncomingVideo(stream));
            }
        }
    }
}

impl Drop for CallManager {
    fn drop(&mut self) {
        if let Some(leg) = self.inner.get_mut().call.take() {
            leg.release();
        }
    }
}

pub(crate) async fn send(
    transport: &Arc<dyn Transport>,
    to: &PeerId,
    envelope: Envelope,
) -> Result<(), CallError> {
    debug!("--> {} to {}", envelope.event, to);
    transport
        .send(to, &envelope)
        .await
        .map_err(CallError::Transport)
}

pub(crate) async fn send_best_effort(
    transport: &Arc<dyn Transport>,
    to: &PeerId,
    envelope: Envelope,
) {
    let kind = envelope.event;
    if let Err(e) = send(transport, to, envelope).await {
        warn!("Failed to send {kind} to {to}: {e}");
    }
}
