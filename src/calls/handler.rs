//! Inbound side of the call manager: relay notifications and envelopes.

use super::manager::{CallManager, Inner, send_best_effort};
use super::session::ConnectivitySession;
use super::state::CallState;
use crate::transport::TransportEvent;
use callcore::{
    CallDirection, CallEvent, Disposition, Envelope, EventKind, PeerId, SessionDescription,
};
use log::{debug, info, warn};
use std::sync::Arc;

impl CallManager {
    /// Processes one notification from the relay connection.
    ///
    /// The transport pump started by [`CallManager::connect`] calls this for
    /// every event, one at a time and in order.
    pub async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::IdAssigned(id) => {
                info!("Relay assigned id {id}");
                self.inner.lock().await.local_id = Some(id.clone());
                self.event_bus.dispatch(&CallEvent::IdObtained(id));
            }
            TransportEvent::Message { from, envelope } => {
                self.handle_envelope(from, envelope).await;
            }
            TransportEvent::PeerUnreachable(peer_id) => {
                self.handle_peer_unreachable(peer_id).await;
            }
            TransportEvent::Disconnected => {
                self.handle_connection_lost().await;
            }
        }
    }

    async fn handle_envelope(self: &Arc<Self>, from: PeerId, envelope: Envelope) {
        debug!("<-- {} from {}", envelope.event, from);
        if let Err(e) = envelope.validate() {
            warn!("Dropping envelope from {from}: {e}");
            return;
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let status = inner.call.status();
        match status.disposition(envelope.event, inner.call.is_interlocutor(&from)) {
            Disposition::Accept => {}
            Disposition::Busy => {
                info!("Turning down call from {from}: already {status}");
                if let Some(transport) = &inner.transport {
                    send_best_effort(transport, &from, Envelope::call_unavailable()).await;
                }
                return;
            }
            Disposition::Stale => {
                debug!(
                    "Dropping stale {} from {} while {}",
                    envelope.event, from, status
                );
                return;
            }
        }

        match envelope.event {
            EventKind::Offer => {
                let Some(offer) = envelope.session_description().cloned() else {
                    return;
                };
                let Some(local_id) = inner.local_id.clone() else {
                    warn!("Offer from {from} arrived before we were named");
                    return;
                };
                let (session, events) = match self.session_factory().create_session() {
                    Ok(created) => created,
                    Err(e) => {
                        warn!("Cannot take call from {from}: {e}");
                        if let Some(transport) = &inner.transport {
                            send_best_effort(transport, &from, Envelope::call_unavailable())
                                .await;
                        }
                        return;
                    }
                };
                let epoch = inner.next_epoch();
                let leg = self.new_leg(
                    from.clone(),
                    local_id,
                    CallDirection::Incoming,
                    session.clone(),
                    events,
                    epoch,
                );
                inner.call = CallState::Receiving(leg);
                drop(guard);

                self.apply_offer(session, epoch, from, offer).await;
            }
            EventKind::Answer => {
                let (Some(answer), Some(leg)) =
                    (envelope.session_description().cloned(), inner.call.leg())
                else {
                    return;
                };
                let (session, epoch) = (leg.session.clone(), leg.epoch);
                inner.call.activate();
                drop(guard);

                self.apply_answer(session, epoch, from, answer).await;
            }
            EventKind::IceCandidate => {
                let (Some(candidate), Some(leg)) =
                    (envelope.candidate().cloned(), inner.call.leg())
                else {
                    return;
                };
                let session = leg.session.clone();
                drop(guard);

                if let Err(e) = session.add_remote_candidate(candidate).await {
                    warn!("Failed to add candidate from {from}: {e}");
                }
            }
            EventKind::CallRejection
            | EventKind::CallTermination
            | EventKind::CallUnavailable
            | EventKind::InterlocutorDisconnected => {
                if let Some(leg) = inner.call.take() {
                    leg.release();
                }
                info!("Call with {from} ended remotely ({})", envelope.event);
                let event = match envelope.event {
                    EventKind::CallRejection => CallEvent::CallRejection { callee_id: from },
                    EventKind::CallUnavailable => CallEvent::CallUnavailable { peer_id: from },
                    EventKind::InterlocutorDisconnected => {
                        CallEvent::InterlocutorDisconnected { peer_id: from }
                    }
                    _ => CallEvent::CallTermination { peer_id: from },
                };
                self.event_bus.dispatch(&event);
            }
        }
    }

    async fn apply_offer(
        &self,
        session: Arc<dyn ConnectivitySession>,
        epoch: u64,
        caller_id: PeerId,
        offer: SessionDescription,
    ) {
        if let Err(e) = session.apply_remote_description(offer).await {
            warn!("Failed to apply offer from {caller_id}: {e}");
            self.abandon(epoch, Some(Envelope::call_unavailable())).await;
            return;
        }

        let mut inner = self.inner.lock().await;
        if let Some(leg) = inner.call.current(epoch) {
            leg.offer_applied = true;
            info!("Incoming call from {caller_id}");
            self.event_bus.dispatch(&CallEvent::Call { caller_id });
        }
    }

    async fn apply_answer(
        &self,
        session: Arc<dyn ConnectivitySession>,
        epoch: u64,
        callee_id: PeerId,
        answer: SessionDescription,
    ) {
        if let Err(e) = session.apply_remote_description(answer).await {
            warn!("Failed to apply answer from {callee_id}: {e}");
            if self
                .abandon(epoch, Some(Envelope::call_termination()))
                .await
            {
                self.event_bus
                    .dispatch(&CallEvent::CallTermination { peer_id: callee_id });
            }
            return;
        }

        let inner = self.inner.lock().await;
        if inner.call.leg().is_some_and(|leg| leg.epoch == epoch) {
            info!("Call accepted by {callee_id}");
            self.event_bus
                .dispatch(&CallEvent::CallAcceptance { callee_id });
        }
    }

    async fn handle_peer_unreachable(&self, peer_id: PeerId) {
        let mut inner = self.inner.lock().await;
        match &inner.call {
            CallState::Calling(leg) if leg.callee_id == peer_id => {}
            _ => {
                debug!("Ignoring unreachable {peer_id}: not the callee we are calling");
                return;
            }
        }
        if let Some(leg) = inner.call.take() {
            leg.release();
        }
        info!("{peer_id} is not connected to the relay");
        self.event_bus
            .dispatch(&CallEvent::InterlocutorNotFound { peer_id });
    }

    async fn handle_connection_lost(&self) {
        let mut inner = self.inner.lock().await;
        self.lose_connection(&mut inner);
    }

    /// The event stream of connection `generation` ended. Adapters are not
    /// required to send [`TransportEvent::Disconnected`] first, so the loss is
    /// reported here unless it already was or a newer connection took over.
    pub(crate) async fn handle_stream_end(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.transport.is_none() {
            return;
        }
        self.lose_connection(&mut inner);
    }

    fn lose_connection(&self, inner: &mut Inner) {
        inner.transport = None;
        inner.local_id = None;
        if let Some(leg) = inner.call.take() {
            warn!(
                "Relay connection lost during call with {}",
                leg.interlocutor()
            );
            leg.release();
        } else {
            warn!("Relay connection lost");
        }
        self.event_bus.dispatch(&CallEvent::ConnectionLost);
    }
}
