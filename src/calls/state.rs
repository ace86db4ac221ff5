//! Call data owned by the manager.

use super::session::ConnectivitySession;
use callcore::{ActionForbidden, Candidate, CallDirection, CallStatus, LocalAction, PeerId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One call in progress, from either side.
pub(crate) struct CallLeg {
    pub caller_id: PeerId,
    pub callee_id: PeerId,
    pub direction: CallDirection,
    pub session: Arc<dyn ConnectivitySession>,
    /// Pumps the session's events into the manager.
    pub session_pump: JoinHandle<()>,
    /// Distinguishes this call from any earlier or later one.
    pub epoch: u64,
    pub started_at: DateTime<Utc>,
    /// Our offer/answer went out; candidates may follow it.
    pub signaled: bool,
    pub pending_candidates: Vec<Candidate>,
    /// Incoming only: the caller's offer is in the session, so we may answer.
    pub offer_applied: bool,
}

impl CallLeg {
    pub fn interlocutor(&self) -> &PeerId {
        match self.direction {
            CallDirection::Outgoing => &self.callee_id,
            CallDirection::Incoming => &self.caller_id,
        }
    }

    /// Detaches the session listener and frees the session.
    pub fn release(self) {
        self.session_pump.abort();
        self.session.close();
    }
}

impl std::fmt::Debug for CallLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallLeg")
            .field("caller_id", &self.caller_id)
            .field("callee_id", &self.callee_id)
            .field("direction", &self.direction)
            .field("epoch", &self.epoch)
            .field("signaled", &self.signaled)
            .field("offer_applied", &self.offer_applied)
            .field("pending_candidates", &self.pending_candidates.len())
            .finish()
    }
}

/// The call as a tagged union; idle carries no data at all.
#[derive(Debug, Default)]
pub(crate) enum CallState {
    #[default]
    Idle,
    Calling(CallLeg),
    Receiving(CallLeg),
    Active(CallLeg),
}

impl CallState {
    pub fn status(&self) -> CallStatus {
        match self {
            Self::Idle => CallStatus::Idle,
            Self::Calling(_) => CallStatus::Calling,
            Self::Receiving(_) => CallStatus::Receiving,
            Self::Active(_) => CallStatus::Active,
        }
    }

    pub fn leg(&self) -> Option<&CallLeg> {
        match self {
            Self::Idle => None,
            Self::Calling(leg) | Self::Receiving(leg) | Self::Active(leg) => Some(leg),
        }
    }

    pub fn leg_mut(&mut self) -> Option<&mut CallLeg> {
        match self {
            Self::Idle => None,
            Self::Calling(leg) | Self::Receiving(leg) | Self::Active(leg) => Some(leg),
        }
    }

    /// Checks that `action` is allowed now and returns the call it acts on.
    ///
    /// Only meaningful for actions on an existing call (everything but
    /// [`LocalAction::Call`]).
    pub fn guard(&mut self, action: LocalAction) -> Result<&mut CallLeg, ActionForbidden> {
        let status = self.status();
        status.check(action)?;
        self.leg_mut().ok_or(ActionForbidden { action, status })
    }

    /// The leg of the call started with `epoch`, if that call is still on.
    pub fn current(&mut self, epoch: u64) -> Option<&mut CallLeg> {
        self.leg_mut().filter(|leg| leg.epoch == epoch)
    }

    pub fn is_interlocutor(&self, peer_id: &PeerId) -> bool {
        self.leg().is_some_and(|leg| leg.interlocutor() == peer_id)
    }

    /// Resets to idle and hands back the leg that was in progress.
    pub fn take(&mut self) -> Option<CallLeg> {
        match std::mem::take(self) {
            Self::Idle => None,
            Self::Calling(leg) | Self::Receiving(leg) | Self::Active(leg) => Some(leg),
        }
    }

    /// Moves the call in progress to `Active`.
    pub fn activate(&mut self) {
        if let Some(leg) = self.take() {
            *self = Self::Active(leg);
        }
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let leg = self.leg();
        CallSnapshot {
            status: self.status(),
            caller_id: leg.map(|leg| leg.caller_id.clone()),
            callee_id: leg.map(|leg| leg.callee_id.clone()),
            has_session: leg.is_some(),
            started_at: leg.map(|leg| leg.started_at),
        }
    }
}

/// Read-only view of the call for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSnapshot {
    pub status: CallStatus,
    pub caller_id: Option<PeerId>,
    pub callee_id: Option<PeerId>,
    pub has_session: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl CallSnapshot {
    /// Idle if and only if nobody and no session is attached.
    pub fn is_consistent(&self) -> bool {
        let empty = self.caller_id.is_none() && self.callee_id.is_none() && !self.has_session;
        let full = self.caller_id.is_some() && self.callee_id.is_some() && self.has_session;
        if self.status.is_idle() { empty } else { full }
    }
}
