//! Pure transition rules of the call state machine.
//!
//! The runtime owns the call data; this module only answers "may this happen
//! now?" for local actions and inbound envelopes.

use crate::envelope::EventKind;
use crate::error::ActionForbidden;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the single call a peer may take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallStatus {
    #[default]
    Idle,
    /// We offered a call and wait for the answer.
    Calling,
    /// We were offered a call and wait for the local user.
    Receiving,
    Active,
}

impl CallStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn permits(&self, action: LocalAction) -> bool {
        match action {
            LocalAction::Call => matches!(self, Self::Idle),
            LocalAction::Accept | LocalAction::Reject => matches!(self, Self::Receiving),
            LocalAction::Terminate => matches!(self, Self::Calling | Self::Active),
            LocalAction::Disconnect => !self.is_idle(),
        }
    }

    pub fn check(self, action: LocalAction) -> Result<(), ActionForbidden> {
        if self.permits(action) {
            Ok(())
        } else {
            Err(ActionForbidden {
                action,
                status: self,
            })
        }
    }

    /// Decides what to do with an inbound envelope of `kind`.
    ///
    /// `from_interlocutor` tells whether the sender is the remote party of the
    /// current call; it is always false while idle.
    pub fn disposition(self, kind: EventKind, from_interlocutor: bool) -> Disposition {
        let accepted = match kind {
            EventKind::Offer => {
                return match self {
                    Self::Idle => Disposition::Accept,
                    // Same caller again: with in-order delivery only a duplicate of the
                    // offer in hand; answering busy would tear down the caller's live call.
                    Self::Receiving if from_interlocutor => Disposition::Stale,
                    _ => Disposition::Busy,
                };
            }
            // While calling, the interlocutor is the callee.
            EventKind::Answer | EventKind::CallRejection | EventKind::CallUnavailable => {
                matches!(self, Self::Calling) && from_interlocutor
            }
            // Termination also reaches a callee still ringing: the caller hung up.
            EventKind::CallTermination
            | EventKind::InterlocutorDisconnected
            | EventKind::IceCandidate => !self.is_idle() && from_interlocutor,
        };
        if accepted {
            Disposition::Accept
        } else {
            Disposition::Stale
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Calling => "calling",
            Self::Receiving => "receiving_call",
            Self::Active => "active_call",
        })
    }
}

/// Actions the local user can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalAction {
    Call,
    Accept,
    Reject,
    Terminate,
    Disconnect,
}

impl fmt::Display for LocalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Call => "call",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Terminate => "terminate",
            Self::Disconnect => "disconnect",
        })
    }
}

/// Outcome of checking an inbound envelope against the current call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accept,
    /// An offer while another call is in progress: answer `CallUnavailable`.
    Busy,
    /// Late, duplicated or foreign message; drop it silently. A repeated
    /// offer from the caller already ringing us lands here rather than in
    /// [`Disposition::Busy`], which would end that caller's live call.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}
