//! Errors of the pure call rules.

use crate::state::{CallStatus, LocalAction};
use thiserror::Error;

/// A local action was invoked in a status that does not permit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{action} is forbidden while {status}")]
pub struct ActionForbidden {
    pub action: LocalAction,
    pub status: CallStatus,
}

/// An envelope whose payload does not fit its event kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {kind} envelope: {reason}")]
pub struct MalformedEnvelope {
    pub kind: crate::envelope::EventKind,
    pub reason: &'static str,
}
