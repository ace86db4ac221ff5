//! Direct peer-to-peer calls signaled through a relay.
//!
//! The relay only routes opaque envelopes between peer ids; media flows
//! directly between the peers' connectivity sessions.

// Re-export core modules for compatibility
pub use callcore::{envelope, events, peer, state};

pub mod calls;
pub mod config;
pub mod relay;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use callcore::{
    ActionForbidden, CallEvent, CallStatus, Candidate, Envelope, EventHandler, EventKind,
    MediaStream, PeerId, SessionDescription,
};
pub use calls::{CallError, CallManager, CallSnapshot};
