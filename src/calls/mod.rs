//! Call signaling between two peers through a relay.
//!
//! # Architecture
//!
//! - [`CallManager`]: the per-peer state machine; turns local actions and
//!   relayed envelopes into the `Idle → Calling/Receiving → Active → Idle`
//!   lifecycle and emits [`callcore::CallEvent`]s
//! - [`ConnectivitySession`] & [`SessionFactory`]: the media negotiation the
//!   manager drives through offer/answer and candidate trickling
//! - [`CallSnapshot`]: read-only view of the call for callers and tests
//!
//! # Protocol Overview
//!
//! The caller sends an `Offer` carrying its session description. The callee
//! answers with `Answer`, `CallRejection` or, when it already has a call,
//! `CallUnavailable`. Either side may end the call with `CallTermination` or
//! `InterlocutorDisconnected`. Candidates travel as `IceCandidate` once the
//! sender's description is out. Envelopes that do not match the current call
//! and sender are dropped.

mod error;
mod handler;
mod manager;
mod session;
mod state;


pub use error::CallError;
pub use manager::CallManager;
pub use session::{ConnectivitySession, SessionEvent, SessionFactory};
pub use state::CallSnapshot;
