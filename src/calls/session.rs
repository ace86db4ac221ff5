//! Connectivity session contract.
//!
//! A session wraps one media negotiation (offer/answer plus trickled
//! candidates) with the remote peer. The call core drives it but never looks
//! into descriptions or candidates.

use async_trait::async_trait;
use callcore::{Candidate, MediaStream, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Notifications a session produces on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Local capture succeeded and the stream is attached to the session.
    LocalStream(MediaStream),
    /// A local candidate was gathered; it must reach the remote peer.
    LocalCandidate(Candidate),
    /// The remote peer's media arrived.
    RemoteStream(MediaStream),
}

/// One media negotiation.
///
/// `create_offer`/`create_answer` are called at most once per session,
/// matching the local role, and each description is applied at most once per
/// direction. Candidates may be added before the remote description; buffering
/// them is the session's business.
#[async_trait]
pub trait ConnectivitySession: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, anyhow::Error>;

    async fn create_answer(&self) -> Result<SessionDescription, anyhow::Error>;

    async fn apply_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), anyhow::Error>;

    async fn apply_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), anyhow::Error>;

    async fn add_remote_candidate(&self, candidate: Candidate) -> Result<(), anyhow::Error>;

    /// Frees all resources. Must be safe to call at any point, including
    /// before negotiation completed.
    fn close(&self);
}

/// Creates a fresh session for every call.
pub trait SessionFactory: Send + Sync {
    fn create_session(
        &self,
    ) -> Result<
        (
            Arc<dyn ConnectivitySession>,
            mpsc::UnboundedReceiver<SessionEvent>,
        ),
        anyhow::Error,
    >;
}
