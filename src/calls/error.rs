//! Call-related error types.

use callcore::ActionForbidden;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    ActionForbidden(#[from] ActionForbidden),

    #[error("not connected to the relay")]
    NotConnected,

    #[error("already connected to the relay")]
    AlreadyConnected,

    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),

    #[error("session error: {0}")]
    Session(#[source] anyhow::Error),
}
