//! Platform-agnostic building blocks of the peer-to-peer call protocol.
//!
//! Nothing in this crate performs I/O. The runtime crate wires these types to a
//! relay transport and a connectivity session.

pub mod envelope;
pub mod error;
pub mod events;
pub mod media;
pub mod peer;
pub mod state;

pub use envelope::{Candidate, Envelope, EventKind, Payload, SdpType, SessionDescription};
pub use error::ActionForbidden;
pub use events::{CallEvent, CoreEventBus, EventHandler};
pub use media::MediaStream;
pub use peer::PeerId;
pub use state::{CallDirection, CallStatus, Disposition, LocalAction};
