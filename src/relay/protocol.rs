//! Frames exchanged between relay clients and the WebSocket relay.
//!
//! Client → relay:
//! - `{"Message": {"receiver": "<id>", "envelope": {...}}}`
//! - `"KeepAlive"`
//!
//! Relay → client:
//! - `{"IdAssigned": "<id>"}`
//! - `{"Message": {"sender": "<id>", "envelope": {...}}}`
//! - `{"ReceiverNotFound": "<id>"}`
//!
//! Frames are generic over the envelope so the relay can forward it as raw
//! JSON without understanding it.

use crate::transport::TransportEvent;
use callcore::{Envelope, PeerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelayRequest<E> {
    Message { receiver: PeerId, envelope: E },
    KeepAlive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelayNotice<E> {
    IdAssigned(PeerId),
    Message { sender: PeerId, envelope: E },
    ReceiverNotFound(PeerId),
}

/// Request as a peer builds it.
pub type PeerRequest = RelayRequest<Envelope>;
/// Notice as a peer reads it.
pub type PeerNotice = RelayNotice<Envelope>;
/// Request as the relay reads it: the envelope stays uninterpreted.
pub type RawRequest = RelayRequest<serde_json::Value>;
pub type RawNotice = RelayNotice<serde_json::Value>;

impl<E: Serialize> RelayRequest<E> {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<E: Serialize> RelayNotice<E> {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<PeerNotice> for TransportEvent {
    fn from(notice: PeerNotice) -> Self {
        match notice {
            RelayNotice::IdAssigned(id) => TransportEvent::IdAssigned(id),
            RelayNotice::Message { sender, envelope } => TransportEvent::Message {
                from: sender,
                envelope,
            },
            RelayNotice::ReceiverNotFound(id) => TransportEvent::PeerUnreachable(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callcore::SessionDescription;

    #[test]
    fn relay_forwards_envelope_without_parsing_it() {
        let request = PeerRequest::Message {
            receiver: PeerId::from("b"),
            envelope: Envelope::offer(SessionDescription::offer("v=0")),
        };
        let raw: RawRequest = serde_json::from_str(&request.encode().unwrap()).unwrap();
        let RelayRequest::Message { receiver, envelope } = raw else {
            panic!("expected a message");
        };
        assert_eq!(receiver, PeerId::from("b"));

        let notice = RawNotice::Message {
            sender: PeerId::from("a"),
            envelope,
        };
        let parsed: PeerNotice = serde_json::from_str(&notice.encode().unwrap()).unwrap();
        assert_eq!(
            TransportEvent::from(parsed),
            TransportEvent::Message {
                from: PeerId::from("a"),
                envelope: Envelope::offer(SessionDescription::offer("v=0")),
            }
        );
    }

    #[test]
    fn unknown_envelope_kinds_still_route() {
        let raw: RawRequest =
            serde_json::from_str(r#"{"Message":{"receiver":"b","envelope":{"event":"future"}}}"#)
                .unwrap();
        assert!(matches!(raw, RelayRequest::Message { .. }));
    }

    #[test]
    fn keep_alive_is_a_bare_string() {
        assert_eq!(PeerRequest::KeepAlive.encode().unwrap(), "\"KeepAlive\"");
    }

    #[test]
    fn receiver_not_found_maps_to_unreachable() {
        let notice: PeerNotice = serde_json::from_str(r#"{"ReceiverNotFound":"ghost"}"#).unwrap();
        assert_eq!(
            TransportEvent::from(notice),
            TransportEvent::PeerUnreachable(PeerId::from("ghost"))
        );
    }
}
