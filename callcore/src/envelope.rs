//! Signaling envelopes exchanged between two peers through the relay.
//!
//! The relay never looks inside an envelope. Both ends agree on the JSON
//! shape below:
//!
//! ```json
//! {"event": "call", "payload": {"type": "offer", "sdp": "v=0..."}}
//! {"event": "ice_candidate", "payload": {"candidate": "candidate:1 1 UDP ...", "sdpMid": "0"}}
//! {"event": "call_termination", "payload": null}
//! ```

use crate::error::MalformedEnvelope;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of signaling messages understood by the call protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Caller's session description; starts a call.
    #[serde(rename = "call")]
    Offer,
    /// Callee's session description; the call was accepted.
    #[serde(rename = "call_acceptance")]
    Answer,
    #[serde(rename = "call_rejection")]
    CallRejection,
    #[serde(rename = "call_termination")]
    CallTermination,
    /// Callee is busy with another call (or calling us at the same time).
    #[serde(rename = "call_unavailable")]
    CallUnavailable,
    #[serde(rename = "interlocutor_disconnected")]
    InterlocutorDisconnected,
    /// One trickled connectivity candidate.
    #[serde(rename = "ice_candidate")]
    IceCandidate,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        Self::Offer,
        Self::Answer,
        Self::CallRejection,
        Self::CallTermination,
        Self::CallUnavailable,
        Self::InterlocutorDisconnected,
        Self::IceCandidate,
    ];

    /// Name used on the wire.
    pub const fn tag_name(&self) -> &'static str {
        match self {
            Self::Offer => "call",
            Self::Answer => "call_acceptance",
            Self::CallRejection => "call_rejection",
            Self::CallTermination => "call_termination",
            Self::CallUnavailable => "call_unavailable",
            Self::InterlocutorDisconnected => "interlocutor_disconnected",
            Self::IceCandidate => "ice_candidate",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag_name() == tag)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Media negotiation document produced by a connectivity session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A trickled connectivity candidate, in the shape browsers serialize it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// e.g. "candidate:1 1 UDP 2130706431 192.168.1.1 8888 typ host"
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl Candidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }

    pub fn with_sdp_mid(mut self, sdp_mid: impl Into<String>) -> Self {
        self.sdp_mid = Some(sdp_mid.into());
        self
    }

    pub fn with_sdp_m_line_index(mut self, index: u16) -> Self {
        self.sdp_m_line_index = Some(index);
        self
    }

    pub fn with_username_fragment(mut self, ufrag: impl Into<String>) -> Self {
        self.username_fragment = Some(ufrag.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Description(SessionDescription),
    Candidate(Candidate),
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventKind,
    #[serde(default)]
    pub payload: Payload,
}

impl Envelope {
    fn bare(event: EventKind) -> Self {
        Self {
            event,
            payload: Payload::None,
        }
    }

    pub fn offer(description: SessionDescription) -> Self {
        Self {
            event: EventKind::Offer,
            payload: Payload::Description(description),
        }
    }

    pub fn answer(description: SessionDescription) -> Self {
        Self {
            event: EventKind::Answer,
            payload: Payload::Description(description),
        }
    }

    pub fn ice_candidate(candidate: Candidate) -> Self {
        Self {
            event: EventKind::IceCandidate,
            payload: Payload::Candidate(candidate),
        }
    }

    pub fn call_rejection() -> Self {
        Self::bare(EventKind::CallRejection)
    }

    pub fn call_termination() -> Self {
        Self::bare(EventKind::CallTermination)
    }

    pub fn call_unavailable() -> Self {
        Self::bare(EventKind::CallUnavailable)
    }

    pub fn interlocutor_disconnected() -> Self {
        Self::bare(EventKind::InterlocutorDisconnected)
    }

    pub fn session_description(&self) -> Option<&SessionDescription> {
        match &self.payload {
            Payload::Description(description) => Some(description),
            _ => None,
        }
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        match &self.payload {
            Payload::Candidate(candidate) => Some(candidate),
            _ => None,
        }
    }

    /// Checks that the payload carries what the event kind needs.
    ///
    /// Payloads of control events (rejection, termination, ...) are ignored.
    pub fn validate(&self) -> Result<(), MalformedEnvelope> {
        let malformed = |reason| {
            Err(MalformedEnvelope {
                kind: self.event,
                reason,
            })
        };
        match (self.event, &self.payload) {
            (EventKind::Offer, Payload::Description(d)) if d.sdp_type == SdpType::Offer => Ok(()),
            (EventKind::Answer, Payload::Description(d)) if d.sdp_type == SdpType::Answer => Ok(()),
            (EventKind::Offer | EventKind::Answer, Payload::Description(_)) => {
                malformed("session description of the wrong type")
            }
            (EventKind::Offer | EventKind::Answer, _) => malformed("missing session description"),
            (EventKind::IceCandidate, Payload::Candidate(_)) => Ok(()),
            (EventKind::IceCandidate, _) => malformed("missing candidate"),
            _ => Ok(()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl FromStr for Envelope {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}
