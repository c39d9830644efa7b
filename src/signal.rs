use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::{Error, SignalingErrorKind};

/// Which side of a session a participant plays. Fixed for the lifetime of an
/// orchestrator instance.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// Publishes media (screen or camera).
    Sender,
    /// Consumes media.
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// One half of the initial media-capability negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

/// A discovered network path descriptor, exchanged opportunistically and
/// independently of offer/answer timing. Field names follow the browser JSON
/// representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Signal {
    Offer { offer: SessionDescription },
    Answer { answer: SessionDescription },
    IceCandidate { candidate: IceCandidate },
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Offer { .. } => "offer",
            Signal::Answer { .. } => "answer",
            Signal::IceCandidate { .. } => "ice-candidate",
        }
    }
}

/// The unit exchanged over the broadcast topic. The transport delivers every
/// envelope to every subscriber, the publisher included, so receivers must
/// discard envelopes whose `origin` equals their own role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(flatten)]
    pub signal: Signal,
    pub origin: Role,
}

impl SignalEnvelope {
    pub fn offer(origin: Role, offer: SessionDescription) -> Self {
        Self {
            signal: Signal::Offer { offer },
            origin,
        }
    }

    pub fn answer(origin: Role, answer: SessionDescription) -> Self {
        Self {
            signal: Signal::Answer { answer },
            origin,
        }
    }

    pub fn ice_candidate(origin: Role, candidate: IceCandidate) -> Self {
        Self {
            signal: Signal::IceCandidate { candidate },
            origin,
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|err| {
            Error::new_signaling(
                format!("failed to serialize envelope: {}", err),
                SignalingErrorKind::SignalProcessingError,
            )
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        serde_json::from_str(raw).map_err(|err| {
            Error::new_signaling(
                format!("failed to parse envelope: {}", err),
                SignalingErrorKind::SignalProcessingError,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer_description() -> SessionDescription {
        SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n".to_owned(),
        }
    }

    #[test]
    fn offer_envelope_wire_shape() {
        let envelope = SignalEnvelope::offer(Role::Viewer, offer_description());
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value.get("type").unwrap(), "offer");
        assert_eq!(value.get("origin").unwrap(), "viewer");
        let payload = value.get("payload").unwrap();
        let offer = payload.get("offer").unwrap();
        assert_eq!(offer.get("type").unwrap(), "offer");
        assert!(offer.get("sdp").unwrap().as_str().unwrap().starts_with("v=0"));
    }

    #[test]
    fn candidate_envelope_wire_shape() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 UDP 2130706432 192.0.2.1 5000 typ host".to_owned(),
            sdp_mid: Some("0".to_owned()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };
        let envelope = SignalEnvelope::ice_candidate(Role::Sender, candidate);
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value.get("type").unwrap(), "ice-candidate");
        assert_eq!(value.get("origin").unwrap(), "sender");
        let payload = value.get("payload").unwrap().get("candidate").unwrap();
        assert_eq!(payload.get("sdpMid").unwrap(), "0");
        assert_eq!(payload.get("sdpMLineIndex").unwrap(), 0);
        assert!(payload.get("usernameFragment").is_none());
    }

    #[test]
    fn envelope_json_round_trip() {
        let envelope = SignalEnvelope::answer(
            Role::Sender,
            SessionDescription {
                kind: SdpKind::Answer,
                sdp: "v=0\r\n".to_owned(),
            },
        );
        let raw = envelope.to_json().unwrap();
        let parsed = SignalEnvelope::from_json(&raw).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn malformed_envelope_is_a_signal_processing_error() {
        let err = SignalEnvelope::from_json("{\"type\":\"offer\"").unwrap_err();
        assert_eq!(
            err.signaling_kind(),
            Some(crate::error::SignalingErrorKind::SignalProcessingError)
        );

        let err = SignalEnvelope::from_json("{\"type\":\"reinvite\",\"origin\":\"viewer\",\"payload\":{}}")
            .unwrap_err();
        assert_eq!(
            err.signaling_kind(),
            Some(crate::error::SignalingErrorKind::SignalProcessingError)
        );
    }

    #[test]
    fn role_display_matches_wire_names() {
        assert_eq!(Role::Sender.to_string(), "sender");
        assert_eq!(Role::Viewer.to_string(), "viewer");
    }
}
