#![deny(missing_debug_implementations)]
//! # Peerbeam
//! Peerbeam is a WebRTC signaling library for code-matched one-to-one live sharing. One participant (the "sender") publishes a screen or camera stream and another (the "viewer") consumes it; they find each other with a short session code and negotiate the peer connection over a best-effort broadcast topic keyed by the session id. This provides the signaling engine only — bring your own broadcast transport and session storage behind the provided contracts, and hand the captured media to the orchestrator as an opaque source.

/// Fixed passphrase gate in front of viewing.
pub mod access;
/// Configuration for [`registry::Registry`], [`webrtc_peer::WebRtcPeer`] and [`access::AccessGate`].
pub mod config;
pub mod error;
/// The signaling state machine driving one peer connection per participant.
pub mod orchestrator;
/// Peer-connection resource contract driven by the orchestrator.
pub mod peer;
/// Session registry contract and client-side policy.
pub mod registry;
/// Session records, codes and join links.
pub mod session;
/// Signal envelope wire model.
pub mod signal;
/// Named-topic broadcast transport abstraction.
pub mod transport;
/// [`webrtc::peer_connection::RTCPeerConnection`] methods behind the [`peer::PeerResource`] contract.
pub mod webrtc_peer;
