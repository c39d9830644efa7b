use chrono::Duration;
use derivative::Derivative;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;

/// Configuration for [`crate::webrtc_peer::WebRtcPeer`].
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct PeerConfig {
    /// Configuration for [`webrtc::peer_connection::RTCPeerConnection`].
    #[derivative(Debug = "ignore")]
    pub configuration: RTCConfiguration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            configuration: RTCConfiguration {
                ice_servers: vec![RTCIceServer {
                    urls: vec![
                        "stun:stun.l.google.com:19302".to_owned(),
                        "stun:stun1.l.google.com:19302".to_owned(),
                    ],
                    ..Default::default()
                }],
                ..Default::default()
            },
        }
    }
}

/// Configuration for [`crate::registry::Registry`].
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// How long a freshly created session stays connectable.
    pub session_ttl: Duration,
    /// How many times `create` retries when a generated code collides with an
    /// active session.
    pub create_attempts: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::hours(24),
            create_attempts: 5,
        }
    }
}

/// Configuration for [`crate::access::AccessGate`].
#[derive(Clone, Debug)]
pub struct AccessConfig {
    /// The shared passphrase required before viewing. One value for every
    /// session and every viewer.
    pub passphrase: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            passphrase: "walkthrough".to_owned(),
        }
    }
}
