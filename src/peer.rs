use async_trait::async_trait;

use crate::error::Error;
use crate::signal::{IceCandidate, SessionDescription};

pub type OnIceCandidateFn = Box<dyn Fn(IceCandidate) + Send + Sync + 'static>;
pub type OnRemoteMediaFn<M> = Box<dyn Fn(M) + Send + Sync + 'static>;

/// The peer-connection resource the orchestrator drives. The production
/// implementation is [`crate::webrtc_peer::WebRtcPeer`]; tests script their
/// own. A resource is exclusively owned by one orchestrator instance for that
/// instance's entire lifetime.
#[async_trait]
pub trait PeerResource: Send + Sync + 'static {
    /// Opaque local media source handed over by the owner. The orchestrator
    /// never looks inside it.
    type Media: Send + 'static;
    /// Handle to remote media, exposed to the owner when it arrives.
    type Remote: Send + 'static;

    /// Attaches the local media source's tracks. Sender side only, called
    /// before the signaling subscription is established.
    async fn attach_media(&self, media: Self::Media) -> Result<(), Error>;

    async fn create_offer(&self) -> Result<SessionDescription, Error>;

    async fn create_answer(&self) -> Result<SessionDescription, Error>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), Error>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), Error>;

    /// Applies a remote candidate. Implementations may hold candidates that
    /// arrive before a remote description exists and apply them later; the
    /// orchestrator itself never buffers.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), Error>;

    /// Registers the callback for locally discovered ICE candidates. May fire
    /// many times, at any point of the negotiation.
    async fn on_ice_candidate(&self, f: OnIceCandidateFn);

    /// Registers the callback for inbound media. Viewer side only.
    async fn on_remote_media(&self, f: OnRemoteMediaFn<Self::Remote>);

    async fn close(&self) -> Result<(), Error>;
}
