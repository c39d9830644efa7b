use std::sync::Arc;

use async_trait::async_trait;
use derivative::Derivative;
use enclose::enc;
use tokio::sync::Mutex;
use uuid::Uuid;
use webrtc::{
    api::{
        interceptor_registry::register_default_interceptors, media_engine::MediaEngine, APIBuilder,
    },
    ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit},
    interceptor::registry::Registry,
    peer_connection::{
        sdp::{sdp_type::RTCSdpType, session_description::RTCSessionDescription},
        RTCPeerConnection,
    },
    rtp_transceiver::{rtp_receiver::RTCRtpReceiver, RTCRtpTransceiver},
    track::{track_local::TrackLocal, track_remote::TrackRemote},
};

use crate::{
    config::PeerConfig,
    error::{Error, SignalingErrorKind},
    peer::{OnIceCandidateFn, OnRemoteMediaFn, PeerResource},
    signal::{IceCandidate, SdpKind, SessionDescription},
};

/// Local media attached by the sender side: the tracks of one captured stream.
pub type LocalMedia = Vec<Arc<dyn TrackLocal + Send + Sync>>;

/// Remote media as delivered by the peer connection: the remote track together
/// with the stream id grouping it.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct RemoteMedia {
    pub stream_id: String,
    #[derivative(Debug = "ignore")]
    pub track: Arc<TrackRemote>,
}

/// This handles [`webrtc::peer_connection::RTCPeerConnection`] methods for one
/// negotiation, behind the [`PeerResource`] contract.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct WebRtcPeer {
    pub id: String,
    peer_connection: Arc<RTCPeerConnection>,
    pending_candidates: Arc<Mutex<Vec<RTCIceCandidateInit>>>,
    #[derivative(Debug = "ignore")]
    on_ice_candidate_fn: Arc<Mutex<OnIceCandidateFn>>,
    #[derivative(Debug = "ignore")]
    on_remote_media_fn: Arc<Mutex<OnRemoteMediaFn<RemoteMedia>>>,
}

impl WebRtcPeer {
    pub async fn new(config: PeerConfig) -> Result<Self, Error> {
        let id = Uuid::new_v4().to_string();
        let peer_connection = Self::generate_peer_connection(config).await?;

        let peer = Self {
            id,
            peer_connection: Arc::new(peer_connection),
            pending_candidates: Arc::new(Mutex::new(Vec::new())),
            on_ice_candidate_fn: Arc::new(Mutex::new(Box::new(|_| {}))),
            on_remote_media_fn: Arc::new(Mutex::new(Box::new(|_| {}))),
        };

        peer.ice_state_hooks().await;

        tracing::debug!("WebRtcPeer {} is created", peer.id);

        Ok(peer)
    }

    async fn generate_peer_connection(config: PeerConfig) -> Result<RTCPeerConnection, Error> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = api.new_peer_connection(config.configuration).await?;
        Ok(peer_connection)
    }

    async fn ice_state_hooks(&self) {
        let peer = self.peer_connection.clone();
        let on_ice_candidate = Arc::clone(&self.on_ice_candidate_fn);

        peer.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            Box::pin({
                let func = on_ice_candidate.clone();
                async move {
                    // None marks the end of candidate gathering.
                    let Some(candidate) = candidate else {
                        tracing::debug!("ICE candidate gathering completed");
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => {
                            let locked = func.lock().await;
                            (locked)(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            });
                        }
                        Err(err) => {
                            tracing::error!("failed to serialize ICE candidate: {}", err);
                        }
                    }
                }
            })
        }));

        let on_remote_media = Arc::clone(&self.on_remote_media_fn);
        peer.on_track(Box::new(enc!( (on_remote_media)
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                Box::pin(enc!( (on_remote_media) async move {
                    tracing::info!(
                        "remote track arrived: track_id={}, stream_id={}",
                        track.id(),
                        track.stream_id()
                    );
                    let locked = on_remote_media.lock().await;
                    (locked)(RemoteMedia {
                        stream_id: track.stream_id(),
                        track,
                    });
                }))
            }
        )));

        peer.on_ice_gathering_state_change(Box::new(move |state| {
            Box::pin(async move {
                tracing::debug!("ICE gathering state changed: {}", state);
            })
        }));

        peer.on_peer_connection_state_change(Box::new(move |state| {
            Box::pin(async move {
                tracing::debug!("peer connection state changed: {}", state);
            })
        }));
    }

    fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, Error> {
        let rtc = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        };
        Ok(rtc)
    }

    fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription, Error> {
        let kind = match description.sdp_type {
            RTCSdpType::Offer => SdpKind::Offer,
            RTCSdpType::Answer => SdpKind::Answer,
            other => {
                return Err(Error::new_signaling(
                    format!("unsupported description type {}", other),
                    SignalingErrorKind::InvalidStateError,
                ))
            }
        };
        Ok(SessionDescription {
            kind,
            sdp: description.sdp,
        })
    }
}

#[async_trait]
impl PeerResource for WebRtcPeer {
    type Media = LocalMedia;
    type Remote = RemoteMedia;

    async fn attach_media(&self, media: LocalMedia) -> Result<(), Error> {
        for track in media {
            let _ = self.peer_connection.add_track(track).await?;
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, Error> {
        let offer = self.peer_connection.create_offer(None).await?;
        Self::from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, Error> {
        let answer = self.peer_connection.create_answer(None).await?;
        Self::from_rtc_description(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), Error> {
        let rtc = Self::to_rtc_description(description)?;
        self.peer_connection.set_local_description(rtc).await?;
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), Error> {
        let rtc = Self::to_rtc_description(description)?;
        self.peer_connection.set_remote_description(rtc).await?;

        let mut pendings = self.pending_candidates.lock().await;
        for candidate in pendings.drain(..) {
            tracing::debug!("adding held ICE candidate: {:#?}", candidate);
            if let Err(err) = self.peer_connection.add_ice_candidate(candidate).await {
                tracing::error!("failed to add held ICE candidate: {}", err);
            }
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), Error> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        if self.peer_connection.remote_description().await.is_some() {
            self.peer_connection.add_ice_candidate(init).await?;
        } else {
            // Candidates can outrun the remote description; hold them until
            // it lands.
            tracing::debug!("holding ICE candidate until the remote description is set");
            self.pending_candidates.lock().await.push(init);
        }
        Ok(())
    }

    async fn on_ice_candidate(&self, f: OnIceCandidateFn) {
        let mut callback = self.on_ice_candidate_fn.lock().await;
        *callback = f;
    }

    async fn on_remote_media(&self, f: OnRemoteMediaFn<RemoteMedia>) {
        let mut callback = self.on_remote_media_fn.lock().await;
        *callback = f;
    }

    async fn close(&self) -> Result<(), Error> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

impl Drop for WebRtcPeer {
    fn drop(&mut self) {
        tracing::debug!("WebRtcPeer {} is dropped", self.id);
    }
}
