use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use enclose::enc;
use strum_macros::Display;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::{
    error::{Error, SignalingErrorKind},
    peer::PeerResource,
    signal::{IceCandidate, Role, SessionDescription, Signal, SignalEnvelope},
    transport::{BroadcastTransport, Subscription},
};

pub type OnMediaAvailableFn<M> = Box<dyn Fn(M) + Send + Sync + 'static>;
pub type OnParticipantJoinedFn = Box<dyn Fn() + Send + Sync + 'static>;

/// Negotiation phase of one orchestrator instance. `Closed` and `Failed` are
/// terminal; there is no automatic retry.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Subscribing,
    Negotiating,
    Connected,
    Closed,
    Failed,
}

enum OrchestratorEvent<R> {
    Inbound(SignalEnvelope),
    CandidateDiscovered(IceCandidate),
    RemoteMediaArrived(R),
    Closed,
}

/// The signaling engine for one participant of one session. It exclusively
/// owns a peer-connection resource, drives it through the offer/answer/
/// candidate exchange over a broadcast topic named by the session id, and
/// reports lifecycle events to its owner.
///
/// All signal handling for an instance is serialized through a single event
/// loop: handling of one inbound envelope completes, including any publish it
/// triggers, before the next one starts. Call [`SignalingOrchestrator::cleanup`]
/// when done; it is the only cancellation primitive.
pub struct SignalingOrchestrator<P: PeerResource> {
    pub id: String,
    session_id: String,
    role: Role,
    peer: Arc<P>,
    transport: Arc<dyn BroadcastTransport>,
    phase: Arc<Mutex<Phase>>,
    event_sender: mpsc::UnboundedSender<OrchestratorEvent<P::Remote>>,
    subscription: Arc<Mutex<Option<Subscription>>>,
    closed: Arc<AtomicBool>,
    participant_joined: Arc<AtomicBool>,
    remote_media_seen: Arc<AtomicBool>,
    on_media_available_fn: Arc<Mutex<OnMediaAvailableFn<P::Remote>>>,
    on_participant_joined_fn: Arc<Mutex<OnParticipantJoinedFn>>,
}

impl<P: PeerResource> SignalingOrchestrator<P> {
    /// Binds a new instance to a session topic. The peer resource is taken by
    /// value: it belongs to this instance alone and is never shared with or
    /// handed to another one.
    pub fn new(
        session_id: String,
        role: Role,
        peer: P,
        transport: Arc<dyn BroadcastTransport>,
    ) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();
        let (event_sender, event_receiver) = mpsc::unbounded_channel();

        let orchestrator = Arc::new(Self {
            id: id.clone(),
            session_id,
            role,
            peer: Arc::new(peer),
            transport,
            phase: Arc::new(Mutex::new(Phase::Idle)),
            event_sender,
            subscription: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
            participant_joined: Arc::new(AtomicBool::new(false)),
            remote_media_seen: Arc::new(AtomicBool::new(false)),
            on_media_available_fn: Arc::new(Mutex::new(Box::new(|_| {}))),
            on_participant_joined_fn: Arc::new(Mutex::new(Box::new(|| {}))),
        });

        {
            let cloned = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                Self::event_loop(cloned, event_receiver).await;
            });
        }

        tracing::debug!("SignalingOrchestrator {} is created", id);

        orchestrator
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.lock().await
    }

    /// Set callback function for when remote media becomes available. Fires at
    /// most once per instance. Viewer side.
    pub async fn on_media_available(&self, f: OnMediaAvailableFn<P::Remote>) {
        let mut callback = self.on_media_available_fn.lock().await;
        *callback = f;
    }

    /// Set callback function for when a remote participant's offer has been
    /// answered. Fires at most once per instance. Sender side.
    pub async fn on_participant_joined(&self, f: OnParticipantJoinedFn) {
        let mut callback = self.on_participant_joined_fn.lock().await;
        *callback = f;
    }

    /// Starts negotiating. A sender attaches `media` to its peer resource
    /// before subscribing; a viewer subscribes and immediately publishes its
    /// offer. Setup failures are fatal to the instance and leave it `Failed`.
    pub async fn initialize(&self, media: Option<P::Media>) -> Result<(), Error> {
        {
            let mut phase = self.phase.lock().await;
            if *phase != Phase::Idle {
                return Err(Error::new_signaling(
                    format!("initialize called in {} phase", *phase),
                    SignalingErrorKind::InvalidStateError,
                ));
            }
            *phase = Phase::Subscribing;
        }

        match self.setup(media).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut phase = self.phase.lock().await;
                if *phase != Phase::Closed {
                    *phase = Phase::Failed;
                }
                Err(err)
            }
        }
    }

    async fn setup(&self, media: Option<P::Media>) -> Result<(), Error> {
        if self.role == Role::Sender {
            if let Some(media) = media {
                self.peer.attach_media(media).await?;
            }
        }

        let event_sender = self.event_sender.clone();
        self.peer
            .on_ice_candidate(Box::new(enc!( (event_sender) move |candidate| {
                let _ = event_sender.send(OrchestratorEvent::CandidateDiscovered(candidate));
            })))
            .await;

        if self.role == Role::Viewer {
            let event_sender = self.event_sender.clone();
            self.peer
                .on_remote_media(Box::new(move |media| {
                    let _ = event_sender.send(OrchestratorEvent::RemoteMediaArrived(media));
                }))
                .await;
        }

        let mut subscription = self.transport.subscribe(&self.session_id).await?;
        let receiver = subscription.take_receiver();
        {
            let mut slot = self.subscription.lock().await;
            *slot = Some(subscription);
        }
        if let Some(mut receiver) = receiver {
            let event_sender = self.event_sender.clone();
            tokio::spawn(async move {
                while let Some(envelope) = receiver.recv().await {
                    if event_sender
                        .send(OrchestratorEvent::Inbound(envelope))
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }

        // A cleanup may have run while we were subscribing; release the
        // subscription it could not see yet.
        if self.closed.load(Ordering::SeqCst) {
            if let Some(mut subscription) = self.subscription.lock().await.take() {
                subscription.release();
            }
            return Err(Error::new_signaling(
                "instance was cleaned up during initialization".to_owned(),
                SignalingErrorKind::InvalidStateError,
            ));
        }

        {
            let mut phase = self.phase.lock().await;
            *phase = Phase::Negotiating;
        }

        if self.role == Role::Viewer {
            let offer = self.peer.create_offer().await?;
            self.peer.set_local_description(offer.clone()).await?;
            self.transport
                .publish(&self.session_id, SignalEnvelope::offer(self.role, offer))
                .await?;
            tracing::debug!("offer published for session {}", self.session_id);
        }

        Ok(())
    }

    async fn event_loop(
        orchestrator: Arc<Self>,
        mut event_receiver: mpsc::UnboundedReceiver<OrchestratorEvent<P::Remote>>,
    ) {
        tracing::debug!("orchestrator {} event loop started", orchestrator.id);
        while let Some(event) = event_receiver.recv().await {
            match event {
                OrchestratorEvent::Inbound(envelope) => {
                    if orchestrator.closed.load(Ordering::SeqCst) {
                        continue;
                    }
                    if envelope.origin == orchestrator.role {
                        tracing::debug!(
                            "discarding self-echo {} envelope",
                            envelope.signal.name()
                        );
                        continue;
                    }
                    if let Err(err) = orchestrator.handle_signal(envelope).await {
                        // One bad envelope must not end an otherwise healthy
                        // session.
                        tracing::error!("failed to process inbound signal: {}", err);
                    }
                }
                OrchestratorEvent::CandidateDiscovered(candidate) => {
                    if orchestrator.closed.load(Ordering::SeqCst) {
                        continue;
                    }
                    let envelope =
                        SignalEnvelope::ice_candidate(orchestrator.role, candidate);
                    if let Err(err) = orchestrator
                        .transport
                        .publish(&orchestrator.session_id, envelope)
                        .await
                    {
                        tracing::error!("failed to publish local ICE candidate: {}", err);
                    }
                }
                OrchestratorEvent::RemoteMediaArrived(media) => {
                    if orchestrator.closed.load(Ordering::SeqCst) {
                        continue;
                    }
                    if orchestrator.remote_media_seen.swap(true, Ordering::SeqCst) {
                        tracing::debug!("remote media already exposed, ignoring further tracks");
                        continue;
                    }
                    {
                        let mut phase = orchestrator.phase.lock().await;
                        *phase = Phase::Connected;
                    }
                    let callback = orchestrator.on_media_available_fn.lock().await;
                    (callback)(media);
                }
                OrchestratorEvent::Closed => break,
            }
        }
        tracing::debug!("orchestrator {} event loop finished", orchestrator.id);
    }

    async fn handle_signal(&self, envelope: SignalEnvelope) -> Result<(), Error> {
        match envelope.signal {
            Signal::Offer { offer } => {
                if self.role != Role::Sender {
                    tracing::debug!("viewer ignores offer envelopes");
                    return Ok(());
                }
                self.handle_offer(offer).await
            }
            Signal::Answer { answer } => {
                if self.role != Role::Viewer {
                    tracing::debug!("sender ignores answer envelopes");
                    return Ok(());
                }
                self.handle_answer(answer).await
            }
            Signal::IceCandidate { candidate } => self.handle_candidate(candidate).await,
        }
    }

    async fn handle_offer(&self, offer: SessionDescription) -> Result<(), Error> {
        if self.participant_joined.load(Ordering::SeqCst) {
            // Renegotiation is unsupported; a replayed offer must not produce
            // a second answer.
            tracing::debug!("duplicate offer for session {} ignored", self.session_id);
            return Ok(());
        }

        self.peer.set_remote_description(offer).await?;
        let answer = self.peer.create_answer().await?;
        self.peer.set_local_description(answer.clone()).await?;
        self.transport
            .publish(&self.session_id, SignalEnvelope::answer(self.role, answer))
            .await?;
        tracing::debug!("answer published for session {}", self.session_id);

        {
            let mut phase = self.phase.lock().await;
            *phase = Phase::Connected;
        }
        self.participant_joined.store(true, Ordering::SeqCst);
        let callback = self.on_participant_joined_fn.lock().await;
        (callback)();
        Ok(())
    }

    async fn handle_answer(&self, answer: SessionDescription) -> Result<(), Error> {
        self.peer.set_remote_description(answer).await?;
        tracing::debug!("answer applied for session {}", self.session_id);
        Ok(())
    }

    async fn handle_candidate(&self, candidate: IceCandidate) -> Result<(), Error> {
        if let Err(err) = self.peer.add_ice_candidate(candidate).await {
            // Late or malformed candidates must not take the session down.
            tracing::error!("peer rejected ICE candidate: {}", err);
        }
        Ok(())
    }

    /// Tears the instance down: detaches observers, releases the transport
    /// subscription and the peer resource, and stops the event loop. Safe to
    /// call any number of times and at any point of the lifecycle, including
    /// while `initialize` is still in flight.
    pub async fn cleanup(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut phase = self.phase.lock().await;
            *phase = Phase::Closed;
        }
        {
            let mut callback = self.on_media_available_fn.lock().await;
            *callback = Box::new(|_| {});
        }
        {
            let mut callback = self.on_participant_joined_fn.lock().await;
            *callback = Box::new(|| {});
        }
        if let Some(mut subscription) = self.subscription.lock().await.take() {
            subscription.release();
        }
        if let Err(err) = self.peer.close().await {
            tracing::error!("failed to close peer resource: {}", err);
        }
        let _ = self.event_sender.send(OrchestratorEvent::Closed);
        tracing::debug!("orchestrator {} cleaned up", self.id);
    }
}

impl<P: PeerResource> std::fmt::Debug for SignalingOrchestrator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingOrchestrator")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl<P: PeerResource> Drop for SignalingOrchestrator<P> {
    fn drop(&mut self) {
        tracing::debug!("SignalingOrchestrator {} is dropped", self.id);
    }
}
