use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use derivative::Derivative;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::Error;
use crate::signal::SignalEnvelope;

const TOPIC_CAPACITY: usize = 1024;

/// Named-topic publish/subscribe. Every envelope published on a topic reaches
/// every current subscriber of that topic, the publisher included. Delivery is
/// best effort: no acknowledgement, no persistence, no replay to late joiners,
/// and no ordering guarantee across publishers.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Binds to a topic. Only envelopes published after the subscription is
    /// established are guaranteed observable through it.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, Error>;

    /// Fire-and-forget. A successful return does not confirm remote receipt.
    async fn publish(&self, topic: &str, envelope: SignalEnvelope) -> Result<(), Error>;
}

/// One topic binding. Releasing is idempotent; after release no further
/// envelopes are delivered. Dropping the subscription releases it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Subscription {
    pub topic: String,
    receiver: Option<mpsc::UnboundedReceiver<SignalEnvelope>>,
    #[derivative(Debug = "ignore")]
    releaser: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        topic: String,
        receiver: mpsc::UnboundedReceiver<SignalEnvelope>,
        releaser: Box<dyn FnOnce() + Send>,
    ) -> Self {
        Self {
            topic,
            receiver: Some(receiver),
            releaser: Some(releaser),
        }
    }

    /// Hands the inbound envelope stream to the consumer. Yields `None` on the
    /// second call.
    pub fn take_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SignalEnvelope>> {
        self.receiver.take()
    }

    pub fn release(&mut self) {
        if let Some(release) = self.releaser.take() {
            release();
            tracing::debug!("subscription for topic {} released", self.topic);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

struct Topic {
    sender: broadcast::Sender<SignalEnvelope>,
    subscribers: Arc<AtomicUsize>,
}

/// In-process [`BroadcastTransport`] over per-topic broadcast channels. Used
/// by the tests; production deployments bring their own pub/sub behind the
/// same trait.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct MemoryBroadcast {
    #[derivative(Debug = "ignore")]
    topics: Mutex<HashMap<String, Topic>>,
}

impl MemoryBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many live subscriptions a topic currently has.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.lock().unwrap();
        topics
            .get(topic)
            .map(|t| t.subscribers.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl BroadcastTransport for MemoryBroadcast {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, Error> {
        let (sender, subscribers) = {
            let mut topics = self.topics.lock().unwrap();
            let entry = topics.entry(topic.to_owned()).or_insert_with(|| Topic {
                sender: broadcast::channel(TOPIC_CAPACITY).0,
                subscribers: Arc::new(AtomicUsize::new(0)),
            });
            (entry.sender.clone(), entry.subscribers.clone())
        };
        subscribers.fetch_add(1, Ordering::SeqCst);

        let mut inbound = sender.subscribe();
        let (forward_sender, receiver) = mpsc::unbounded_channel();
        let (stop_sender, mut stop_receiver) = oneshot::channel::<()>();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_receiver => break,
                    received = inbound.recv() => match received {
                        Ok(envelope) => {
                            if forward_sender.send(envelope).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("subscription lagged, {} envelopes dropped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        let releaser = Box::new(move || {
            let _ = stop_sender.send(());
            subscribers.fetch_sub(1, Ordering::SeqCst);
        });

        tracing::debug!("subscribed to topic {}", topic);
        Ok(Subscription::new(topic.to_owned(), receiver, releaser))
    }

    async fn publish(&self, topic: &str, envelope: SignalEnvelope) -> Result<(), Error> {
        let sender = {
            let topics = self.topics.lock().unwrap();
            topics.get(topic).map(|t| t.sender.clone())
        };
        match sender {
            Some(sender) => {
                // An Err here means no live receivers. Delivery is best
                // effort either way.
                if sender.send(envelope).is_err() {
                    tracing::debug!("publish on topic {} reached no subscribers", topic);
                }
            }
            None => {
                tracing::debug!("publish on unknown topic {} dropped", topic);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Role, SdpKind, SessionDescription};
    use std::time::Duration;

    fn offer_envelope(origin: Role) -> SignalEnvelope {
        SignalEnvelope::offer(
            origin,
            SessionDescription {
                kind: SdpKind::Offer,
                sdp: "v=0\r\n".to_owned(),
            },
        )
    }

    #[tokio::test]
    async fn every_subscriber_receives_including_the_publisher() {
        let transport = MemoryBroadcast::new();
        let mut first = transport.subscribe("sess-1").await.unwrap();
        let mut second = transport.subscribe("sess-1").await.unwrap();
        let mut first_rx = first.take_receiver().unwrap();
        let mut second_rx = second.take_receiver().unwrap();

        let envelope = offer_envelope(Role::Viewer);
        transport.publish("sess-1", envelope.clone()).await.unwrap();

        assert_eq!(first_rx.recv().await.unwrap(), envelope);
        assert_eq!(second_rx.recv().await.unwrap(), envelope);
    }

    #[tokio::test]
    async fn no_replay_for_late_joiners() {
        let transport = MemoryBroadcast::new();
        let mut early = transport.subscribe("sess-1").await.unwrap();
        let _early_rx = early.take_receiver().unwrap();
        transport
            .publish("sess-1", offer_envelope(Role::Viewer))
            .await
            .unwrap();

        let mut late = transport.subscribe("sess-1").await.unwrap();
        let mut late_rx = late.take_receiver().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(late_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn release_stops_delivery_and_is_idempotent() {
        let transport = MemoryBroadcast::new();
        let mut subscription = transport.subscribe("sess-1").await.unwrap();
        let mut receiver = subscription.take_receiver().unwrap();
        assert_eq!(transport.subscriber_count("sess-1"), 1);

        subscription.release();
        subscription.release();
        assert_eq!(transport.subscriber_count("sess-1"), 0);

        // Give the pump task a moment to observe the stop signal.
        tokio::time::sleep(Duration::from_millis(20)).await;
        transport
            .publish("sess-1", offer_envelope(Role::Viewer))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_a_subscription_releases_it() {
        let transport = MemoryBroadcast::new();
        {
            let _subscription = transport.subscribe("sess-1").await.unwrap();
            assert_eq!(transport.subscriber_count("sess-1"), 1);
        }
        assert_eq!(transport.subscriber_count("sess-1"), 0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_best_effort() {
        let transport = MemoryBroadcast::new();
        transport
            .publish("nobody-home", offer_envelope(Role::Sender))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn take_receiver_yields_once() {
        let transport = MemoryBroadcast::new();
        let mut subscription = transport.subscribe("sess-1").await.unwrap();
        assert!(subscription.take_receiver().is_some());
        assert!(subscription.take_receiver().is_none());
    }
}
