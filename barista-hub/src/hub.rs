//! Single-owner publish/subscribe broker for live store channels.
//!
//! ```text
//! HTTP handlers / notifier              Hub task                  Connections
//!        │                                 │                          │
//!        ├── Register(topic, outbox) ─────>│  topics: topic → {id}    │
//!        ├── Publish(topic, frame) ───────>├── try_send(frame) ──────>│ outbox (bounded)
//!        │                                 ├── failed? unregister     │
//!        ├── Unregister(id) ──────────────>│                          │
//! ```
//!
//! Every command goes through one mpsc queue and is handled to completion
//! before the next is taken, so the registry needs no lock and each publish
//! sees a single consistent set of subscribers.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::frame::Frame;
use crate::subscription::{Subscription, SubscriptionState};

pub type ConnectionId = u64;

pub(crate) type Outbox = mpsc::Sender<Arc<str>>;

pub(crate) enum Command {
    Register {
        id: ConnectionId,
        topic: String,
        outbox: Outbox,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        id: ConnectionId,
        ack: Option<oneshot::Sender<bool>>,
    },
    Publish {
        topic: String,
        frame: Frame,
        ack: oneshot::Sender<usize>,
    },
    SubscriberCount {
        topic: String,
        reply: oneshot::Sender<usize>,
    },
    TopicCount {
        reply: oneshot::Sender<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the command queue feeding the hub task.
    pub command_buffer: usize,
    /// Frames buffered per connection before it is treated as dead.
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_buffer: 1024,
            subscriber_buffer: 64,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Notification hub is not running")]
    Closed,

    #[error("Subscription {id} is {state:?}; only a connecting subscription can register")]
    InvalidState {
        id: ConnectionId,
        state: SubscriptionState,
    },
}

/// The registry owner. Lives inside its own task; reach it through [`HubHandle`].
pub struct Hub {
    topics: HashMap<String, HashMap<ConnectionId, Outbox>>,
    connections: HashMap<ConnectionId, String>,
    commands: mpsc::Receiver<Command>,
}

impl Hub {
    /// Starts the hub task. It stops once every handle has been dropped.
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let hub = Hub {
            topics: HashMap::new(),
            connections: HashMap::new(),
            commands: rx,
        };
        tokio::spawn(hub.run());

        HubHandle {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
            subscriber_buffer: config.subscriber_buffer.max(1),
        }
    }

    async fn run(mut self) {
        info!("Notification hub started");
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        info!(topics = self.topics.len(), "Hub command queue closed, notification hub stopping");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { id, topic, outbox, ack } => {
                self.register(id, topic, outbox);
                let _ = ack.send(());
            }
            Command::Unregister { id, ack } => {
                let removed = self.unregister(id);
                if let Some(ack) = ack {
                    let _ = ack.send(removed);
                }
            }
            Command::Publish { topic, frame, ack } => {
                let delivered = self.publish(&topic, &frame);
                let _ = ack.send(delivered);
            }
            Command::SubscriberCount { topic, reply } => {
                let _ = reply.send(self.topics.get(&topic).map_or(0, HashMap::len));
            }
            Command::TopicCount { reply } => {
                let _ = reply.send(self.topics.len());
            }
        }
    }

    fn register(&mut self, id: ConnectionId, topic: String, outbox: Outbox) {
        let subscribers = self.topics.entry(topic.clone()).or_default();
        subscribers.insert(id, outbox);
        debug!(connection_id = id, topic = %topic, subscribers = subscribers.len(), "Subscriber registered");
        self.connections.insert(id, topic);
    }

    fn unregister(&mut self, id: ConnectionId) -> bool {
        let Some(topic) = self.connections.remove(&id) else {
            return false;
        };

        if let Some(subscribers) = self.topics.get_mut(&topic) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                self.topics.remove(&topic);
            }
        }
        debug!(connection_id = id, topic = %topic, "Subscriber unregistered");
        true
    }

    fn publish(&mut self, topic: &str, frame: &Frame) -> usize {
        let Some(subscribers) = self.topics.get(topic) else {
            return 0;
        };

        let encoded: Arc<str> = match frame.encode() {
            Ok(text) => text.into(),
            Err(e) => {
                error!(topic = %topic, "Failed to encode frame: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, outbox) in subscribers {
            match outbox.try_send(encoded.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection_id = *id, topic = %topic, "Subscriber is not keeping up, dropping connection");
                    dead.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection_id = *id, topic = %topic, "Subscriber connection is gone");
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            self.unregister(id);
        }

        delivered
    }
}

/// Cloneable access point to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
    subscriber_buffer: usize,
}

impl HubHandle {
    /// A new connection for `topic`, not yet registered.
    pub fn connect(&self, topic: impl Into<String>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Subscription::new(id, topic.into(), self.clone(), self.subscriber_buffer)
    }

    /// Connects and registers in one step.
    pub async fn subscribe(&self, topic: impl Into<String>) -> Result<Subscription, HubError> {
        let mut subscription = self.connect(topic);
        subscription.register().await?;
        Ok(subscription)
    }

    /// Delivers `frame` to every current subscriber of `topic` and returns how
    /// many accepted it. An empty topic is not an error.
    pub async fn publish(&self, topic: impl Into<String>, frame: impl Into<Frame>) -> Result<usize, HubError> {
        let (ack, delivered) = oneshot::channel();
        self.send(Command::Publish {
            topic: topic.into(),
            frame: frame.into(),
            ack,
        })
        .await?;
        delivered.await.map_err(|_| HubError::Closed)
    }

    /// Publishes a `{channel, event, data}` frame whose channel is the topic.
    pub async fn publish_event(&self, topic: &str, event: &str, data: Value) -> Result<usize, HubError> {
        self.publish(topic, Frame::channel(topic, event, data)).await
    }

    pub async fn subscriber_count(&self, topic: &str) -> Result<usize, HubError> {
        let (reply, count) = oneshot::channel();
        self.send(Command::SubscriberCount {
            topic: topic.to_string(),
            reply,
        })
        .await?;
        count.await.map_err(|_| HubError::Closed)
    }

    pub async fn topic_count(&self) -> Result<usize, HubError> {
        let (reply, count) = oneshot::channel();
        self.send(Command::TopicCount { reply }).await?;
        count.await.map_err(|_| HubError::Closed)
    }

    pub(crate) async fn send(&self, command: Command) -> Result<(), HubError> {
        self.commands.send(command).await.map_err(|_| HubError::Closed)
    }

    /// Fire-and-forget unregistration for contexts that cannot await.
    pub(crate) fn unregister_detached(&self, id: ConnectionId) {
        if let Err(e) = self.commands.try_send(Command::Unregister { id, ack: None }) {
            // The hub will still drop the connection on its next failed delivery
            debug!(connection_id = id, "Deferred unregistration: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FeedFrame;
    use serde_json::json;

    fn hub() -> HubHandle {
        Hub::spawn(HubConfig::default())
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = hub();
        let delivered = hub.publish_event("orders:empty", "order_created", json!({})).await.unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(hub.topic_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_once() {
        let hub = hub();
        let mut subscribers = Vec::new();
        for _ in 0..3 {
            subscribers.push(hub.subscribe("orders:a").await.unwrap());
        }
        let mut bystander = hub.subscribe("orders:b").await.unwrap();

        let delivered = hub.publish_event("orders:a", "order_updated", json!({"n": 1})).await.unwrap();
        assert_eq!(delivered, 3);

        for sub in &mut subscribers {
            let frame = sub.recv().await.unwrap();
            let value: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["channel"], "orders:a");
            assert_eq!(value["event"], "order_updated");
            assert!(sub.try_recv().is_none());
        }
        assert!(bystander.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_failed_delivery_unregisters_subscriber() {
        let hub = Hub::spawn(HubConfig {
            command_buffer: 16,
            subscriber_buffer: 1,
        });
        let mut reader = hub.subscribe("orders:a").await.unwrap();
        let mut stalled = hub.subscribe("orders:a").await.unwrap();

        assert_eq!(hub.publish_event("orders:a", "e", json!(1)).await.unwrap(), 2);
        reader.recv().await.unwrap();

        // `stalled` never drained its single slot
        assert_eq!(hub.publish_event("orders:a", "e", json!(2)).await.unwrap(), 1);
        assert_eq!(hub.subscriber_count("orders:a").await.unwrap(), 1);

        assert!(stalled.recv().await.is_some());
        assert!(stalled.recv().await.is_none());
        assert_eq!(stalled.state(), SubscriptionState::Unregistered);
    }

    #[tokio::test]
    async fn test_last_unregister_removes_topic() {
        let hub = hub();
        let mut a = hub.subscribe("orders:a").await.unwrap();
        let b = hub.subscribe("orders:a").await.unwrap();
        assert_eq!(hub.topic_count().await.unwrap(), 1);

        assert!(a.unregister().await.unwrap());
        assert_eq!(hub.subscriber_count("orders:a").await.unwrap(), 1);

        b.close().await;
        assert_eq!(hub.topic_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_unregistered() {
        let hub = hub();
        let sub = hub.subscribe("orders:a").await.unwrap();
        drop(sub);
        assert_eq!(hub.subscriber_count("orders:a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_frames_arrive_in_publish_order() {
        let hub = hub();
        let mut sub = hub.subscribe("order_feed:a").await.unwrap();

        for n in 0..5 {
            hub.publish("order_feed:a", FeedFrame::OrderUpdated(json!({"n": n}))).await.unwrap();
        }
        for n in 0..5 {
            let value: Value = serde_json::from_str(&sub.recv().await.unwrap()).unwrap();
            assert_eq!(value["type"], "order_updated");
            assert_eq!(value["payload"]["n"], n);
        }
    }

    #[tokio::test]
    async fn test_concurrent_registrations_are_all_visible() {
        let hub = hub();
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move { hub.subscribe("orders:busy").await.unwrap() }));
        }
        let mut subs = Vec::new();
        for task in tasks {
            subs.push(task.await.unwrap());
        }

        assert_eq!(hub.publish_event("orders:busy", "e", json!(null)).await.unwrap(), 20);
    }
}
