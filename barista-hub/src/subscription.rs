use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::hub::{Command, ConnectionId, HubError, HubHandle, Outbox};

/// Lifecycle of one live connection.
///
/// `Connecting → Registered → Unregistered`, with `Closed` reachable from any
/// state through [`Subscription::close`]. A closed subscription is consumed;
/// reconnecting needs a fresh one from [`HubHandle::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Registered,
    Unregistered,
    Closed,
}

/// A connection's view of the hub: its id, its topic and the frames queued for it.
pub struct Subscription {
    id: ConnectionId,
    topic: String,
    state: SubscriptionState,
    hub: HubHandle,
    outbox: Option<Outbox>,
    inbox: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    pub(crate) fn new(id: ConnectionId, topic: String, hub: HubHandle, buffer: usize) -> Self {
        let (outbox, inbox) = mpsc::channel(buffer);
        Self {
            id,
            topic,
            state: SubscriptionState::Connecting,
            hub,
            outbox: Some(outbox),
            inbox,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Hands the outbox to the hub; returns once the hub has recorded it.
    pub async fn register(&mut self) -> Result<(), HubError> {
        let invalid = HubError::InvalidState {
            id: self.id,
            state: self.state,
        };
        if self.state != SubscriptionState::Connecting {
            return Err(invalid);
        }
        let outbox = self.outbox.take().ok_or(invalid)?;

        let (ack, registered) = oneshot::channel();
        self.hub
            .send(Command::Register {
                id: self.id,
                topic: self.topic.clone(),
                outbox,
                ack,
            })
            .await?;
        registered.await.map_err(|_| HubError::Closed)?;

        self.state = SubscriptionState::Registered;
        Ok(())
    }

    /// Next frame for this connection.
    ///
    /// Returns `None` once the hub has let go of the connection and every
    /// frame queued before that has been read.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        if !matches!(self.state, SubscriptionState::Registered | SubscriptionState::Unregistered) {
            return None;
        }
        let frame = self.inbox.recv().await;
        if frame.is_none() && self.state == SubscriptionState::Registered {
            self.state = SubscriptionState::Unregistered;
        }
        frame
    }

    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        if self.state == SubscriptionState::Connecting {
            return None;
        }
        self.inbox.try_recv().ok()
    }

    /// Returns whether the hub still had this connection registered.
    pub async fn unregister(&mut self) -> Result<bool, HubError> {
        if self.state != SubscriptionState::Registered {
            return Ok(false);
        }

        let (ack, removed) = oneshot::channel();
        self.hub
            .send(Command::Unregister {
                id: self.id,
                ack: Some(ack),
            })
            .await?;
        let removed = removed.await.map_err(|_| HubError::Closed)?;

        self.state = SubscriptionState::Unregistered;
        Ok(removed)
    }

    pub async fn close(mut self) {
        if let Err(e) = self.unregister().await {
            tracing::debug!(connection_id = self.id, "Unregister on close failed: {}", e);
        }
        self.state = SubscriptionState::Closed;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.state == SubscriptionState::Registered {
            self.hub.unregister_detached(self.id);
        }
    }
}
