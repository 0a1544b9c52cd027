//! Event bus primitives.
//!
//! Notifications are published onto named topics of a single in-process
//! broadcast channel. Publishing never blocks and never waits for consumers;
//! callers treat a failed publish as something to log, not to propagate.

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// A message published on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("no subscriber is listening on topic '{0}'")]
    NoSubscribers(String),
}

/// Fire-and-forget publishing seam used by services.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: String) -> Result<(), EventError>;
}

/// Broadcast-backed topic bus shared by every module.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
    enabled: bool,
}

impl EventBus {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Receive every notification published on `topic` from now on.
    pub fn subscribe(&self, topic: impl Into<String>) -> Subscription {
        Subscription {
            topic: topic.into(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Spawn a task that logs each notification arriving on `topic`.
    pub fn spawn_listener(&self, topic: impl Into<String>) -> JoinHandle<()> {
        let mut subscription = self.subscribe(topic);
        tokio::spawn(async move {
            while let Some(notification) = subscription.next().await {
                tracing::info!(
                    topic = %notification.topic,
                    payload = %notification.payload,
                    "received notification"
                );
            }
            tracing::debug!(topic = %subscription.topic, "notification listener finished");
        })
    }
}

impl Publisher for EventBus {
    fn publish(&self, topic: &str, payload: String) -> Result<(), EventError> {
        if !self.enabled {
            tracing::info!(topic, %payload, "notification skipped");
            return Ok(());
        }

        tracing::info!(topic, %payload, "sending notification");
        self.sender
            .send(Notification {
                topic: topic.to_string(),
                payload,
            })
            .map(|_| ())
            .map_err(|_| EventError::NoSubscribers(topic.to_string()))
    }
}

/// Topic-filtered receiver handed out by [`EventBus::subscribe`].
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<Notification>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next notification on this topic, or `None` once the bus is dropped.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) if notification.topic == self.topic => return Some(notification),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "notification listener lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
