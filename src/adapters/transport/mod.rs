use crate::domain::{ConversationId, UserId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;

pub mod memory;
pub mod stomp;

pub use memory::InMemoryTransport;
pub use stomp::StompClient;

/// Transport headers attached to subscribe and publish frames.
pub type Headers = BTreeMap<String, String>;

pub const USER_ID_HEADER: &str = "userId";
pub const INBOX_TOPIC_PREFIX: &str = "/sub/inbox/";
pub const UNREAD_TOPIC_PREFIX: &str = "/sub/unread-message/";
pub const INBOX_DESTINATION: &str = "/pub/inbox";

#[must_use]
pub fn inbox_topic(conversation: &ConversationId) -> String {
    format!("{INBOX_TOPIC_PREFIX}{conversation}")
}

#[must_use]
pub fn unread_topic(user_id: UserId) -> String {
    format!("{UNREAD_TOPIC_PREFIX}{user_id}")
}

/// Identity metadata the broker expects on every frame from this user.
#[must_use]
pub fn identity_headers(user_id: UserId) -> Headers {
    let mut headers = Headers::new();
    headers.insert(USER_ID_HEADER.to_string(), user_id.to_string());
    headers
}

/// A multiplexed publish/subscribe connection shared by every part of the client.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Subscribes to `topic`. Payload bodies arrive on the returned handle until it is dropped.
    async fn subscribe(&self, topic: &str, headers: &Headers) -> Result<Subscription>;

    /// Publishes `body` to `destination`.
    async fn publish(&self, destination: &str, headers: &Headers, body: String) -> Result<()>;

    /// Resolves once the connection is gone for good.
    async fn closed(&self);
}

type Release = Box<dyn FnOnce() + Send + Sync>;

/// Handle of an active subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: String,
    topic: String,
    rx: mpsc::Receiver<String>,
    release: Option<Release>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        rx: mpsc::Receiver<String>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self { id: id.into(), topic: topic.into(), rx, release: Some(Box::new(release)) }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next pushed payload body. `None` once the transport stopped delivering.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Close first so nothing lands in the buffer while the transport forgets the route.
        self.rx.close();
        if let Some(release) = self.release.take() {
            tracing::debug!(topic = %self.topic, subscription.id = %self.id, "Unsubscribing");
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).field("topic", &self.topic).finish_non_exhaustive()
    }
}
