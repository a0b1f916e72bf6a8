use crate::adapters::transport::{Headers, Subscription, Transport, inbox_topic};
use crate::domain::{ConversationId, LinkState, Message};
use crate::error::Result;
use std::sync::Arc;

/// What a pushed payload turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Push {
    Message(Message),
    /// `null` or unparsable. The link is marked not ready.
    Malformed,
}

/// The single live subscription of a chat session.
#[derive(Debug, Default)]
pub struct LiveSubscription {
    current: Option<Subscription>,
    link: LinkState,
}

impl LiveSubscription {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn link(&self) -> LinkState {
        self.link
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.current.as_ref().map(Subscription::topic)
    }

    /// Replaces the current subscription. The old one is always released first; a new one is only
    /// made when both the conversation and a connection are present.
    ///
    /// # Errors
    /// Returns an error if the transport rejects the subscription. The link is then not ready.
    pub async fn bind(
        &mut self,
        transport: Option<&Arc<dyn Transport>>,
        conversation: Option<&ConversationId>,
        headers: &Headers,
    ) -> Result<()> {
        self.release();

        let (Some(transport), Some(conversation)) = (transport, conversation) else {
            return Ok(());
        };

        let subscription = transport.subscribe(&inbox_topic(conversation), headers).await?;
        tracing::info!(topic = %subscription.topic(), "Live subscription established");
        self.current = Some(subscription);
        self.link = LinkState::Connected;
        Ok(())
    }

    /// Unsubscribes, if subscribed. Late pushes for the old topic go nowhere afterwards.
    pub fn release(&mut self) {
        if let Some(subscription) = self.current.take() {
            subscription.unsubscribe();
        }
        self.link = LinkState::Disconnected;
    }

    /// Waits for the next payload. Pending forever while unsubscribed; `None` when the transport
    /// ended the stream, after which the subscription is dropped and the link is not ready.
    pub async fn recv(&mut self) -> Option<String> {
        let Some(subscription) = self.current.as_mut() else {
            return std::future::pending().await;
        };
        let payload = subscription.recv().await;
        if payload.is_none() {
            tracing::warn!(topic = %subscription.topic(), "Live subscription ended by transport");
            self.release();
        }
        payload
    }

    /// Parses a pushed payload. Anything that is not a message flips the link to not ready.
    pub fn accept(&mut self, payload: &str) -> Push {
        match serde_json::from_str::<Option<Message>>(payload) {
            Ok(Some(message)) => Push::Message(message),
            Ok(None) => {
                tracing::warn!("Received empty push payload");
                self.link = LinkState::Disconnected;
                Push::Malformed
            }
            Err(e) => {
                tracing::warn!(error = %e, "Received unparsable push payload");
                self.link = LinkState::Disconnected;
                Push::Malformed
            }
        }
    }
}
