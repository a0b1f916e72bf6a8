use crate::adapters::transport::{Headers, Subscription, identity_headers, unread_topic};
use crate::domain::{ConversationSummary, UnreadEvent, UserId, WorkspaceId};
use crate::services::chat::ConnectionWatch;
use crate::services::shutdown_requested;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Conversation list of the open workspace plus the unread badge of every workspace seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboxList {
    workspace_id: WorkspaceId,
    conversations: Vec<ConversationSummary>,
    badges: BTreeMap<WorkspaceId, bool>,
}

impl InboxList {
    #[must_use]
    pub const fn new(workspace_id: WorkspaceId, conversations: Vec<ConversationSummary>) -> Self {
        Self { workspace_id, conversations, badges: BTreeMap::new() }
    }

    #[must_use]
    pub const fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    #[must_use]
    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    /// `None` until an event for `workspace_id` has been seen.
    #[must_use]
    pub fn has_unread(&self, workspace_id: WorkspaceId) -> Option<bool> {
        self.badges.get(&workspace_id).copied()
    }

    pub fn replace_conversations(&mut self, conversations: Vec<ConversationSummary>) {
        self.conversations = conversations;
    }

    /// Folds one unread push into the list.
    pub fn apply(&mut self, event: &UnreadEvent) {
        self.badges.insert(event.workspace_id(), event.workspace_has_unread());

        // Counters and rows only track the workspace that is open.
        if event.workspace_id() != self.workspace_id {
            return;
        }

        match event {
            UnreadEvent::NewMessage { uuid, sender_id, last_message, .. }
                if self.conversations.iter().any(|c| &c.uuid == uuid) =>
            {
                // Rows are matched by sender here, not by conversation.
                for summary in self.conversations.iter_mut().filter(|c| c.user_id == *sender_id) {
                    summary.unread_messages += 1;
                    summary.message.clone_from(last_message);
                }
            }
            // Only reached for the open workspace, so a conversation from another workspace never
            // lands in this list; its workspace only gets the badge above.
            UnreadEvent::NewMessage { uuid, sender_id, sender_name, sender_image, last_message, last_chat, .. } => {
                self.conversations.insert(
                    0,
                    ConversationSummary {
                        uuid: uuid.clone(),
                        user_id: *sender_id,
                        user_name: sender_name.clone(),
                        user_image: sender_image.clone(),
                        message: last_message.clone(),
                        last_chat: last_chat.clone(),
                        unread_messages: 1,
                    },
                );
            }
            UnreadEvent::Read { uuid, .. } => {
                for summary in self.conversations.iter_mut().filter(|c| &c.uuid == uuid) {
                    summary.unread_messages = 0;
                }
            }
        }
    }
}

/// Keeps an [`InboxList`] in sync with the viewer's unread topic.
#[derive(Debug)]
pub struct InboxWatcher {
    user_id: UserId,
    identity: Headers,
    connection: ConnectionWatch,
    state: Arc<watch::Sender<InboxList>>,
    shutdown: watch::Receiver<bool>,
}

/// Read side of a running [`InboxWatcher`].
#[derive(Debug, Clone)]
pub struct InboxHandle {
    state: Arc<watch::Sender<InboxList>>,
}

impl InboxHandle {
    #[must_use]
    pub fn snapshot(&self) -> InboxList {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<InboxList> {
        self.state.subscribe()
    }

    /// Swaps in a freshly fetched conversation list, e.g. after a chat session closed.
    pub fn replace_conversations(&self, conversations: Vec<ConversationSummary>) {
        self.state.send_modify(|list| list.replace_conversations(conversations));
    }
}

impl InboxWatcher {
    #[must_use]
    pub fn new(
        user_id: UserId,
        initial: InboxList,
        connection: ConnectionWatch,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        Self { user_id, identity: identity_headers(user_id), connection, state: Arc::new(state), shutdown }
    }

    #[must_use]
    pub fn handle(&self) -> InboxHandle {
        InboxHandle { state: Arc::clone(&self.state) }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        let span = tracing::info_span!("inbox_watcher", user.id = self.user_id);
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(mut self) {
        let mut subscription = self.bind().await;

        loop {
            tokio::select! {
                biased;

                () = shutdown_requested(&mut self.shutdown) => break,

                changed = self.connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // Release before binding again so the broker never sees two subscriptions.
                    drop(subscription.take());
                    subscription = self.bind().await;
                }

                payload = next_payload(subscription.as_mut()) => match payload {
                    Some(payload) => self.on_payload(&payload),
                    None => {
                        tracing::warn!("Unread subscription ended by transport");
                        subscription = None;
                    }
                },
            }
        }

        drop(subscription);
        tracing::debug!("Inbox watcher stopped");
    }

    async fn bind(&mut self) -> Option<Subscription> {
        let transport = self.connection.borrow_and_update().clone()?;
        match transport.subscribe(&unread_topic(self.user_id), &self.identity).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to subscribe to unread topic");
                None
            }
        }
    }

    fn on_payload(&self, payload: &str) {
        match serde_json::from_str::<UnreadEvent>(payload) {
            Ok(event) => {
                tracing::debug!(workspace.id = event.workspace_id(), "Unread event received");
                self.state.send_modify(|list| list.apply(&event));
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring unparsable unread payload"),
        }
    }
}

async fn next_payload(subscription: Option<&mut Subscription>) -> Option<String> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
