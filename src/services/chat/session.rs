use crate::adapters::WorkspaceApi;
use crate::adapters::transport::{Headers, INBOX_DESTINATION, Transport, identity_headers};
use crate::config::SessionConfig;
use crate::domain::{
    ChatContext, ConversationId, ConversationSummary, ConversationTarget, HistoryState, LinkState, Message,
    OutboundMessage,
};
use crate::error::{ClientError, Result};
use crate::services::chat::composer::Composer;
use crate::services::chat::paginator::{HistoryPaginator, PageOutcome};
use crate::services::chat::scroll::{ScrollAnchor, Viewport};
use crate::services::chat::subscription::{LiveSubscription, Push};
use crate::services::chat::timeline::Timeline;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// The shared real-time connection as handed to consumers: `None` while disconnected.
pub type ConnectionWatch = watch::Receiver<Option<Arc<dyn Transport>>>;

#[derive(Clone, Debug)]
struct Metrics {
    pages_fetched_total: Counter<u64>,
    live_messages_total: Counter<u64>,
    malformed_payloads_total: Counter<u64>,
    published_total: Counter<u64>,
    active_sessions: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("inbox-client");
        Self {
            pages_fetched_total: meter
                .u64_counter("chat_history_pages_fetched_total")
                .with_description("Non-empty history pages merged into a timeline")
                .build(),
            live_messages_total: meter
                .u64_counter("chat_live_messages_total")
                .with_description("Messages received through live subscriptions")
                .build(),
            malformed_payloads_total: meter
                .u64_counter("chat_malformed_payloads_total")
                .with_description("Pushed payloads that did not parse as a message")
                .build(),
            published_total: meter
                .u64_counter("chat_messages_published_total")
                .with_description("Messages handed to the transport")
                .build(),
            active_sessions: meter
                .i64_up_down_counter("chat_active_sessions")
                .with_description("Number of mounted chat sessions")
                .build(),
        }
    }
}

/// Input a host feeds into a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// The sentinel near the top of the scroll region became visible or hidden.
    SentinelVisibility(bool),
    SetInput(String),
    Submit,
    /// Resolve the conversation again, e.g. after the host switched between lookup and a known id.
    Retarget(ConversationTarget),
    Close,
}

/// What a session reports back to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ConversationResolved(ConversationId),
    Subscribed { topic: String },
    LinkChanged(LinkState),
    HistoryMerged { cursor: u32, count: usize },
    HistoryExhausted,
    LiveAppended(Message),
    InputChanged(String),
    Published(OutboundMessage),
    /// The workspace was deleted or never existed. The host should show a blocking notice and
    /// navigate to workspace selection; the session has ended.
    WorkspaceGone,
    /// Inbox list fetched while the session was torn down.
    ConversationsRefreshed(Vec<ConversationSummary>),
}

/// Final timeline state, returned once the session task has finished.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub history: Vec<Message>,
    pub live: Vec<Message>,
    pub history_state: HistoryState,
    pub workspace_gone: bool,
}

enum Internal {
    Resolved { generation: u64, result: Result<ConversationId> },
    Page { cursor: u32, result: Result<Vec<Message>> },
}

/// Host-side handle of a running chat session.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// # Errors
    /// Returns `ClientError::SessionClosed` if the session already ended.
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| ClientError::SessionClosed)
    }

    /// # Errors
    /// Returns `ClientError::SessionClosed` if the session already ended.
    pub async fn sentinel_visibility(&self, visible: bool) -> Result<()> {
        self.send(SessionCommand::SentinelVisibility(visible)).await
    }

    /// # Errors
    /// Returns `ClientError::SessionClosed` if the session already ended.
    pub async fn set_input(&self, text: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::SetInput(text.into())).await
    }

    /// # Errors
    /// Returns `ClientError::SessionClosed` if the session already ended.
    pub async fn submit(&self) -> Result<()> {
        self.send(SessionCommand::Submit).await
    }

    /// # Errors
    /// Returns `ClientError::SessionClosed` if the session already ended.
    pub async fn retarget(&self, target: ConversationTarget) -> Result<()> {
        self.send(SessionCommand::Retarget(target)).await
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Unmounts the session and waits for its teardown.
    ///
    /// # Errors
    /// Returns `ClientError::SessionClosed` if the session task panicked or was cancelled.
    pub async fn close(self) -> Result<SessionReport> {
        // The task may already be gone (e.g. workspace deleted); the report is still there.
        let _ = self.commands.send(SessionCommand::Close).await;
        self.task.await.map_err(|e| {
            tracing::error!(error = %e, "Chat session task failed");
            ClientError::SessionClosed
        })
    }
}

/// Direct-message chat session: history paging, live subscription, timeline and composer, owned
/// by one task.
#[derive(Debug)]
pub struct ChatSession;

impl ChatSession {
    /// Mounts a session for `context` and starts loading the first history page.
    pub fn spawn<V>(
        context: ChatContext,
        api: Arc<dyn WorkspaceApi>,
        connection: ConnectionWatch,
        viewport: V,
        config: &SessionConfig,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>)
    where
        V: Viewport + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer_size);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::channel(config.command_buffer_size);

        let task = SessionTask {
            identity: identity_headers(context.viewer_id),
            timeline: Timeline::new(context.counterpart_id),
            context,
            api,
            connection,
            viewport,
            conversation: None,
            paginator: HistoryPaginator::new(),
            anchor: ScrollAnchor::default(),
            live: LiveSubscription::new(),
            composer: Composer::new(),
            events: events_tx,
            internal_tx,
            resolve_generation: 0,
            metrics: Metrics::new(),
        };

        let task = tokio::spawn(task.run(commands_rx, internal_rx));
        (SessionHandle { commands: commands_tx, task }, events_rx)
    }
}

struct SessionTask<V> {
    context: ChatContext,
    api: Arc<dyn WorkspaceApi>,
    connection: ConnectionWatch,
    viewport: V,
    identity: Headers,
    conversation: Option<ConversationId>,
    paginator: HistoryPaginator,
    timeline: Timeline,
    anchor: ScrollAnchor,
    live: LiveSubscription,
    composer: Composer,
    events: mpsc::UnboundedSender<SessionEvent>,
    internal_tx: mpsc::Sender<Internal>,
    resolve_generation: u64,
    metrics: Metrics,
}

impl<V: Viewport + 'static> SessionTask<V> {
    #[tracing::instrument(
        name = "chat_session",
        skip_all,
        fields(
            workspace.id = self.context.workspace_id,
            counterpart.id = self.context.counterpart_id,
            session.id = %Uuid::new_v4()
        )
    )]
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut internal: mpsc::Receiver<Internal>,
    ) -> SessionReport {
        self.metrics.active_sessions.add(1, &[]);
        tracing::info!("Chat session opened");

        let mut workspace_gone = self.resolve(self.context.target.clone()).await.is_break();
        if !workspace_gone {
            // Nothing is rendered yet, so the sentinel starts out on screen.
            self.on_sentinel(true);
        }

        let mut connection_open = true;
        while !workspace_gone {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    None | Some(SessionCommand::Close) => break,
                    Some(command) => workspace_gone = self.handle_command(command).await.is_break(),
                },

                Some(completion) = internal.recv() => {
                    workspace_gone = self.handle_internal(completion).await.is_break();
                }

                changed = self.connection.changed(), if connection_open => {
                    if changed.is_err() {
                        tracing::warn!("Connection coordinator went away");
                        connection_open = false;
                    }
                    self.bind_live().await;
                }

                payload = self.live.recv() => match payload {
                    Some(payload) => self.on_payload(&payload),
                    None => self.emit(SessionEvent::LinkChanged(LinkState::Disconnected)),
                },
            }
        }

        // Every exit path ends here: stop paging and give the topic back before anything else.
        self.paginator.detach();
        self.live.release();

        if !workspace_gone {
            workspace_gone = self.refresh_conversations().await.is_break();
        }

        self.metrics.active_sessions.add(-1, &[]);
        tracing::info!(workspace_gone, "Chat session closed");

        SessionReport {
            history: self.timeline.history().to_vec(),
            live: self.timeline.live().to_vec(),
            history_state: self.paginator.state(),
            workspace_gone,
        }
    }

    /// Unbounded, so a host that stops reading never stalls commands or pushes.
    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Host stopped listening to session events");
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) -> ControlFlow<()> {
        match command {
            SessionCommand::SentinelVisibility(visible) => self.on_sentinel(visible),
            SessionCommand::SetInput(text) => self.composer.set_input(text),
            SessionCommand::Submit => self.submit().await,
            SessionCommand::Retarget(target) => return self.resolve(target).await,
            SessionCommand::Close => {}
        }
        ControlFlow::Continue(())
    }

    async fn handle_internal(&mut self, completion: Internal) -> ControlFlow<()> {
        match completion {
            Internal::Resolved { generation, .. } if generation != self.resolve_generation => {
                tracing::debug!(generation, "Discarding superseded conversation lookup");
                ControlFlow::Continue(())
            }
            Internal::Resolved { result, .. } => self.on_resolved(result).await,
            Internal::Page { cursor, result } => self.on_page(cursor, result),
        }
    }

    /// Starts resolving `target`. The current subscription is dropped until the new id is known.
    async fn resolve(&mut self, target: ConversationTarget) -> ControlFlow<()> {
        self.resolve_generation += 1;
        if self.conversation.take().is_some() {
            let was_ready = self.live.link().is_ready();
            self.live.release();
            if was_ready {
                self.emit(SessionEvent::LinkChanged(LinkState::Disconnected));
            }
        }

        match target {
            ConversationTarget::Known(id) => self.on_resolved(Ok(id)).await,
            ConversationTarget::Lookup => {
                let generation = self.resolve_generation;
                let api = Arc::clone(&self.api);
                let tx = self.internal_tx.clone();
                let (workspace_id, counterpart_id) = (self.context.workspace_id, self.context.counterpart_id);
                tokio::spawn(
                    async move {
                        let result = api.resolve_conversation_id(workspace_id, counterpart_id).await;
                        let _ = tx.send(Internal::Resolved { generation, result }).await;
                    }
                    .instrument(tracing::debug_span!("resolve_conversation")),
                );
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_resolved(&mut self, result: Result<ConversationId>) -> ControlFlow<()> {
        match result {
            Ok(id) => {
                tracing::debug!(conversation = %id, "Conversation resolved");
                self.conversation = Some(id.clone());
                self.emit(SessionEvent::ConversationResolved(id));
                self.bind_live().await;
            }
            Err(e) if e.is_fatal_to_context() => return self.workspace_gone(),
            Err(e) => tracing::warn!(error = %e, "Failed to resolve conversation"),
        }
        ControlFlow::Continue(())
    }

    /// (Re)subscribes against the current connection and conversation.
    async fn bind_live(&mut self) {
        let transport = self.connection.borrow_and_update().clone();
        let before = self.live.link();

        let bound = self.live.bind(transport.as_ref(), self.conversation.as_ref(), &self.identity).await;
        match bound {
            Ok(()) => {
                if let Some(topic) = self.live.topic() {
                    let topic = topic.to_string();
                    self.emit(SessionEvent::Subscribed { topic });
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to subscribe to conversation"),
        }

        let after = self.live.link();
        if before != after {
            self.emit(SessionEvent::LinkChanged(after));
        }
    }

    fn on_sentinel(&mut self, visible: bool) {
        let Some(cursor) = self.paginator.observe(visible) else {
            return;
        };

        // Height before the page lands; restored against after the merge.
        self.anchor.capture(&self.viewport);

        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        let (workspace_id, counterpart_id) = (self.context.workspace_id, self.context.counterpart_id);
        tokio::spawn(
            async move {
                let result = api.fetch_history_page(workspace_id, counterpart_id, cursor).await;
                // Fails only when the session is gone; the page is dropped with it.
                let _ = tx.send(Internal::Page { cursor, result }).await;
            }
            .instrument(tracing::debug_span!("history_fetch", cursor)),
        );
    }

    fn on_page(&mut self, cursor: u32, result: Result<Vec<Message>>) -> ControlFlow<()> {
        let page = match result {
            Ok(page) => page,
            Err(e) if e.is_fatal_to_context() => return self.workspace_gone(),
            Err(e) => {
                tracing::warn!(error = %e, cursor, "Failed to fetch history page");
                self.paginator.fail(cursor);
                return ControlFlow::Continue(());
            }
        };

        match self.paginator.complete(cursor, page.len()) {
            PageOutcome::Merge { cursor } => {
                let count = page.len();
                self.metrics.pages_fetched_total.add(1, &[]);
                self.timeline.prepend_page(page);
                self.render();
                if cursor == 0 {
                    // First entry into the conversation lands on the latest message.
                    self.viewport.scroll_to_bottom();
                } else {
                    self.anchor.restore(&mut self.viewport);
                }
                tracing::debug!(cursor, count, "History page merged");
                self.emit(SessionEvent::HistoryMerged { cursor, count });
            }
            PageOutcome::Exhausted => {
                tracing::debug!(cursor, "History exhausted");
                self.emit(SessionEvent::HistoryExhausted);
            }
            PageOutcome::Stale => tracing::debug!(cursor, "Discarding page for a cursor that is not outstanding"),
        }
        ControlFlow::Continue(())
    }

    fn on_payload(&mut self, payload: &str) {
        let before = self.live.link();
        match self.live.accept(payload) {
            Push::Message(message) => {
                self.metrics.live_messages_total.add(1, &[]);
                self.timeline.push_live(message.clone());
                self.render();
                self.viewport.scroll_to_bottom();
                self.emit(SessionEvent::LiveAppended(message));
            }
            Push::Malformed => {
                self.metrics.malformed_payloads_total.add(1, &[]);
                if before.is_ready() {
                    self.emit(SessionEvent::LinkChanged(LinkState::Disconnected));
                }
            }
        }
    }

    async fn submit(&mut self) {
        let Some(conversation) = self.conversation.clone() else {
            tracing::debug!("Submit ignored: conversation not resolved");
            return;
        };
        let Some(text) = self.composer.submit(self.live.link()) else {
            tracing::debug!(link = ?self.live.link(), "Submit rejected");
            return;
        };
        self.emit(SessionEvent::InputChanged(String::new()));

        let outbound =
            OutboundMessage { conversation_id: conversation, message: text, workspace_id: self.context.workspace_id };
        let body = match serde_json::to_string(&outbound) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode outbound message");
                return;
            }
        };

        let transport = self.connection.borrow().clone();
        let Some(transport) = transport else {
            tracing::warn!("Submit dropped: no connection");
            return;
        };
        match transport.publish(INBOX_DESTINATION, &self.identity, body).await {
            Ok(()) => {
                self.metrics.published_total.add(1, &[]);
                self.emit(SessionEvent::Published(outbound));
            }
            Err(e) => tracing::warn!(error = %e, "Failed to publish message"),
        }
    }

    async fn refresh_conversations(&mut self) -> ControlFlow<()> {
        match self.api.fetch_conversation_summaries(self.context.workspace_id).await {
            Ok(summaries) => {
                self.emit(SessionEvent::ConversationsRefreshed(summaries));
                ControlFlow::Continue(())
            }
            Err(e) if e.is_fatal_to_context() => {
                self.emit(SessionEvent::WorkspaceGone);
                ControlFlow::Break(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh conversation list");
                ControlFlow::Continue(())
            }
        }
    }

    fn workspace_gone(&self) -> ControlFlow<()> {
        tracing::warn!("Workspace no longer exists, leaving conversation");
        self.emit(SessionEvent::WorkspaceGone);
        ControlFlow::Break(())
    }

    fn render(&mut self) {
        let entries = self.timeline.entries();
        self.viewport.render(&entries);
    }
}
