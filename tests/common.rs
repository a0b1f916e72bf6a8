#![allow(dead_code)]

use async_trait::async_trait;
use inbox_client::adapters::{InMemoryTransport, Transport, WorkspaceApi};
use inbox_client::config::SessionConfig;
use inbox_client::domain::{
    ChatContext, ConversationId, ConversationSummary, ConversationTarget, Message, UserId, WorkspaceId,
};
use inbox_client::error::{ClientError, Result};
use inbox_client::services::chat::{TimelineEntry, Viewport};
use inbox_client::services::{ChatSession, SessionEvent, SessionHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

static INIT: Once = Once::new();

pub const WORKSPACE: WorkspaceId = 7;
pub const VIEWER: UserId = 1;
pub const COUNTERPART: UserId = 2;
pub const CONVERSATION: &str = "c-42";
pub const ROW_HEIGHT: f64 = 10.0;

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("inbox_client=debug".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn msg(id: i64, user_id: UserId) -> Message {
    Message {
        message_id: id,
        user_id,
        message: format!("msg#{id}"),
        created_at: format!("2023-03-01T09:{:02}:00", id % 60),
    }
}

pub fn ids(messages: &[Message]) -> Vec<i64> {
    messages.iter().map(|m| m.message_id).collect()
}

/// Canned answer for one history cursor.
#[derive(Debug, Clone)]
pub enum PageReply {
    Page(Vec<Message>),
    Fail,
    WorkspaceGone,
}

/// Scripted backend. Cursors without a script answer with an empty page.
#[derive(Debug, Default)]
pub struct FakeWorkspaceApi {
    pages: Mutex<HashMap<u32, PageReply>>,
    page_delay: Mutex<Option<Duration>>,
    conversation: Mutex<Option<String>>,
    summaries: Mutex<Vec<ConversationSummary>>,
    summaries_gone: Mutex<bool>,
    history_calls: Mutex<Vec<u32>>,
    resolve_calls: AtomicUsize,
    summary_calls: AtomicUsize,
}

impl FakeWorkspaceApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_pages(pages: Vec<Vec<Message>>) -> Arc<Self> {
        let api = Self::new();
        for (cursor, page) in pages.into_iter().enumerate() {
            api.script(u32::try_from(cursor).unwrap(), PageReply::Page(page));
        }
        api
    }

    pub fn script(&self, cursor: u32, reply: PageReply) {
        self.pages.lock().unwrap().insert(cursor, reply);
    }

    pub fn delay_pages(&self, delay: Duration) {
        *self.page_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_conversation(&self, id: &str) {
        *self.conversation.lock().unwrap() = Some(id.to_string());
    }

    pub fn set_summaries(&self, summaries: Vec<ConversationSummary>) {
        *self.summaries.lock().unwrap() = summaries;
    }

    pub fn set_workspace_gone_on_summaries(&self) {
        *self.summaries_gone.lock().unwrap() = true;
    }

    pub fn history_calls(&self) -> Vec<u32> {
        self.history_calls.lock().unwrap().clone()
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkspaceApi for FakeWorkspaceApi {
    async fn resolve_conversation_id(&self, _workspace_id: WorkspaceId, _user_id: UserId) -> Result<ConversationId> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let conversation = self.conversation.lock().unwrap().clone();
        conversation.map(ConversationId::new).ok_or(ClientError::Api { status: 404, code: "C-01".to_string() })
    }

    async fn fetch_history_page(&self, _workspace_id: WorkspaceId, _user_id: UserId, cursor: u32) -> Result<Vec<Message>> {
        self.history_calls.lock().unwrap().push(cursor);
        let delay = *self.page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.pages.lock().unwrap().get(&cursor).cloned();
        match reply {
            None => Ok(Vec::new()),
            Some(PageReply::Page(page)) => Ok(page),
            Some(PageReply::Fail) => Err(ClientError::Api { status: 500, code: "S-01".to_string() }),
            Some(PageReply::WorkspaceGone) => Err(ClientError::WorkspaceGone),
        }
    }

    async fn fetch_conversation_summaries(&self, _workspace_id: WorkspaceId) -> Result<Vec<ConversationSummary>> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        if *self.summaries_gone.lock().unwrap() {
            return Err(ClientError::WorkspaceGone);
        }
        Ok(self.summaries.lock().unwrap().clone())
    }
}

/// What a [`RecordingViewport`] has been asked to do.
#[derive(Debug, Default)]
pub struct ViewportLog {
    pub rendered: Vec<Vec<i64>>,
    pub scrolls: Vec<f64>,
    pub rows: usize,
}

/// Viewport where every row is [`ROW_HEIGHT`] tall.
#[derive(Debug, Clone, Default)]
pub struct RecordingViewport {
    pub log: Arc<Mutex<ViewportLog>>,
}

impl RecordingViewport {
    pub fn scrolls(&self) -> Vec<f64> {
        self.log.lock().unwrap().scrolls.clone()
    }

    pub fn last_render(&self) -> Vec<i64> {
        self.log.lock().unwrap().rendered.last().cloned().unwrap_or_default()
    }
}

impl Viewport for RecordingViewport {
    fn render(&mut self, entries: &[TimelineEntry]) {
        let mut log = self.log.lock().unwrap();
        log.rows = entries.len();
        log.rendered.push(entries.iter().map(|e| e.message_id).collect());
    }

    fn scroll_height(&self) -> f64 {
        self.log.lock().unwrap().rows as f64 * ROW_HEIGHT
    }

    fn scroll_to(&mut self, offset: f64) {
        self.log.lock().unwrap().scrolls.push(offset);
    }
}

pub fn context(target: ConversationTarget) -> ChatContext {
    ChatContext { workspace_id: WORKSPACE, viewer_id: VIEWER, counterpart_id: COUNTERPART, target }
}

pub fn known() -> ConversationTarget {
    ConversationTarget::Known(ConversationId::new(CONVERSATION))
}

pub fn connected(memory: &Arc<InMemoryTransport>) -> watch::Sender<Option<Arc<dyn Transport>>> {
    let transport: Arc<dyn Transport> = memory.clone();
    watch::channel(Some(transport)).0
}

pub struct Harness {
    pub session: SessionHandle,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub viewport: RecordingViewport,
    pub connection: watch::Sender<Option<Arc<dyn Transport>>>,
}

pub fn mount(api: Arc<FakeWorkspaceApi>, connection: watch::Sender<Option<Arc<dyn Transport>>>, target: ConversationTarget) -> Harness {
    setup_tracing();
    let viewport = RecordingViewport::default();
    let (session, events) =
        ChatSession::spawn(context(target), api, connection.subscribe(), viewport.clone(), &SessionConfig::default());
    Harness { session, events, viewport, connection }
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("Timed out waiting for session event")
        .expect("Session event stream ended")
}

/// Skips events until one matches.
pub async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = next_event(events).await;
        if predicate(&event) {
            return event;
        }
    }
}

pub async fn wait_merged(events: &mut mpsc::UnboundedReceiver<SessionEvent>, cursor: u32) -> usize {
    match wait_for(events, |e| matches!(e, SessionEvent::HistoryMerged { cursor: c, .. } if *c == cursor)).await {
        SessionEvent::HistoryMerged { count, .. } => count,
        _ => unreachable!(),
    }
}

/// Scrolls the sentinel out of view and back in.
pub async fn reveal_sentinel(session: &SessionHandle) {
    session.sentinel_visibility(false).await.unwrap();
    session.sentinel_visibility(true).await.unwrap();
}

/// Asserts nothing else arrives for a short while.
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(150), events.recv()).await {
        panic!("Unexpected session event: {event:?}");
    }
}
