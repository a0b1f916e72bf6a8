#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use inbox_client::adapters::{HttpWorkspaceApi, WorkspaceApi};
use inbox_client::config::Config;
use inbox_client::domain::{ChatContext, ConversationId, ConversationTarget};
use inbox_client::services::chat::{Side, TimelineEntry, Viewport};
use inbox_client::services::{
    ChatSession, ConnectionManager, Connector, InboxHandle, InboxList, InboxWatcher, SessionEvent, StompConnector,
};
use inbox_client::telemetry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::Instrument;

const LINE_HEIGHT: f64 = 1.0;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Prints each timeline row once. Older pages show up below what is already on screen, marked as
/// history.
#[derive(Debug, Default)]
struct TerminalViewport {
    printed: HashSet<i64>,
    rows: usize,
    offset: f64,
}

impl Viewport for TerminalViewport {
    #[allow(clippy::print_stdout)]
    fn render(&mut self, entries: &[TimelineEntry]) {
        self.rows = entries.len();
        for entry in entries.iter().filter(|entry| !self.printed.contains(&entry.message_id)) {
            let clock = entry.clock.as_deref().unwrap_or("--:--");
            match entry.side {
                Side::Counterpart => println!("[{clock}] < {}", entry.body),
                Side::Viewer => println!("{:>40} > [{clock}]", entry.body),
            }
        }
        self.printed.extend(entries.iter().map(|entry| entry.message_id));
    }

    fn scroll_height(&self) -> f64 {
        f64::from(u32::try_from(self.rows).unwrap_or(u32::MAX)) * LINE_HEIGHT
    }

    fn scroll_to(&mut self, offset: f64) {
        self.offset = offset;
    }
}

#[allow(clippy::print_stdout)]
fn report(event: &SessionEvent, inbox: &InboxHandle) {
    match event {
        SessionEvent::ConversationResolved(id) => println!("-- conversation {id}"),
        SessionEvent::LinkChanged(link) => println!("-- link {link:?}"),
        SessionEvent::HistoryExhausted => println!("-- beginning of conversation"),
        SessionEvent::WorkspaceGone => println!("-- this workspace no longer exists"),
        SessionEvent::ConversationsRefreshed(summaries) => {
            inbox.replace_conversations(summaries.clone());
            for summary in summaries {
                println!("   {} ({}) {}", summary.user_name, summary.unread_messages, summary.message);
            }
        }
        _ => tracing::debug!(?event, "Session event"),
    }
}

fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            return;
        }
        tracing::info!("Interrupt received, shutting down");
        shutdown_tx.send_replace(true);
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx.clone());

    let boot_span = tracing::info_span!("boot_client", workspace.id = config.workspace_id);
    let (api, connections, connection_task, inbox, inbox_task) = async {
        let api: Arc<dyn WorkspaceApi> = Arc::new(HttpWorkspaceApi::new(&config.api)?);

        let connections = Arc::new(ConnectionManager::new(&config.transport));
        let connector: Arc<dyn Connector> = Arc::new(StompConnector::new(&config.transport, config.user_id));
        let connection_task = tokio::spawn({
            let connections = Arc::clone(&connections);
            let shutdown = shutdown_rx.clone();
            async move { connections.run(connector, shutdown).await }.instrument(tracing::info_span!("connection"))
        });

        let summaries = match api.fetch_conversation_summaries(config.workspace_id).await {
            Ok(summaries) => summaries,
            Err(e) if e.is_fatal_to_context() => anyhow::bail!("workspace {} no longer exists", config.workspace_id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load conversation list");
                Vec::new()
            }
        };
        let watcher = InboxWatcher::new(
            config.user_id,
            InboxList::new(config.workspace_id, summaries),
            connections.subscribe(),
            shutdown_rx.clone(),
        );
        let inbox = watcher.handle();
        let inbox_task = watcher.spawn();

        Ok::<_, anyhow::Error>((api, connections, connection_task, inbox, inbox_task))
    }
    .instrument(boot_span)
    .await?;

    let target = config
        .conversation
        .clone()
        .map_or(ConversationTarget::Lookup, |id| ConversationTarget::Known(ConversationId::new(id)));
    let context = ChatContext {
        workspace_id: config.workspace_id,
        viewer_id: config.user_id,
        counterpart_id: config.counterpart_id,
        target,
    };
    let (session, mut events) =
        ChatSession::spawn(context, api, connections.subscribe(), TerminalViewport::default(), &config.session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown = shutdown_rx.clone();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let sent = match line.trim() {
                    "/quit" => break,
                    // Simulates scrolling the sentinel out of and back into view.
                    "/older" => match session.sentinel_visibility(false).await {
                        Ok(()) => session.sentinel_visibility(true).await,
                        Err(e) => Err(e),
                    },
                    _ => match session.set_input(line).await {
                        Ok(()) => session.submit().await,
                        Err(e) => Err(e),
                    },
                };
                if sent.is_err() {
                    break;
                }
            }
            event = events.recv() => match event {
                Some(event) => {
                    report(&event, &inbox);
                    if event == SessionEvent::WorkspaceGone {
                        break;
                    }
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }

    let summary = session.close().await?;
    while let Ok(event) = events.try_recv() {
        report(&event, &inbox);
    }
    tracing::info!(
        history = summary.history.len(),
        live = summary.live.len(),
        workspace_gone = summary.workspace_gone,
        "Session finished"
    );

    shutdown_tx.send_replace(true);
    let background = async {
        let _ = tokio::join!(connection_task, inbox_task);
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, background).await.is_err() {
        tracing::warn!("Timeout waiting for background tasks to finish.");
    }

    telemetry_guard.shutdown();
    Ok(())
}
