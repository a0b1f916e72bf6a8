pub mod frame;

use crate::adapters::transport::{Headers, Subscription, Transport};
use crate::config::TransportConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use frame::{Command, Frame};
use futures::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tracing::Instrument;

const STOMP_VERSION: &str = "1.2";

type Routes = Arc<DashMap<String, mpsc::Sender<String>>>;

/// STOMP 1.2 client over a single WebSocket connection.
///
/// One reader task routes MESSAGE frames to subscriptions by their `subscription` header, one
/// writer task serializes every outbound frame.
#[derive(Debug)]
pub struct StompClient {
    outbound_tx: mpsc::Sender<Frame>,
    routes: Routes,
    next_id: AtomicU64,
    subscription_buffer_size: usize,
    closed_tx: Arc<watch::Sender<bool>>,
    reader: JoinHandle<()>,
}

impl StompClient {
    /// Opens the WebSocket, performs the CONNECT handshake and starts the I/O tasks.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be opened, the broker answers with ERROR, or no
    /// CONNECTED frame arrives within the configured timeout.
    #[tracing::instrument(skip(config, identity), fields(url = %config.ws_url))]
    pub async fn connect(config: &TransportConfig, identity: &Headers) -> Result<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(config.ws_url.as_str()).await.map_err(Box::new)?;
        let (mut ws_sink, mut ws_stream) = socket.split();

        let host = reqwest::Url::parse(&config.ws_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());
        let connect = Frame::new(Command::Connect)
            .header("accept-version", STOMP_VERSION)
            .header("host", host)
            .header("heart-beat", "0,0")
            .headers(identity);
        ws_sink.send(WsMessage::Text(connect.encode().into())).await.map_err(Box::new)?;

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let connected = tokio::time::timeout(timeout, Self::await_connected(&mut ws_stream))
            .await
            .map_err(|_| ClientError::Transport("timed out waiting for CONNECTED".to_string()))??;
        tracing::info!(version = connected.get("version").unwrap_or(STOMP_VERSION), "STOMP session established");

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(config.outbound_buffer_size);
        let (closed_tx, closed_rx) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);
        let routes: Routes = Arc::new(DashMap::new());

        let mut writer_closed = closed_rx;
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        frame = outbound_rx.recv() => {
                            let Some(frame) = frame else { break };
                            tracing::trace!(command = %frame.command, "Sending frame");
                            if ws_sink.send(WsMessage::Text(frame.encode().into())).await.is_err() {
                                break;
                            }
                        }
                        () = connection_closed(&mut writer_closed) => break,
                    }
                }
                let _ = ws_sink.close().await;
            }
            .instrument(tracing::debug_span!("stomp_writer")),
        );

        let reader_routes = Arc::clone(&routes);
        let reader_closed = Arc::clone(&closed_tx);
        let reader = tokio::spawn(
            async move {
                Self::run_reader(ws_stream, &reader_routes).await;
                // Ending every subscription stream tells consumers the connection is gone.
                reader_routes.clear();
                reader_closed.send_replace(true);
                tracing::info!("STOMP connection closed");
            }
            .instrument(tracing::debug_span!("stomp_reader")),
        );

        Ok(Self {
            outbound_tx,
            routes,
            next_id: AtomicU64::new(1),
            subscription_buffer_size: config.subscription_buffer_size,
            closed_tx,
            reader,
        })
    }

    async fn await_connected<S>(stream: &mut S) -> Result<Frame>
    where
        S: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        while let Some(msg) = stream.next().await {
            match msg.map_err(Box::new)? {
                WsMessage::Text(text) => match Frame::decode(text.as_str())? {
                    Some(frame) if frame.command == Command::Connected => return Ok(frame),
                    Some(frame) if frame.command == Command::Error => {
                        let reason = frame.get("message").unwrap_or(frame.body.as_str()).to_string();
                        return Err(ClientError::Transport(format!("broker refused connection: {reason}")));
                    }
                    Some(frame) => tracing::warn!(command = %frame.command, "Unexpected frame before CONNECTED"),
                    None => {}
                },
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
        Err(ClientError::Transport("connection closed before CONNECTED".to_string()))
    }

    async fn run_reader<S>(mut stream: S, routes: &Routes)
    where
        S: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        while let Some(msg) = stream.next().await {
            let text = match msg {
                Ok(WsMessage::Text(text)) => text.as_str().to_string(),
                Ok(WsMessage::Binary(bin)) => match String::from_utf8(bin.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        tracing::warn!("Received non UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };

            let frame = match Frame::decode(&text) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to decode STOMP frame");
                    continue;
                }
            };

            match frame.command {
                Command::Message => Self::dispatch(routes, frame),
                Command::Error => {
                    tracing::warn!(
                        reason = frame.get("message").unwrap_or_default(),
                        body = %frame.body,
                        "Broker reported an error"
                    );
                    break;
                }
                Command::Receipt | Command::Connected => tracing::debug!(command = %frame.command, "Ignoring frame"),
                other => tracing::warn!(command = %other, "Unexpected frame from broker"),
            }
        }
    }

    fn dispatch(routes: &Routes, frame: Frame) {
        let Some(id) = frame.get("subscription").map(str::to_string) else {
            tracing::warn!("MESSAGE frame without subscription header");
            return;
        };
        let Some(tx) = routes.get(id.as_str()).map(|route| route.value().clone()) else {
            tracing::debug!(subscription.id = %id, "MESSAGE for a released subscription");
            return;
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(frame.body) {
            tracing::warn!(subscription.id = %id, "Dropped push due to full subscription buffer");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    async fn send_frame(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Transport("connection closed".to_string()));
        }
        self.outbound_tx.send(frame).await.map_err(|_| ClientError::Transport("connection closed".to_string()))
    }
}

#[async_trait]
impl Transport for StompClient {
    #[tracing::instrument(level = "debug", skip(self, headers))]
    async fn subscribe(&self, topic: &str, headers: &Headers) -> Result<Subscription> {
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.subscription_buffer_size);
        self.routes.insert(id.clone(), tx);

        let frame = Frame::new(Command::Subscribe)
            .header("id", id.as_str())
            .header("destination", topic)
            .header("ack", "auto")
            .headers(headers);
        if let Err(e) = self.send_frame(frame).await {
            self.routes.remove(&id);
            return Err(e);
        }

        let routes = Arc::clone(&self.routes);
        let outbound = self.outbound_tx.downgrade();
        let release_id = id.clone();
        Ok(Subscription::new(id, topic, rx, move || {
            routes.remove(&release_id);
            if let Some(outbound) = outbound.upgrade() {
                let frame = Frame::new(Command::Unsubscribe).header("id", release_id.as_str());
                if outbound.try_send(frame).is_err() {
                    tracing::warn!(subscription.id = %release_id, "Could not queue UNSUBSCRIBE");
                }
            }
        }))
    }

    #[tracing::instrument(level = "debug", skip(self, headers, body))]
    async fn publish(&self, destination: &str, headers: &Headers, body: String) -> Result<()> {
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .headers(headers)
            .body(body);
        self.send_frame(frame).await
    }

    async fn closed(&self) {
        connection_closed(&mut self.closed_tx.subscribe()).await;
    }
}

/// Resolves once the flag is set or its sender is gone. Returns no borrow of the flag, so callers
/// stay `Send` across later awaits.
async fn connection_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|&closed| closed).await;
}

impl Drop for StompClient {
    fn drop(&mut self) {
        // The writer sees the flag, closes the socket and exits on its own.
        self.routes.clear();
        self.closed_tx.send_replace(true);
        self.reader.abort();
    }
}
