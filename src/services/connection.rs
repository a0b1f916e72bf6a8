use crate::adapters::transport::{Headers, StompClient, Transport, identity_headers};
use crate::config::TransportConfig;
use crate::domain::UserId;
use crate::error::Result;
use crate::services::chat::ConnectionWatch;
use crate::services::shutdown_requested;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone, Debug)]
struct Metrics {
    connects_total: Counter<u64>,
    connect_failures_total: Counter<u64>,
    connected: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("inbox-client");
        Self {
            connects_total: meter
                .u64_counter("transport_connects_total")
                .with_description("Successful transport connections")
                .build(),
            connect_failures_total: meter
                .u64_counter("transport_connect_failures_total")
                .with_description("Failed transport connection attempts")
                .build(),
            connected: meter
                .i64_up_down_counter("transport_connected")
                .with_description("Whether the shared transport is currently connected")
                .build(),
        }
    }
}

/// Opens a new transport connection.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    async fn connect(&self) -> Result<Arc<dyn Transport>>;
}

/// Connects to the STOMP broker as one user.
#[derive(Debug, Clone)]
pub struct StompConnector {
    config: TransportConfig,
    identity: Headers,
}

impl StompConnector {
    #[must_use]
    pub fn new(config: &TransportConfig, user_id: UserId) -> Self {
        Self { config: config.clone(), identity: identity_headers(user_id) }
    }
}

#[async_trait]
impl Connector for StompConnector {
    async fn connect(&self) -> Result<Arc<dyn Transport>> {
        let client = StompClient::connect(&self.config, &self.identity).await?;
        Ok(Arc::new(client))
    }
}

/// Single owner of the process-wide transport connection.
///
/// Consumers never open connections themselves; they watch [`ConnectionManager::subscribe`] and
/// (re)bind whenever the published connection changes.
#[derive(Debug)]
pub struct ConnectionManager {
    current: watch::Sender<Option<Arc<dyn Transport>>>,
    min_backoff: Duration,
    max_backoff: Duration,
    metrics: Metrics,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(config: &TransportConfig) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            min_backoff: Duration::from_millis(config.min_backoff_ms),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> ConnectionWatch {
        self.current.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn Transport>> {
        self.current.borrow().clone()
    }

    /// Keeps a connection up until `shutdown` flips to `true`: connects with exponential backoff,
    /// publishes the connection, waits for it to close, withdraws it and starts over.
    pub async fn run(&self, connector: Arc<dyn Connector>, mut shutdown: watch::Receiver<bool>) {
        let retry_strategy = ExponentialBuilder::default()
            .with_min_delay(self.min_backoff)
            .with_max_delay(self.max_backoff)
            .without_max_times();

        while !*shutdown.borrow() {
            let attempt = (|| async { connector.connect().await })
                .retry(&retry_strategy)
                .notify(|e, duration| {
                    self.metrics.connect_failures_total.add(1, &[]);
                    tracing::warn!(error = %e, retry_in = ?duration, "Failed to connect transport, retrying...");
                });

            let transport = tokio::select! {
                result = attempt => match result {
                    Ok(transport) => transport,
                    Err(e) => {
                        tracing::error!(error = %e, "Transport connection failed after retries");
                        break;
                    }
                },
                () = shutdown_requested(&mut shutdown) => break,
            };

            tracing::info!("Transport connected");
            self.metrics.connects_total.add(1, &[]);
            self.metrics.connected.add(1, &[]);
            self.current.send_replace(Some(Arc::clone(&transport)));

            let stopping = tokio::select! {
                () = transport.closed() => {
                    tracing::warn!("Transport connection lost, reconnecting...");
                    false
                }
                () = shutdown_requested(&mut shutdown) => true,
            };

            self.current.send_replace(None);
            self.metrics.connected.add(-1, &[]);
            if stopping {
                break;
            }
        }

        self.current.send_replace(None);
        tracing::info!("Connection manager stopped");
    }
}
