use crate::adapters::transport::{Headers, Subscription, Transport};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// A frame handed to [`InMemoryTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFrame {
    pub destination: String,
    pub headers: Headers,
    pub body: String,
}

#[derive(Debug)]
struct Route {
    topic: String,
    tx: mpsc::Sender<String>,
}

/// In-process transport. Nothing is relayed on its own: published frames are recorded, and
/// pushes are injected with [`InMemoryTransport::deliver`].
#[derive(Debug)]
pub struct InMemoryTransport {
    // Subscription id -> route. Shared with the release closures of live subscriptions.
    routes: Arc<DashMap<u64, Route>>,
    published: Mutex<Vec<PublishedFrame>>,
    next_id: AtomicU64,
    buffer_size: usize,
    closed_tx: watch::Sender<bool>,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            routes: Arc::new(DashMap::new()),
            published: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            buffer_size,
            closed_tx,
        }
    }

    /// Pushes `body` to every subscriber of `topic`. Returns how many received it.
    pub fn deliver(&self, topic: &str, body: &str) -> usize {
        let mut delivered = 0;
        for route in self.routes.iter().filter(|route| route.topic == topic) {
            if route.tx.try_send(body.to_string()).is_ok() {
                delivered += 1;
            } else {
                tracing::warn!(topic = %topic, "Dropped push for full or closed subscription");
            }
        }
        delivered
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.routes.iter().filter(|route| route.topic == topic).count()
    }

    /// Every frame published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedFrame> {
        self.published.lock().map(|frames| frames.clone()).unwrap_or_default()
    }

    /// Simulates the connection going away: every subscription stream ends.
    pub fn close(&self) {
        self.routes.clear();
        self.closed_tx.send_replace(true);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn subscribe(&self, topic: &str, _headers: &Headers) -> Result<Subscription> {
        if self.is_closed() {
            return Err(ClientError::Transport("connection closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer_size);
        self.routes.insert(id, Route { topic: topic.to_string(), tx });

        let routes = Arc::clone(&self.routes);
        Ok(Subscription::new(format!("mem-{id}"), topic, rx, move || {
            routes.remove(&id);
        }))
    }

    async fn publish(&self, destination: &str, headers: &Headers, body: String) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Transport("connection closed".to_string()));
        }

        let frame = PublishedFrame { destination: destination.to_string(), headers: headers.clone(), body };
        self.published
            .lock()
            .map_err(|_| ClientError::Transport("publish log poisoned".to_string()))?
            .push(frame);
        Ok(())
    }

    async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|&closed| closed).await;
    }
}
