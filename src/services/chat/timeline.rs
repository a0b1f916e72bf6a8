use crate::domain::{Message, UserId};

/// Which participant wrote a message, and so which way it is aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Left-aligned, timestamp to the right of the bubble.
    Counterpart,
    /// Right-aligned, timestamp to the left of the bubble.
    Viewer,
}

/// One render-ready row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub message_id: i64,
    pub side: Side,
    pub body: String,
    /// `HH:MM`, or `None` when the timestamp could not be split.
    pub clock: Option<String>,
}

/// Paginated history followed by live messages, in arrival order.
#[derive(Debug, Clone)]
pub struct Timeline {
    counterpart_id: UserId,
    history: Vec<Message>,
    live: Vec<Message>,
}

impl Timeline {
    #[must_use]
    pub const fn new(counterpart_id: UserId) -> Self {
        Self { counterpart_id, history: Vec::new(), live: Vec::new() }
    }

    /// Puts an older page in front of the history, keeping the page's own order.
    pub fn prepend_page(&mut self, page: Vec<Message>) {
        let mut merged = page;
        merged.append(&mut self.history);
        self.history = merged;
    }

    pub fn push_live(&mut self, message: Message) {
        self.live.push(message);
    }

    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    #[must_use]
    pub fn live(&self) -> &[Message] {
        &self.live
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len() + self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// History then live, positionally; no re-sorting by timestamp.
    #[must_use]
    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.history.iter().chain(&self.live).map(|message| self.entry(message)).collect()
    }

    fn entry(&self, message: &Message) -> TimelineEntry {
        let side = if message.user_id == self.counterpart_id { Side::Counterpart } else { Side::Viewer };
        let clock = match message.clock_label() {
            Ok(clock) => Some(clock),
            Err(e) => {
                tracing::warn!(message_id = message.message_id, error = %e, "Cannot extract clock label");
                None
            }
        };
        TimelineEntry { message_id: message.message_id, side, body: message.message.clone(), clock }
    }
}
