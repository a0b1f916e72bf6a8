/// Where history pagination stands for one mounted conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryState {
    /// No page requested yet.
    #[default]
    Unstarted,
    /// A fetch for `cursor` is outstanding.
    Loading { cursor: u32 },
    /// Older pages may exist; `next` is the cursor the next trigger requests.
    HasMore { next: u32 },
    /// The backend answered with an empty page.
    Exhausted,
}

impl HistoryState {
    #[must_use]
    pub const fn is_exhausted(self) -> bool {
        matches!(self, Self::Exhausted)
    }

    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

/// Readiness of the live channel for the current conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connected,
}

impl LinkState {
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Connected)
    }
}
