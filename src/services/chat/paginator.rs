use crate::domain::HistoryState;

/// Result of feeding a completed fetch back into the paginator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// A non-empty page to merge.
    Merge { cursor: u32 },
    /// The page was empty; no further fetch will be triggered.
    Exhausted,
    /// Completion for a cursor that is not outstanding.
    Stale,
}

/// Edge detector for the sentinel near the top of the scroll region.
#[derive(Debug, Clone, Copy)]
struct SentinelWatch {
    armed: bool,
    visible: bool,
}

impl SentinelWatch {
    const fn observe(&mut self, visible: bool) -> bool {
        let rising = visible && !self.visible;
        self.visible = visible;
        rising && self.armed
    }
}

/// Cursor-based history paging for one mounted conversation.
#[derive(Debug, Clone)]
pub struct HistoryPaginator {
    state: HistoryState,
    sentinel: SentinelWatch,
}

impl Default for HistoryPaginator {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryPaginator {
    #[must_use]
    pub const fn new() -> Self {
        Self { state: HistoryState::Unstarted, sentinel: SentinelWatch { armed: true, visible: false } }
    }

    #[must_use]
    pub const fn state(&self) -> HistoryState {
        self.state
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.state.is_exhausted()
    }

    /// Reports the sentinel's visibility. Returns the cursor to fetch when this is a rising edge,
    /// the watcher is armed and no fetch is outstanding.
    pub const fn observe(&mut self, visible: bool) -> Option<u32> {
        if !self.sentinel.observe(visible) {
            return None;
        }
        let cursor = match self.state {
            HistoryState::Unstarted => 0,
            HistoryState::HasMore { next } => next,
            HistoryState::Loading { .. } | HistoryState::Exhausted => return None,
        };
        self.state = HistoryState::Loading { cursor };
        Some(cursor)
    }

    /// Feeds back the size of the page fetched for `cursor`.
    pub const fn complete(&mut self, cursor: u32, page_len: usize) -> PageOutcome {
        if !matches!(self.state, HistoryState::Loading { cursor: c } if c == cursor) {
            return PageOutcome::Stale;
        }
        if page_len == 0 {
            self.state = HistoryState::Exhausted;
            self.sentinel.armed = false;
            PageOutcome::Exhausted
        } else {
            self.state = HistoryState::HasMore { next: cursor + 1 };
            PageOutcome::Merge { cursor }
        }
    }

    /// The fetch for `cursor` failed. The cursor still advances: it is never requested twice.
    pub const fn fail(&mut self, cursor: u32) {
        if matches!(self.state, HistoryState::Loading { cursor: c } if c == cursor) {
            self.state = HistoryState::HasMore { next: cursor + 1 };
        }
    }

    /// Stops reacting to the sentinel for good.
    pub const fn detach(&mut self) {
        self.sentinel.armed = false;
    }
}
