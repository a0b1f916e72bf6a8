use crate::services::chat::timeline::TimelineEntry;

/// The scrollable region a chat session renders into.
///
/// `render` must lay the entries out synchronously so that `scroll_height` reflects them right
/// after it returns.
pub trait Viewport: Send {
    fn render(&mut self, entries: &[TimelineEntry]);

    /// Total height of the scrollable content.
    fn scroll_height(&self) -> f64;

    /// Sets the scroll offset measured from the top.
    fn scroll_to(&mut self, offset: f64);

    fn scroll_to_bottom(&mut self) {
        let height = self.scroll_height();
        self.scroll_to(height);
    }
}

/// Keeps the message the user is looking at stationary while older history is inserted above it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollAnchor {
    captured_height: f64,
}

impl ScrollAnchor {
    /// Records the content height. Must run before the fetched page is merged.
    pub fn capture(&mut self, viewport: &dyn Viewport) {
        self.captured_height = viewport.scroll_height();
    }

    #[must_use]
    pub const fn captured_height(&self) -> f64 {
        self.captured_height
    }

    /// Scrolls so that content which sat at the old top is back where it was.
    pub fn restore(&self, viewport: &mut dyn Viewport) {
        let height = viewport.scroll_height();
        if height > 0.0 {
            viewport.scroll_to(height - self.captured_height);
        }
    }
}
