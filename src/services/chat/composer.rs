use crate::domain::LinkState;

/// Input line of the chat view.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    input: String,
}

impl Composer {
    #[must_use]
    pub const fn new() -> Self {
        Self { input: String::new() }
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Takes the current input for publishing, leaving the field empty.
    ///
    /// Returns `None` and keeps the input untouched when the channel is not ready, when the text
    /// is nothing but spaces, or when it is a lone newline.
    pub fn submit(&mut self, link: LinkState) -> Option<String> {
        if !link.is_ready() || !is_sendable(&self.input) {
            return None;
        }
        Some(std::mem::take(&mut self.input))
    }
}

// Only the space character counts as blank; tabs and inner newlines are content.
fn is_sendable(text: &str) -> bool {
    text != "\n" && text.chars().any(|c| c != ' ')
}
