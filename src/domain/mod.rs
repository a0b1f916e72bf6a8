pub mod conversation;
pub mod message;
pub mod session;

pub use conversation::{ChatContext, ConversationSummary, ConversationTarget, UnreadEvent};
pub use message::{ConversationId, Message, OutboundMessage, UserId, WorkspaceId};
pub use session::{HistoryState, LinkState};
