use crate::domain::message::{ConversationId, UserId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// How a chat session finds the thread it shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationTarget {
    /// The conversation id is already known, e.g. opened from the inbox list.
    Known(ConversationId),
    /// Looked up from the workspace and the counterpart.
    Lookup,
}

/// Everything a chat session needs to know about the conversation it renders.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub workspace_id: WorkspaceId,
    pub viewer_id: UserId,
    pub counterpart_id: UserId,
    pub target: ConversationTarget,
}

/// One row of the inbox list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub uuid: ConversationId,
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_image: String,
    /// Text of the last message in the thread.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_chat: String,
    #[serde(default)]
    pub unread_messages: u32,
}

/// Payload of the per-user unread topic.
///
/// Variant order matters: a full new-message payload also carries every field of `Read`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UnreadEvent {
    #[serde(rename_all = "camelCase")]
    NewMessage {
        workspace_id: WorkspaceId,
        uuid: ConversationId,
        sender_id: UserId,
        #[serde(default)]
        sender_name: String,
        #[serde(default)]
        sender_image: String,
        #[serde(default)]
        last_message: String,
        #[serde(default)]
        last_chat: String,
        #[serde(default)]
        unread_message: bool,
    },
    #[serde(rename_all = "camelCase")]
    Read { workspace_id: WorkspaceId, uuid: ConversationId, unread_message: bool },
}

impl UnreadEvent {
    #[must_use]
    pub const fn workspace_id(&self) -> WorkspaceId {
        match self {
            Self::NewMessage { workspace_id, .. } | Self::Read { workspace_id, .. } => *workspace_id,
        }
    }

    /// Whether the workspace still has unread messages after this event.
    #[must_use]
    pub const fn workspace_has_unread(&self) -> bool {
        match self {
            Self::NewMessage { unread_message, .. } | Self::Read { unread_message, .. } => *unread_message,
        }
    }
}
