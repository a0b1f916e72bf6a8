use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = i64;
pub type WorkspaceId = i64;

/// One direct message as the backend serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: i64,
    pub user_id: UserId,
    pub message: String,
    pub created_at: String,
}

impl Message {
    /// Extracts `HH:MM` from `created_at` by splitting on the `T` and `:` markers.
    ///
    /// No calendar parsing happens here: offsets and zones are not applied, and anything that
    /// lacks the `T` marker or a minute segment is rejected.
    ///
    /// # Errors
    /// Returns `ClientError::MalformedTimestamp` when the structure is not recognized.
    pub fn clock_label(&self) -> Result<String> {
        let malformed = || ClientError::MalformedTimestamp(self.created_at.clone());

        let hour = self
            .created_at
            .split(':')
            .next()
            .and_then(|head| head.split('T').nth(1))
            .ok_or_else(malformed)?;
        let minute = self
            .created_at
            .split('T')
            .nth(1)
            .and_then(|time| time.split(':').nth(1))
            .ok_or_else(malformed)?;

        Ok(format!("{hour}:{minute}"))
    }
}

/// Opaque identifier of a direct-message thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body published to the outbound inbox destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(rename = "uuid")]
    pub conversation_id: ConversationId,
    pub message: String,
    pub workspace_id: WorkspaceId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_at(created_at: &str) -> Message {
        Message { message_id: 1, user_id: 7, message: "hi".to_string(), created_at: created_at.to_string() }
    }

    #[test]
    fn test_clock_label_takes_hour_and_minute() {
        assert_eq!(message_at("2023-01-05T14:32:10").clock_label().unwrap(), "14:32");
        assert_eq!(message_at("2023-01-05T09:05:59.123456").clock_label().unwrap(), "09:05");
    }

    #[test]
    fn test_clock_label_ignores_zone_suffix() {
        // Structural split: the offset is not applied.
        assert_eq!(message_at("2023-01-05T23:59:00+09:00").clock_label().unwrap(), "23:59");
    }

    #[test]
    fn test_clock_label_rejects_malformed() {
        assert!(matches!(message_at("2023-01-05 14:32:10").clock_label(), Err(ClientError::MalformedTimestamp(_))));
        assert!(matches!(message_at("2023-01-05T14").clock_label(), Err(ClientError::MalformedTimestamp(_))));
        assert!(message_at("").clock_label().is_err());
    }

    #[test]
    fn test_outbound_message_wire_shape() {
        let body = OutboundMessage {
            conversation_id: ConversationId::new("abc-123"),
            message: "hello".to_string(),
            workspace_id: 4,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "uuid": "abc-123", "message": "hello", "workspaceId": 4 }));
    }

    #[test]
    fn test_message_reads_camel_case() {
        let msg: Message = serde_json::from_str(
            r#"{"messageId":3,"userId":9,"message":"yo","createdAt":"2023-02-01T10:00:00"}"#,
        )
        .unwrap();
        assert_eq!(msg.message_id, 3);
        assert_eq!(msg.user_id, 9);
    }
}
