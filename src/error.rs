use crate::adapters::transport::stomp::frame::FrameError;
use thiserror::Error;

/// Error code the backend uses when the workspace behind a request was deleted or never existed.
pub const WORKSPACE_GONE_CODE: &str = "W-01";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Workspace has been deleted or does not exist")]
    WorkspaceGone,
    #[error("API error ({status}): {code}")]
    Api { status: u16, code: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),
    #[error("Session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Maps an error code returned by the backend onto the client taxonomy.
    #[must_use]
    pub fn from_api_code(status: u16, code: &str) -> Self {
        if code == WORKSPACE_GONE_CODE {
            Self::WorkspaceGone
        } else {
            Self::Api { status, code: code.to_string() }
        }
    }

    /// Errors that invalidate the whole chat context rather than a single request.
    #[must_use]
    pub const fn is_fatal_to_context(&self) -> bool {
        matches!(self, Self::WorkspaceGone)
    }
}
