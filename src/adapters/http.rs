use crate::config::ApiConfig;
use crate::domain::{ConversationId, ConversationSummary, Message, UserId, WorkspaceId};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// REST operations the chat view depends on.
#[async_trait]
pub trait WorkspaceApi: Send + Sync + fmt::Debug {
    /// Finds the direct-message thread between the signed-in user and `user_id`.
    async fn resolve_conversation_id(&self, workspace_id: WorkspaceId, user_id: UserId) -> Result<ConversationId>;

    /// One page of older messages of the thread with `user_id`. An empty page means there is no
    /// older history.
    async fn fetch_history_page(&self, workspace_id: WorkspaceId, user_id: UserId, cursor: u32) -> Result<Vec<Message>>;

    /// The inbox list of the workspace.
    async fn fetch_conversation_summaries(&self, workspace_id: WorkspaceId) -> Result<Vec<ConversationSummary>>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
}

#[derive(Debug, Deserialize)]
struct ResolvedConversation {
    uuid: ConversationId,
}

#[derive(Debug, Clone)]
pub struct HttpWorkspaceApi {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpWorkspaceApi {
    /// Builds a client for the backend at `config.api_url`.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(config.request_timeout_secs)).build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut request = self.client.get(format!("{}{path}", self.base_url));
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        // Error bodies carry a short code such as W-01; anything else keeps the HTTP status.
        let code = match response.json::<ApiErrorBody>().await {
            Ok(body) => body.code,
            Err(_) => status.to_string(),
        };
        tracing::debug!(status = status.as_u16(), code = %code, path = %path, "Request rejected");
        Err(ClientError::from_api_code(status.as_u16(), &code))
    }
}

#[async_trait]
impl WorkspaceApi for HttpWorkspaceApi {
    #[tracing::instrument(level = "debug", skip(self), err(level = "debug"))]
    async fn resolve_conversation_id(&self, workspace_id: WorkspaceId, user_id: UserId) -> Result<ConversationId> {
        let resolved: ResolvedConversation = self.get_json(&format!("/api/inbox/{workspace_id}/{user_id}/uuid")).await?;
        Ok(resolved.uuid)
    }

    #[tracing::instrument(level = "debug", skip(self), err(level = "debug"))]
    async fn fetch_history_page(&self, workspace_id: WorkspaceId, user_id: UserId, cursor: u32) -> Result<Vec<Message>> {
        self.get_json(&format!("/api/inbox/{workspace_id}/{user_id}/messages?page={cursor}")).await
    }

    #[tracing::instrument(level = "debug", skip(self), err(level = "debug"))]
    async fn fetch_conversation_summaries(&self, workspace_id: WorkspaceId) -> Result<Vec<ConversationSummary>> {
        self.get_json(&format!("/api/inbox/{workspace_id}")).await
    }
}
