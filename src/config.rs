use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Id of the signed-in user, sent as `userId` on every transport frame
    #[arg(long, env = "INBOX_USER_ID")]
    pub user_id: i64,

    /// Workspace the conversation belongs to
    #[arg(long, env = "INBOX_WORKSPACE_ID")]
    pub workspace_id: i64,

    /// User on the other side of the conversation
    #[arg(long, env = "INBOX_COUNTERPART_ID")]
    pub counterpart_id: i64,

    /// Conversation id, when already known. Looked up from workspace and counterpart otherwise
    #[arg(long, env = "INBOX_CONVERSATION")]
    pub conversation: Option<String>,

    #[command(flatten)]
    pub api: ApiConfig,

    #[command(flatten)]
    pub transport: TransportConfig,

    #[command(flatten)]
    pub session: SessionConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ApiConfig {
    /// Base URL of the REST backend
    #[arg(long, env = "INBOX_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Bearer token attached to REST requests
    #[arg(long, env = "INBOX_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// Timeout for a single REST request in seconds
    #[arg(long, env = "INBOX_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { api_url: "http://localhost:8080".to_string(), access_token: None, request_timeout_secs: 10 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct TransportConfig {
    /// WebSocket endpoint of the STOMP broker
    #[arg(long, env = "INBOX_WS_URL", default_value = "ws://localhost:8080/ws")]
    pub ws_url: String,

    /// How long to wait for the broker to answer CONNECT
    #[arg(long, env = "INBOX_CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// Size of the outbound frame buffer
    #[arg(long, env = "INBOX_OUTBOUND_BUFFER_SIZE", default_value_t = 32)]
    pub outbound_buffer_size: usize,

    /// Number of undelivered payloads buffered per subscription
    #[arg(long, env = "INBOX_SUBSCRIPTION_BUFFER_SIZE", default_value_t = 64)]
    pub subscription_buffer_size: usize,

    /// Initial reconnect delay
    #[arg(long, env = "INBOX_MIN_BACKOFF_MS", default_value_t = 500)]
    pub min_backoff_ms: u64,

    /// Upper bound for the reconnect delay
    #[arg(long, env = "INBOX_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub max_backoff_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws".to_string(),
            connect_timeout_ms: 5000,
            outbound_buffer_size: 32,
            subscription_buffer_size: 64,
            min_backoff_ms: 500,
            max_backoff_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct SessionConfig {
    /// Size of the command buffer feeding a chat session
    #[arg(long, env = "INBOX_COMMAND_BUFFER_SIZE", default_value_t = 32)]
    pub command_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { command_buffer_size: 32 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "INBOX_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint. Traces and metrics are only exported when set
    #[arg(long, env = "INBOX_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
