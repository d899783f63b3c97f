use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Environment error: {0}")]
    EnvError(#[from] env::VarError),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

// Gmail API error types with detailed descriptions
#[derive(Debug, Error)]
pub enum GmailApiError {
    #[error("Gmail API error: {0}")]
    ApiError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Message retrieval error: {0}")]
    MessageRetrievalError(String),

    #[error("Message format error: {0}")]
    MessageFormatError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limit error: {0}")]
    RateLimitError(String),
}

pub type GmailResult<T> = std::result::Result<T, GmailApiError>;

/// Errors raised while relaying a turn between the browser and the planner.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to connect to upstream planner at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Upstream transport error: {0}")]
    Transport(String),

    #[error("Upstream planner closed the connection")]
    UpstreamClosed,

    #[error("Protocol violation: expected {expected}, got {got}")]
    Protocol { expected: String, got: String },

    #[error("Envelope codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Gmail(#[from] GmailApiError),
}

impl RelayError {
    /// Whether the session can no longer serve turns after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::Connect { .. } | RelayError::Transport(_) | RelayError::UpstreamClosed
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => RelayError::UpstreamClosed,
            other => RelayError::Transport(other.to_string()),
        }
    }
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;
