use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of an outbound request/response exchange with the backend.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum GatewayError {
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("failed to encode request body: {0}")]
    Encode(String),
}

impl GatewayError {
    /// Build a [`GatewayError::Status`] from a non-success response, falling back to a
    /// status-derived message when the body is empty.
    pub fn from_response(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            body.to_string()
        };

        Self::Status { status, message }
    }

    /// Determine if the backend rejected the credential attached to the request.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, GatewayError::Status { status: 401, .. })
    }
}

/// Errors surfaced by a realtime feed.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum FeedError {
    #[error("feed reported error: {0}")]
    Remote(String),

    #[error("malformed feed payload: {0}")]
    Malformed(String),

    #[error("feed connection failed: {0}")]
    Connect(String),

    #[error("feed transport failure: {0}")]
    Transport(String),

    #[error("no feed frame received for {0:?}")]
    ReadTimeout(std::time::Duration),
}

impl FeedError {
    /// Determine if an error ends the current connection and requires a reconnect.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            FeedError::Connect(_) | FeedError::Transport(_) | FeedError::ReadTimeout(_) => true,
            _ => false,
        }
    }
}

/// Errors reading or writing the persisted session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("session storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors produced by user actions the router refuses to perform.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RouterError {
    #[error("action '{action}' is not available on the {screen} screen")]
    InvalidAction {
        action: &'static str,
        screen: crate::router::Screen,
    },

    #[error("not logged in")]
    NotAuthenticated,

    #[error("exchange API keys are not configured")]
    AccountNotConfigured,
}

/// Errors building the [`ClientConfig`](crate::config::ClientConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url for {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported url scheme for {name}: {scheme}")]
    UnsupportedScheme { name: &'static str, scheme: String },

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
