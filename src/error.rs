//! Error taxonomy for the remote store, session setup, and the background queue.
//!
//! Expected remote conditions (a missing file, a rejected write) are surfaced as
//! values by the sync engine. These types exist so the engine can tell a
//! deterministic rejection from a transient failure when deciding whether to retry.

use thiserror::Error;

/// Failure talking to the remote object store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The path (or the repository itself) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials were rejected (HTTP 401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials lack permission for this repository (HTTP 403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The remote refused the payload (HTTP 422).
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    /// The version token presented with a write is stale (HTTP 409).
    #[error("version conflict: {0}")]
    Conflict(String),

    /// Timeout, connection failure, rate limit, or 5xx.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The remote answered but the payload could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// `Conflict` counts as transient: the writer re-reads the version token on
    /// every attempt, so losing the race once does not mean losing it again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Conflict(_))
    }

    /// Classify an HTTP status code returned by the remote.
    pub fn from_status(status: u16, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            401 => Self::Unauthorized(context),
            403 => Self::Forbidden(context),
            404 => Self::NotFound(context),
            409 => Self::Conflict(context),
            422 => Self::Unprocessable(context),
            408 | 429 => Self::Transient(format!("HTTP {status}: {context}")),
            s if s >= 500 => Self::Transient(format!("HTTP {status}: {context}")),
            _ => Self::Unprocessable(format!("HTTP {status}: {context}")),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return Self::Transient(e.to_string());
        }
        match e.status() {
            Some(status) => Self::from_status(status.as_u16(), e.to_string()),
            None if e.is_decode() || e.is_body() => Self::Decode(e.to_string()),
            None => Self::Transient(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<base64::DecodeError> for RemoteError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Caller mistakes detected before any network activity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid repository identifier {0:?}: expected owner/name using [A-Za-z0-9._-]")]
    InvalidRepository(String),

    #[error("no repository connected")]
    MissingRepository,

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Why a job could not be handed to the background queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("sync queue is full")]
    Full,

    #[error("sync queue is shut down")]
    Closed,
}
