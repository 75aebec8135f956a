use std::time::Duration;

use thiserror::Error;

use crate::types::SessionId;

/// Failures of a single fetch or connection attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {0}")]
    Status(u16),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("source rejected request: {0}")]
    Remote(String),
    #[error("connection closed by peer")]
    Disconnected,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Error taxonomy of the synchronization core.
///
/// Only `ExhaustedRetries` ever reaches the user; the rest are recovered or
/// swallowed where they occur.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transient network error: {0}")]
    TransientNetwork(#[from] TransportError),
    #[error("response for torn-down session {session} discarded")]
    StaleResponse { session: SessionId },
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },
    #[error("gave up after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },
}

pub type TransportResult<T> = Result<T, TransportError>;
