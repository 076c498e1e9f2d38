use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

/// Result type used throughout the event logger.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the event logger.
///
/// None of these reach the host through `send_*_event()` or `configure()`: they are logged and the
/// call is dropped. They surface only through [`EventTransport`](crate::EventTransport) callbacks
/// and constructors.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Neither the configured nor the built-in endpoint is usable.
    #[error("missing api_url or api_key configuration")]
    MissingEndpoint,

    /// Invalid base URL configuration.
    #[error("invalid api_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// Transport-level failure (offline, connection reset, timeout). Retried with backoff.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// The HTTP client or request could not be built, or the response could not be read. Never
    /// retried.
    #[error(transparent)]
    Http(Arc<reqwest::Error>),

    /// The backend responded with a non-success status. Never retried.
    #[error("unexpected response status: {0}")]
    UnexpectedStatus(StatusCode),

    /// The delivery queue is no longer accepting work.
    #[error("delivery queue is closed")]
    QueueClosed,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Returns `true` if the error happened below HTTP, e.g., the device was offline.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        let is_network = value.is_connect() || value.is_timeout() || value.is_request();
        let value = Arc::new(value.without_url());
        if is_network {
            Error::Network(value)
        } else {
            Error::Http(value)
        }
    }
}

/// Failure of the underlying key-value storage.
///
/// Stores built on top of [`KeyValueStore`](crate::KeyValueStore) treat these as
/// "absent" and never forward them to the engine.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage i/o error")]
    Io(#[from] std::io::Error),
    /// A stored value could not be encoded or decoded.
    #[error("malformed stored value")]
    Serialization(#[from] serde_json::Error),
}
