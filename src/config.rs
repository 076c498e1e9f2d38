use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    delivery_cache::{DeliveryCache, CACHE_NAMESPACE},
    event_factory::{AppMetadata, MetadataProvider},
    event_logger::Components,
    event_store::{EventStore, EVENTS_NAMESPACE},
    lifecycle::ForegroundSignal,
    retry::RetryPolicy,
    storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore},
    transport::{HttpEventTransport, TransportConfig},
    Error, Result,
};

/// Configuration for [`EventLogger::configure`](crate::EventLogger::configure).
pub struct EventLoggerConfig {
    pub(crate) metadata: Box<dyn MetadataProvider + Send>,
    pub(crate) api_url: String,
    pub(crate) api_key: String,
    pub(crate) storage_dir: Option<PathBuf>,
    pub(crate) foreground_signal: Option<Arc<dyn ForegroundSignal>>,
    pub(crate) transport: TransportConfig,
}

impl EventLoggerConfig {
    /// Built-in base URL, set at compile time through the `EVENT_LOGGER_API_URL` environment
    /// variable. Empty if it wasn't set.
    pub const DEFAULT_API_URL: &'static str = match option_env!("EVENT_LOGGER_API_URL") {
        Some(url) => url,
        None => "",
    };

    /// Built-in API key, set at compile time through the `EVENT_LOGGER_API_KEY` environment
    /// variable. Empty if it wasn't set.
    pub const DEFAULT_API_KEY: &'static str = match option_env!("EVENT_LOGGER_API_KEY") {
        Some(key) => key,
        None => "",
    };

    /// Create a configuration attaching `metadata` to every event.
    ///
    /// Events are kept in memory unless [`EventLoggerConfig::storage_dir`] is set, and delivered
    /// to the built-in endpoint unless both [`EventLoggerConfig::api_url`] and
    /// [`EventLoggerConfig::api_key`] are set.
    ///
    /// ```
    /// # use event_logger::{AppMetadata, EventLoggerConfig};
    /// let config = EventLoggerConfig::new(AppMetadata {
    ///     app_id: "com.example.app".to_owned(),
    ///     app_version: "1.2.0".to_owned(),
    ///     ..AppMetadata::default()
    /// })
    /// .api_url("https://logging.example.com/")
    /// .api_key("api-key");
    /// ```
    pub fn new(metadata: impl MetadataProvider + Send + 'static) -> EventLoggerConfig {
        EventLoggerConfig {
            metadata: Box::new(metadata),
            api_url: String::new(),
            api_key: String::new(),
            storage_dir: None,
            foreground_signal: None,
            transport: TransportConfig::default(),
        }
    }

    /// Base URL of the logging backend. Ignored unless an API key is set too.
    pub fn api_url(mut self, api_url: impl Into<String>) -> EventLoggerConfig {
        self.api_url = api_url.into();
        self
    }

    /// API key sent with every request. Ignored unless a base URL is set too.
    pub fn api_key(mut self, api_key: impl Into<String>) -> EventLoggerConfig {
        self.api_key = api_key.into();
        self
    }

    /// Directory where events and delivery state are persisted across restarts.
    pub fn storage_dir(mut self, storage_dir: impl Into<PathBuf>) -> EventLoggerConfig {
        self.storage_dir = Some(storage_dir.into());
        self
    }

    /// Source of foreground notifications. Expired events are flushed on each of them.
    pub fn foreground_signal(mut self, signal: Arc<dyn ForegroundSignal>) -> EventLoggerConfig {
        self.foreground_signal = Some(signal);
        self
    }

    /// Timeout of a single request attempt.
    ///
    /// Defaults to [`TransportConfig::DEFAULT_REQUEST_TIMEOUT`].
    pub fn request_timeout(mut self, timeout: Duration) -> EventLoggerConfig {
        self.transport.request_timeout = timeout;
        self
    }

    /// Retries after network errors. Defaults to [`RetryPolicy::default`].
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> EventLoggerConfig {
        self.transport.retry_policy = retry_policy;
        self
    }

    /// Builds the stores and starts the HTTP transport.
    pub(crate) fn into_components(self) -> Result<Components> {
        let (api_url, api_key) = resolve_endpoint(
            &self.api_url,
            &self.api_key,
            EventLoggerConfig::DEFAULT_API_URL,
            EventLoggerConfig::DEFAULT_API_KEY,
        )?;

        let transport = HttpEventTransport::start(api_url, api_key, self.transport.clone())?;

        Ok(Components {
            transport: Arc::new(transport),
            event_store: EventStore::from_boxed(self.open_storage(EVENTS_NAMESPACE)),
            delivery_cache: DeliveryCache::from_boxed(self.open_storage(CACHE_NAMESPACE)),
            metadata: AppMetadata::capture(&*self.metadata),
            foreground_signal: self.foreground_signal,
        })
    }

    fn open_storage(&self, namespace: &str) -> Box<dyn KeyValueStore> {
        match &self.storage_dir {
            Some(dir) => Box::new(FileKeyValueStore::open(dir, namespace)),
            None => Box::new(MemoryKeyValueStore::new()),
        }
    }
}

/// Picks the caller's endpoint if it is complete, the built-in one otherwise.
fn resolve_endpoint<'a>(
    api_url: &'a str,
    api_key: &'a str,
    default_url: &'a str,
    default_key: &'a str,
) -> Result<(&'a str, &'a str)> {
    let (url, key) = if !api_url.is_empty() && !api_key.is_empty() {
        (api_url, api_key)
    } else {
        (default_url, default_key)
    };

    if url.is_empty() || key.is_empty() {
        return Err(Error::MissingEndpoint);
    }
    Ok((url, key))
}
