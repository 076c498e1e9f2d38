//! Delivery of event batches to the backend.
use std::{sync::Arc, time::Duration};

use reqwest::Url;
use tokio::sync::mpsc;

use crate::{
    event::EventRecord,
    retry::{retry_on_network_error, RetryPolicy},
    Error, Result,
};

/// Header carrying the client API key.
pub const HEADER_CLIENT_API_KEY: &str = "x-client-apikey";

const EVENTS_ENDPOINT: &str = "external/logging/error";

/// Completion callback of [`EventTransport::push`]. Receives `Ok(())` if the batch was accepted
/// by the backend.
pub type PushCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Sends batches of events to a remote endpoint.
pub trait EventTransport: Send + Sync {
    /// Asynchronously sends `events`.
    ///
    /// `on_complete` is invoked exactly once, off the caller's thread, unless `events` is empty:
    /// then nothing is sent and `on_complete` is dropped without being called.
    fn push(&self, events: Vec<EventRecord>, on_complete: PushCallback);
}

/// Configuration for [`HttpEventTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout of a single request attempt.
    ///
    /// Defaults to [`TransportConfig::DEFAULT_REQUEST_TIMEOUT`].
    pub request_timeout: Duration,
    /// Retries after network errors.
    pub retry_policy: RetryPolicy,
}

impl TransportConfig {
    /// Default value for [`TransportConfig::request_timeout`].
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}

impl Default for TransportConfig {
    fn default() -> TransportConfig {
        TransportConfig {
            request_timeout: TransportConfig::DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

struct PushRequest {
    events: Vec<EventRecord>,
    on_complete: PushCallback,
}

/// [`EventTransport`] posting JSON batches over HTTP.
///
/// Requests run on a dedicated background thread. Every push is an independent task there, so a
/// batch waiting for its retry doesn't hold back others. All callbacks are invoked on that thread.
pub struct HttpEventTransport {
    sender: mpsc::UnboundedSender<PushRequest>,
}

impl HttpEventTransport {
    /// Starts the transport thread sending to `{base_url}external/logging/error`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBaseUrl`] if `base_url` can't be parsed.
    /// - [`Error::Http`] if the HTTP client can't be created.
    /// - [`Error::Io`] if the thread failed to start.
    pub fn start(
        base_url: &str,
        api_key: impl Into<String>,
        config: TransportConfig,
    ) -> Result<HttpEventTransport> {
        let url = events_url(base_url)?;
        let api_key = api_key.into();
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (sender, mut receiver) = mpsc::unbounded_channel::<PushRequest>();

        std::thread::Builder::new()
            .name("event-logger-transport".to_owned())
            .spawn(move || {
                runtime.block_on(async move {
                    let api = Arc::new(EventsApi {
                        client,
                        url,
                        api_key,
                        retry_policy: config.retry_policy,
                    });
                    while let Some(request) = receiver.recv().await {
                        let api = api.clone();
                        tokio::spawn(async move {
                            let result = api.send_with_retry(&request.events).await;
                            match &result {
                                Ok(()) => {
                                    log::debug!(target: "event_logger", count = request.events.len(); "successfully pushed events")
                                }
                                Err(err) => {
                                    log::warn!(target: "event_logger", count = request.events.len(); "unable to push events: {}", err)
                                }
                            }
                            (request.on_complete)(result);
                        });
                    }
                    log::debug!(target: "event_logger", "transport thread received disconnected");
                });
            })?;

        Ok(HttpEventTransport { sender })
    }
}

impl EventTransport for HttpEventTransport {
    fn push(&self, events: Vec<EventRecord>, on_complete: PushCallback) {
        if events.is_empty() {
            return;
        }

        if let Err(mpsc::error::SendError(request)) = self.sender.send(PushRequest {
            events,
            on_complete,
        }) {
            log::warn!(target: "event_logger", "transport thread has stopped, dropping events");
            (request.on_complete)(Err(Error::QueueClosed));
        }
    }
}

struct EventsApi {
    client: reqwest::Client,
    url: Url,
    api_key: String,
    retry_policy: RetryPolicy,
}

impl EventsApi {
    async fn send_with_retry(&self, events: &[EventRecord]) -> Result<()> {
        retry_on_network_error(self.retry_policy, || self.send(events)).await
    }

    async fn send(&self, events: &[EventRecord]) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .header(HEADER_CLIENT_API_KEY, &self.api_key)
            .json(events)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UnexpectedStatus(status));
        }
        Ok(())
    }
}

/// Resolves the events endpoint relative to `base_url`, which is treated as a directory whether
/// or not it ends with a slash.
fn events_url(base_url: &str) -> Result<Url> {
    let mut base = Url::parse(base_url).map_err(Error::InvalidBaseUrl)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(EVENTS_ENDPOINT).map_err(Error::InvalidBaseUrl)
}
