//! A client-side event logger for SDKs embedded in host applications.
//!
//! # Overview
//!
//! SDKs report recurring errors through an [`EventLogger`] as critical or warning events. Events
//! are deduplicated by a fingerprint of their defining fields, so repeated occurrences only bump
//! an occurrence count. Events are persisted locally (see [`EventLoggerConfig::storage_dir`]) and
//! delivered to the logging backend:
//!
//! - right away, the first time a critical event occurs;
//! - in a batch, once [`MAX_EVENTS_COUNT`] events are stored;
//! - in a batch, on configuration and on each foreground transition reported by a
//!   [`ForegroundSignal`], if the last successful delivery is older than [`TTL`].
//!
//! Deliveries failing below HTTP (e.g., the device is offline) are retried with exponential
//! backoff, see [`RetryPolicy`].
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Reporting events must never disturb the host, so [`EventLogger`] methods don't return errors:
//! invalid input, storage failures and failed deliveries are logged and otherwise ignored. Errors
//! are only returned when constructing components and passed to [`EventTransport`] callbacks.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages, with
//! the `event_logger` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into event delivery.
//!
//! # Examples
//!
//! Examples can be found in the `demos` directory of the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod config;
mod delivery_cache;
mod delivery_queue;
mod error;
mod event;
mod event_factory;
mod event_logger;
mod event_store;
mod lifecycle;
mod retry;
mod storage;
mod transport;

#[cfg(test)]
mod test_utils;

pub use config::EventLoggerConfig;
pub use delivery_cache::{DeliveryCache, CACHE_NAMESPACE};
pub use error::{Error, Result, StorageError};
pub use event::{fingerprint, EventRecord, EventType, EVENT_VERSION, PLATFORM};
pub use event_factory::{AppMetadata, EventFactory, MetadataProvider};
pub use event_logger::{Components, EventLogger, MAX_EVENTS_COUNT, TTL};
pub use event_store::{EventStore, EVENTS_NAMESPACE};
pub use lifecycle::{AppLifecycleObserver, ForegroundListener, ForegroundSignal};
pub use retry::RetryPolicy;
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use transport::{
    EventTransport, HttpEventTransport, PushCallback, TransportConfig, HEADER_CLIENT_API_KEY,
};
