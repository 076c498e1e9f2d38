//! Building [`EventRecord`]s from caller input and host metadata.
use std::collections::HashMap;

use crate::event::{EventRecord, EventType, EVENT_VERSION, PLATFORM};

const MAX_EVENT_PARAM_LENGTH: usize = 100;
const MAX_EVENT_MESSAGE_LENGTH: usize = 4000;

/// Host capability supplying application and device information attached to every event.
///
/// Each getter may return `None` if the information is not available; missing values are sent as
/// empty strings. The event logger queries the provider once, when it gets configured.
pub trait MetadataProvider {
    /// Application identifier, e.g., the package name.
    fn app_id(&self) -> Option<String>;
    /// Human-readable application name.
    fn app_name(&self) -> Option<String>;
    /// Application version.
    fn app_version(&self) -> Option<String>;

    /// Operating system name and version.
    fn os_version(&self) -> Option<String> {
        None
    }
    /// Device model.
    fn device_model(&self) -> Option<String> {
        None
    }
    /// Device manufacturer.
    fn device_brand(&self) -> Option<String> {
        None
    }
    /// User-visible device name.
    fn device_name(&self) -> Option<String> {
        None
    }
    /// Versions of companion SDKs bundled in the application, keyed by SDK name.
    fn companion_sdks(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Snapshot of application and device information.
///
/// Also usable directly as a [`MetadataProvider`] when the host has all values up front.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppMetadata {
    /// See [`MetadataProvider::app_id`].
    pub app_id: String,
    /// See [`MetadataProvider::app_name`].
    pub app_name: String,
    /// See [`MetadataProvider::app_version`].
    pub app_version: String,
    /// See [`MetadataProvider::os_version`].
    pub os_version: String,
    /// See [`MetadataProvider::device_model`].
    pub device_model: String,
    /// See [`MetadataProvider::device_brand`].
    pub device_brand: String,
    /// See [`MetadataProvider::device_name`].
    pub device_name: String,
    /// Companion SDK versions, `None` if there are none.
    pub rmc_sdks: Option<HashMap<String, String>>,
}

impl AppMetadata {
    /// Queries `provider` once, degrading missing values to empty strings.
    pub fn capture(provider: &dyn MetadataProvider) -> AppMetadata {
        let rmc_sdks = provider.companion_sdks();
        AppMetadata {
            app_id: provider.app_id().unwrap_or_default(),
            app_name: provider.app_name().unwrap_or_default(),
            app_version: provider.app_version().unwrap_or_default(),
            os_version: provider.os_version().unwrap_or_default(),
            device_model: provider.device_model().unwrap_or_default(),
            device_brand: provider.device_brand().unwrap_or_default(),
            device_name: provider.device_name().unwrap_or_default(),
            rmc_sdks: (!rmc_sdks.is_empty()).then_some(rmc_sdks),
        }
    }
}

impl MetadataProvider for AppMetadata {
    fn app_id(&self) -> Option<String> {
        Some(self.app_id.clone())
    }
    fn app_name(&self) -> Option<String> {
        Some(self.app_name.clone())
    }
    fn app_version(&self) -> Option<String> {
        Some(self.app_version.clone())
    }
    fn os_version(&self) -> Option<String> {
        Some(self.os_version.clone())
    }
    fn device_model(&self) -> Option<String> {
        Some(self.device_model.clone())
    }
    fn device_brand(&self) -> Option<String> {
        Some(self.device_brand.clone())
    }
    fn device_name(&self) -> Option<String> {
        Some(self.device_name.clone())
    }
    fn companion_sdks(&self) -> HashMap<String, String> {
        self.rmc_sdks.clone().unwrap_or_default()
    }
}

/// Builds events with the metadata captured at configuration time.
#[derive(Debug, Clone)]
pub struct EventFactory {
    metadata: AppMetadata,
}

impl EventFactory {
    /// Create a factory, capturing metadata from `provider`.
    pub fn new(provider: &dyn MetadataProvider) -> EventFactory {
        EventFactory {
            metadata: AppMetadata::capture(provider),
        }
    }

    /// Metadata attached to every event built by this factory.
    pub fn metadata(&self) -> &AppMetadata {
        &self.metadata
    }

    /// Builds a new event with zero occurrences. Caller-supplied fields are truncated to the
    /// lengths the backend accepts.
    pub fn build_event(
        &self,
        event_type: EventType,
        source_name: &str,
        source_version: &str,
        error_code: &str,
        error_message: &str,
        info: Option<HashMap<String, String>>,
    ) -> EventRecord {
        let metadata = &self.metadata;
        EventRecord {
            event_version: EVENT_VERSION.to_owned(),
            event_type,
            app_id: metadata.app_id.clone(),
            app_name: metadata.app_name.clone(),
            app_version: metadata.app_version.clone(),
            platform: PLATFORM.to_owned(),
            os_version: metadata.os_version.clone(),
            device_model: metadata.device_model.clone(),
            device_brand: metadata.device_brand.clone(),
            device_name: metadata.device_name.clone(),
            source_name: sanitize(source_name, MAX_EVENT_PARAM_LENGTH),
            source_version: sanitize(source_version, MAX_EVENT_PARAM_LENGTH),
            error_code: sanitize(error_code, MAX_EVENT_PARAM_LENGTH),
            error_message: sanitize(error_message, MAX_EVENT_MESSAGE_LENGTH),
            rmc_sdks: metadata.rmc_sdks.clone(),
            info: info.map(|info| {
                info.into_iter()
                    .map(|(key, value)| {
                        (
                            sanitize(&key, MAX_EVENT_PARAM_LENGTH),
                            sanitize(&value, MAX_EVENT_MESSAGE_LENGTH),
                        )
                    })
                    .collect()
            }),
            occurrence_count: 0,
            first_occurrence_millis: None,
        }
    }
}

/// Truncates `value` to at most `max_chars` characters.
pub(crate) fn sanitize(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_index, _)) => value[..byte_index].to_owned(),
        None => value.to_owned(),
    }
}
