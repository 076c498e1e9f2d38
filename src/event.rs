//! Event records and their content-based identity.
use std::collections::HashMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Schema version of [`EventRecord`] understood by the backend.
pub const EVENT_VERSION: &str = "1.0";

/// Platform reported with every event.
pub const PLATFORM: &str = "Android";

/// Severity of an event.
///
/// Serialized as the numeric code the backend expects: `"0"` for critical, `"1"` for warning.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// An error that may cause the caller to not function properly. Sent immediately.
    #[serde(rename = "0")]
    #[display(fmt = "0")]
    Critical,
    /// An unexpected situation the caller can recover from. Sent at a later time.
    #[serde(rename = "1")]
    #[display(fmt = "1")]
    Warning,
}

/// One logged occurrence of an event, as stored locally and sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Schema version, always [`EVENT_VERSION`].
    pub event_version: String,
    /// Severity. A delivered critical event is stored as a warning afterwards.
    pub event_type: EventType,
    /// Identifier of the host application.
    pub app_id: String,
    /// Name of the host application.
    pub app_name: String,
    /// Version of the host application.
    pub app_version: String,
    /// Always [`PLATFORM`].
    pub platform: String,
    /// Operating system version of the device.
    pub os_version: String,
    /// Device model.
    pub device_model: String,
    /// Device manufacturer.
    pub device_brand: String,
    /// User-visible device name.
    pub device_name: String,
    /// Name of the SDK that reported the event.
    #[serde(rename = "sdkName")]
    pub source_name: String,
    /// Version of the SDK that reported the event.
    #[serde(rename = "sdkVersion")]
    pub source_version: String,
    /// Error code of the reporting SDK or HTTP status of its backend, e.g., `"500"`.
    pub error_code: String,
    /// Description of the error, e.g., a stack trace.
    pub error_message: String,
    /// Versions of companion SDKs bundled in the host application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmc_sdks: Option<HashMap<String, String>>,
    /// Free-form diagnostic context supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<HashMap<String, String>>,
    /// Number of occurrences since the event was stored.
    pub occurrence_count: u32,
    /// Epoch milliseconds of the first stored occurrence. Set once, never updated.
    #[serde(
        rename = "firstOccurrenceOn",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub first_occurrence_millis: Option<i64>,
}

impl EventRecord {
    /// Returns the fingerprint of this record, see [`fingerprint()`].
    pub fn fingerprint(&self) -> String {
        fingerprint(
            self.event_type,
            &self.app_version,
            &self.source_name,
            &self.error_code,
            &self.error_message,
        )
    }

    /// Counts one more occurrence.
    pub fn increment_count(&mut self) {
        self.occurrence_count = self.occurrence_count.saturating_add(1);
    }

    /// Records `now_millis` as the first occurrence unless one is already set.
    pub fn mark_first_occurrence(&mut self, now_millis: i64) {
        self.first_occurrence_millis.get_or_insert(now_millis);
    }
}

/// Computes the storage and deduplication key of an event.
///
/// The key is the hex MD5 digest of the concatenated defining fields. When the digest cannot be
/// produced, the raw concatenation is used instead so that deduplication keeps working.
pub fn fingerprint(
    event_type: EventType,
    app_version: &str,
    source_name: &str,
    error_code: &str,
    error_message: &str,
) -> String {
    // No separator between fields, so ("ab", "c") and ("a", "bc") collide. Kept: the backend
    // derives the same keys.
    let raw = format!("{event_type}{app_version}{source_name}{error_code}{error_message}");
    md5_hex(&raw).unwrap_or(raw)
}

fn md5_hex(input: &str) -> Option<String> {
    let digest = format!("{:x}", md5::compute(input.as_bytes()));
    // 128 bits in hex
    (digest.len() == 32).then_some(digest)
}
