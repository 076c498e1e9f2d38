//! Persistent reference time of the last successful delivery.
use crate::{error::StorageError, storage::KeyValueStore};

/// Namespace of the delivery cache when persisted.
pub const CACHE_NAMESPACE: &str = "event_logger.cache";

const KEY_TTL_REFERENCE_TIME: &str = "ttl_reference_time";

/// Holds the time of the last successful full flush, used to decide when stored events expire.
pub struct DeliveryCache {
    storage: Box<dyn KeyValueStore>,
}

impl DeliveryCache {
    /// Create a delivery cache backed by `storage`.
    pub fn new(storage: impl KeyValueStore + 'static) -> DeliveryCache {
        DeliveryCache::from_boxed(Box::new(storage))
    }

    pub(crate) fn from_boxed(storage: Box<dyn KeyValueStore>) -> DeliveryCache {
        DeliveryCache { storage }
    }

    /// Returns the reference time in epoch milliseconds, or `None` if it was never set or can't
    /// be read.
    pub fn ttl_reference_time(&self) -> Option<i64> {
        match self.read() {
            Ok(value) => value,
            Err(err) => {
                log::warn!(target: "event_logger", "failed to read ttl reference time: {:?}", err);
                None
            }
        }
    }

    /// Updates the reference time. Call this whenever all events were delivered.
    pub fn set_ttl_reference_time(&mut self, millis: i64) {
        if let Err(err) = self.storage.put(KEY_TTL_REFERENCE_TIME, millis.to_string()) {
            log::warn!(target: "event_logger", "failed to store ttl reference time: {:?}", err);
        }
    }

    fn read(&self) -> Result<Option<i64>, StorageError> {
        let Some(value) = self.storage.get(KEY_TTL_REFERENCE_TIME)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&value)?))
    }
}
