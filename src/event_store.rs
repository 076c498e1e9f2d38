//! Local store of events keyed by fingerprint.
use std::cmp::Ordering;

use crate::{error::StorageError, event::EventRecord, storage::KeyValueStore};

/// Namespace of the event store when persisted.
pub const EVENTS_NAMESPACE: &str = "event_logger.events";

/// Persistent keyed store of [`EventRecord`]s.
///
/// Storage must never crash the host, so every failure is logged and coerced: failed reads look
/// like missing records, failed writes are dropped.
pub struct EventStore {
    storage: Box<dyn KeyValueStore>,
}

impl EventStore {
    /// Create an event store backed by `storage`.
    pub fn new(storage: impl KeyValueStore + 'static) -> EventStore {
        EventStore::from_boxed(Box::new(storage))
    }

    pub(crate) fn from_boxed(storage: Box<dyn KeyValueStore>) -> EventStore {
        EventStore { storage }
    }

    /// Returns the event stored under `id`, or `None` if it's absent or unreadable.
    pub fn get_by_id(&self, id: &str) -> Option<EventRecord> {
        self.read(id)
            .inspect_err(|err| {
                log::warn!(target: "event_logger", id; "failed to read stored event: {:?}", err);
            })
            .ok()
            .flatten()
    }

    /// Returns all readable events with their storage keys, in key order.
    ///
    /// Entries that can't be decoded are deleted, so they don't occupy capacity forever.
    pub fn get_all(&mut self) -> Vec<(String, EventRecord)> {
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(err) => {
                log::warn!(target: "event_logger", "failed to list stored events: {:?}", err);
                return Vec::new();
            }
        };

        let mut events = Vec::with_capacity(keys.len());
        let mut undecodable = Vec::new();
        for id in keys {
            match self.read(&id) {
                Ok(Some(event)) => events.push((id, event)),
                Ok(None) => {}
                Err(StorageError::Serialization(err)) => {
                    log::warn!(target: "event_logger", id = id.as_str(); "deleting undecodable stored event: {}", err);
                    undecodable.push(id);
                }
                Err(err) => {
                    log::warn!(target: "event_logger", id = id.as_str(); "failed to read stored event: {:?}", err);
                }
            }
        }
        self.delete(&undecodable);
        events
    }

    /// Returns the number of readable stored events, or `None` if storage can't be listed.
    pub fn count(&self) -> Option<usize> {
        let keys = self
            .storage
            .keys()
            .inspect_err(|err| {
                log::warn!(target: "event_logger", "failed to count stored events: {:?}", err);
            })
            .ok()?;
        Some(
            keys.iter()
                .filter(|id| matches!(self.read(id), Ok(Some(_))))
                .count(),
        )
    }

    /// Stores a new event under `id`.
    pub fn insert(&mut self, id: &str, event: &EventRecord) {
        self.write(id, event);
    }

    /// Replaces the event stored under `id`.
    pub fn update(&mut self, id: &str, event: &EventRecord) {
        self.write(id, event);
    }

    /// Deletes the events stored under `ids`.
    pub fn delete(&mut self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        if let Err(err) = self.storage.remove(ids) {
            log::warn!(target: "event_logger", count = ids.len(); "failed to delete events: {:?}", err);
        }
    }

    /// Deletes every stored event.
    pub fn delete_all(&mut self) {
        if let Err(err) = self.storage.clear() {
            log::warn!(target: "event_logger", "failed to delete all events: {:?}", err);
        }
    }

    /// Keeps at most `max_capacity` events, deleting the oldest ones first.
    ///
    /// Age is the first occurrence time; events without one are considered oldest. Ties keep key
    /// order, so the result is deterministic.
    pub fn delete_oldest(&mut self, max_capacity: usize) {
        let mut events = self.get_all();
        if events.len() <= max_capacity {
            return;
        }

        // Stable sort on top of key order.
        events.sort_by(|(_, a), (_, b)| compare_age(a, b));
        let excess = events.len() - max_capacity;
        let ids: Vec<String> = events.into_iter().take(excess).map(|(id, _)| id).collect();

        log::debug!(target: "event_logger", count = ids.len(); "evicting oldest events");
        self.delete(&ids);
    }

    fn read(&self, id: &str) -> Result<Option<EventRecord>, StorageError> {
        let Some(json) = self.storage.get(id)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn write(&mut self, id: &str, event: &EventRecord) {
        let result = serde_json::to_string(event)
            .map_err(StorageError::from)
            .and_then(|json| self.storage.put(id, json));
        if let Err(err) = result {
            log::warn!(target: "event_logger", id; "failed to store event: {:?}", err);
        }
    }
}

fn compare_age(a: &EventRecord, b: &EventRecord) -> Ordering {
    a.first_occurrence_millis.cmp(&b.first_occurrence_millis)
}
