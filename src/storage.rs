//! Persistent string key-value namespaces backing the event store and the delivery cache.
use std::{
    collections::BTreeMap,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use crate::error::StorageError;

/// A single namespace of string keys mapped to string values.
///
/// Implementations are owned by one writer (the delivery queue worker), so they don't need to be
/// `Sync`.
pub trait KeyValueStore: Send {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Returns all keys in the namespace, in ascending order.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&mut self, key: &str, value: String) -> Result<(), StorageError>;

    /// Removes all `keys`. Missing keys are ignored.
    fn remove(&mut self, keys: &[String]) -> Result<(), StorageError>;

    /// Removes every key in the namespace.
    fn clear(&mut self) -> Result<(), StorageError> {
        let keys = self.keys()?;
        self.remove(&keys)
    }
}

/// In-memory [`KeyValueStore`]. Contents are lost when the process exits.
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyValueStore {
    entries: BTreeMap<String, String>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> MemoryKeyValueStore {
        MemoryKeyValueStore::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn put(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&mut self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}

/// [`KeyValueStore`] persisted as a JSON object in `<dir>/<namespace>.json`.
///
/// The file is read once on open and rewritten on every mutation. Writes go to a temporary file
/// first and are renamed over the original, so a crash never leaves a half-written namespace.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileKeyValueStore {
    /// Opens the `namespace` in `dir`.
    ///
    /// A missing file is an empty namespace. An unreadable or corrupt file is logged and treated
    /// as empty as well; it is replaced on the next write.
    pub fn open(dir: impl AsRef<Path>, namespace: &str) -> FileKeyValueStore {
        let path = dir.as_ref().join(format!("{namespace}.json"));
        let entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!(target: "event_logger", namespace; "discarding unreadable storage file: {:?}", err);
                BTreeMap::new()
            }
        };
        FileKeyValueStore { path, entries }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let contents = serde_json::to_vec(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Applies `mutation` to a copy of the entries and commits it only once it's on disk, so
    /// memory and file never disagree.
    fn mutate(
        &mut self,
        mutation: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let mut entries = self.entries.clone();
        mutation(&mut entries);
        self.persist(&entries)?;
        self.entries = entries;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn put(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.mutate(|entries| {
            entries.insert(key.to_owned(), value);
        })
    }

    fn remove(&mut self, keys: &[String]) -> Result<(), StorageError> {
        if !keys.iter().any(|key| self.entries.contains_key(key)) {
            return Ok(());
        }
        self.mutate(|entries| {
            for key in keys {
                entries.remove(key);
            }
        })
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.mutate(BTreeMap::clear)
    }
}
