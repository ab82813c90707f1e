//! Key-value persistence for state that must survive restarts.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistError;

/// A string-valued key-value store. Values are JSON documents; use the typed
/// `load`/`save` helpers on `dyn KeyValueStore` rather than these directly.
pub trait KeyValueStore: Send + Sync {
    fn load_raw(&self, key: &str) -> Result<Option<String>, PersistError>;

    fn save_raw(&self, key: &str, value: String) -> Result<(), PersistError>;
}

impl dyn KeyValueStore {
    pub fn load<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PersistError> {
        self.load_raw(key)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|source| PersistError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    pub fn save<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), PersistError> {
        let raw = serde_json::to_string(value).map_err(|source| {
            PersistError::Serialization {
                key: key.to_string(),
                source,
            }
        })?;
        self.save_raw(key, raw)
    }
}

/// Keeps values in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn save_raw(&self, key: &str, value: String) -> Result<(), PersistError> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous value readable.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) the directory backing this store.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PersistError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn save_raw(&self, key: &str, value: String) -> Result<(), PersistError> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, value)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|source| PersistError::Io {
                key: key.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store: Box<dyn KeyValueStore> = Box::new(MemoryStore::new());

        assert_eq!(store.load::<Vec<u64>>("k").unwrap(), None);
        store.save("k", &vec![1u64, 2, 3]).unwrap();
        assert_eq!(store.load::<Vec<u64>>("k").unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store: Box<dyn KeyValueStore> =
                Box::new(FileStore::open(dir.path().join("state")).unwrap());
            store.save("jobs", &vec!["a".to_string()]).unwrap();
        }

        let store: Box<dyn KeyValueStore> =
            Box::new(FileStore::open(dir.path().join("state")).unwrap());
        assert_eq!(
            store.load::<Vec<String>>("jobs").unwrap(),
            Some(vec!["a".to_string()])
        );
        assert!(!dir.path().join("state/jobs.json.tmp").exists());
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let store: Box<dyn KeyValueStore> = Box::new(MemoryStore::new());
        store.save_raw("k", "not json".into()).unwrap();

        assert!(matches!(
            store.load::<Vec<u64>>("k"),
            Err(PersistError::Serialization { .. })
        ));
    }
}
