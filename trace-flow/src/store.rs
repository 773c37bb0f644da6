use dashmap::DashMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs;
use std::path::PathBuf;

use crate::error::{FlowError, Result};

/// Current on-disk schema version. Bump when a persisted shape changes;
/// `load_or` treats any other version as absent data.
pub const SCHEMA_VERSION: u32 = 1;

/// Versioned wrapper around every persisted value.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub schema_version: u32,
    pub payload: T,
}

/// Durable, synchronous key-value persistence.
///
/// `load_raw` fails soft (missing data is `None`); `save_raw` reports
/// failures so callers can surface a warning without losing in-memory
/// state. Values are JSON strings; typed access goes through [`load_or`]
/// and [`save`].
pub trait KvStore: Send + Sync {
    fn load_raw(&self, key: &str) -> Option<String>;
    fn save_raw(&self, key: &str, value: String) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Load a typed value, yielding `default` on missing key, malformed JSON,
/// or a schema-version mismatch. Never fails.
pub fn load_or<T: DeserializeOwned>(store: &dyn KvStore, key: &str, default: T) -> T {
    let Some(raw) = store.load_raw(key) else {
        return default;
    };
    match serde_json::from_str::<Envelope<T>>(&raw) {
        Ok(envelope) if envelope.schema_version == SCHEMA_VERSION => envelope.payload,
        Ok(envelope) => {
            tracing::warn!(
                key,
                found = envelope.schema_version,
                expected = SCHEMA_VERSION,
                "schema version mismatch, using default"
            );
            default
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "corrupt stored value, using default");
            default
        }
    }
}

/// Persist a typed value under the current schema version.
pub fn save<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(&Envelope {
        schema_version: SCHEMA_VERSION,
        payload: value,
    })?;
    store.save_raw(key, raw)
}

/// DashMap-backed store for tests and ephemeral sessions.
pub struct InMemoryKvStore {
    entries: DashMap<String, String>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for InMemoryKvStore {
    fn load_raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    fn save_raw(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory; survives process restarts.
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| FlowError::Storage(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // keys are internal identifiers, but never let one escape the dir
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl KvStore for FileKvStore {
    fn load_raw(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn save_raw(&self, key: &str, value: String) -> Result<()> {
        fs::write(self.path_for(key), value).map_err(|e| FlowError::Storage(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FlowError::Storage(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        email: String,
        count: u32,
    }

    fn sample() -> Record {
        Record {
            email: "ama@x.com".to_string(),
            count: 3,
        }
    }

    #[test]
    fn memory_round_trip() {
        let store = InMemoryKvStore::new();
        save(&store, "record", &sample()).unwrap();
        let loaded: Record = load_or(&store, "record", Record {
            email: String::new(),
            count: 0,
        });
        assert_eq!(loaded, sample());
    }

    #[test]
    fn missing_key_yields_default() {
        let store = InMemoryKvStore::new();
        let loaded: Vec<Record> = load_or(&store, "nothing", Vec::new());
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_value_yields_default() {
        let store = InMemoryKvStore::new();
        store.save_raw("record", "{not json".to_string()).unwrap();
        let loaded: Option<Record> = load_or(&store, "record", None);
        assert!(loaded.is_none());
    }

    #[test]
    fn version_mismatch_yields_default() {
        let store = InMemoryKvStore::new();
        let stale = serde_json::json!({ "schema_version": 99, "payload": sample() });
        store.save_raw("record", stale.to_string()).unwrap();
        let loaded: Option<Record> = load_or(&store, "record", None);
        assert!(loaded.is_none());
    }

    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("trace-flow-test-{}", uuid::Uuid::new_v4()));
        let store = FileKvStore::new(&dir).unwrap();
        save(&store, "current_user", &Some(sample())).unwrap();

        // a fresh handle sees the same data, like a page reload would
        let reopened = FileKvStore::new(&dir).unwrap();
        let loaded: Option<Record> = load_or(&reopened, "current_user", None);
        assert_eq!(loaded, Some(sample()));

        reopened.remove("current_user").unwrap();
        let cleared: Option<Record> = load_or(&reopened, "current_user", None);
        assert!(cleared.is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
