use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::timer::model::{RegistrySnapshot, parse_snapshot_text, serialize_snapshot};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unable to read timer state from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to write timer state to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to serialize timer state")]
    Serialize(#[source] anyhow::Error),
}

/// Durable home of the registry snapshot.
///
/// `save` writes the entire snapshot through on every call; `load` is
/// best-effort and must not fail startup: missing or corrupt state comes
/// back as the empty snapshot.
pub trait TimerStore: Send {
    fn save(&mut self, snapshot: &RegistrySnapshot) -> Result<(), StorageError>;
    fn load(&mut self) -> RegistrySnapshot;
}

/// Snapshot persisted as a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TimerStore for JsonFileStore {
    fn save(&mut self, snapshot: &RegistrySnapshot) -> Result<(), StorageError> {
        let text = serialize_snapshot(snapshot).map_err(StorageError::Serialize)?;
        fs::write(&self.path, format!("{text}\n")).map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn load(&mut self) -> RegistrySnapshot {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return RegistrySnapshot::default();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "unable to read timer state, starting empty");
                return RegistrySnapshot::default();
            }
        };
        match parse_snapshot_text(&content) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt timer state, starting empty");
                RegistrySnapshot::default()
            }
        }
    }
}

/// Snapshot kept as an in-process blob.
///
/// Useful in tests and for embedders that own an opaque key-value slot and
/// move the blob in and out themselves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Some(blob.into()),
        }
    }

    pub fn blob(&self) -> Option<&str> {
        self.blob.as_deref()
    }
}

impl TimerStore for MemoryStore {
    fn save(&mut self, snapshot: &RegistrySnapshot) -> Result<(), StorageError> {
        let text = serialize_snapshot(snapshot).map_err(StorageError::Serialize)?;
        self.blob = Some(text);
        Ok(())
    }

    fn load(&mut self) -> RegistrySnapshot {
        let Some(content) = self.blob.as_deref() else {
            return RegistrySnapshot::default();
        };
        match parse_snapshot_text(content) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "corrupt timer state blob, starting empty");
                RegistrySnapshot::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::timer::model::Timer;

    fn sample_snapshot() -> RegistrySnapshot {
        RegistrySnapshot {
            next_timer_id: 3,
            timers: vec![
                Timer::staged(1, 300, "5:00", "Apples"),
                Timer::staged(2, 90, "1:30", ""),
            ],
        }
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempdir().expect("tempdir");
        let mut store = JsonFileStore::new(dir.path().join("timers.json"));

        store.save(&sample_snapshot()).expect("save");
        let restored = store.load();
        assert_eq!(restored.next_timer_id, 3);
        assert_eq!(restored.timers.len(), 2);
        assert_eq!(restored.timers[0].description, "Apples");
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().expect("tempdir");
        let mut store = JsonFileStore::new(dir.path().join("absent.json"));
        let snapshot = store.load();
        assert_eq!(snapshot.next_timer_id, 1);
        assert!(snapshot.timers.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("timers.json");
        std::fs::write(&path, "{ not-valid-json ").expect("write junk");

        let mut store = JsonFileStore::new(path);
        let snapshot = store.load();
        assert!(snapshot.timers.is_empty());
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryStore::new();
        assert!(store.load().timers.is_empty());

        store.save(&sample_snapshot()).expect("save");
        assert!(store.blob().is_some_and(|b| b.contains("nextTimerId")));
        let restored = store.load();
        assert_eq!(restored.timers.len(), 2);
    }

    #[test]
    fn memory_store_with_corrupt_blob_loads_empty() {
        let mut store = MemoryStore::with_blob("][");
        assert!(store.load().timers.is_empty());
    }
}
