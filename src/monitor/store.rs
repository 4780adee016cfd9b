//! Persistence of [`MonitorState`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::error::StateError;
use super::fingerprint::fingerprint;
use super::state::{state_key, MonitorState};

/// Storage for per-file monitor state, keyed by absolute file path.
pub trait StateStore: Send + Sync {
    /// Load state for `path`. `Ok(None)` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if stored state exists but cannot be read or decoded.
    fn load(&self, path: &Path) -> Result<Option<MonitorState>, StateError>;

    /// Store `state` under `state.path`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn save(&self, state: &MonitorState) -> Result<(), StateError>;

    /// Forget `path`. Removing a missing entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing entry cannot be removed.
    fn remove(&self, path: &Path) -> Result<(), StateError>;
}

/// One JSON document per tracked file under a state directory.
///
/// A corrupt document only affects its own file. Writes go to a temporary
/// file first and are renamed into place.
#[derive(Debug)]
pub struct JsonStateStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStateStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Document path for a tracked file.
    #[must_use]
    pub fn entry_path(&self, path: &Path) -> PathBuf {
        let key = state_key(path);
        let name = fingerprint(key.as_os_str().as_encoded_bytes());
        self.dir.join(format!("{name}.json"))
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StateError + '_ {
        move |source| StateError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl StateStore for JsonStateStore {
    fn load(&self, path: &Path) -> Result<Option<MonitorState>, StateError> {
        let entry = self.entry_path(path);
        let content = match fs::read_to_string(&entry) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_err(&entry)(e)),
        };

        let state: MonitorState =
            serde_json::from_str(&content).map_err(|source| StateError::Corrupt {
                path: entry.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), offset = state.offset, "Loaded monitor state");
        Ok(Some(state))
    }

    fn save(&self, state: &MonitorState) -> Result<(), StateError> {
        let entry = self.entry_path(&state.path);
        let content = serde_json::to_string_pretty(state)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))?;

        let temp_path = entry.with_extension("json.tmp");
        fs::write(&temp_path, content).map_err(Self::io_err(&temp_path))?;
        fs::rename(&temp_path, &entry).map_err(Self::io_err(&entry))?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StateError> {
        let entry = self.entry_path(path);
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&entry) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(&entry)(e)),
        }
    }
}

/// In-process store, for tests and runs that should not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<PathBuf, MonitorState>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, path: &Path) -> Result<Option<MonitorState>, StateError> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(states.get(&state_key(path)).cloned())
    }

    fn save(&self, state: &MonitorState) -> Result<(), StateError> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(state_key(&state.path), state.clone());
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StateError> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(&state_key(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn state(path: &str, offset: u64) -> MonitorState {
        MonitorState {
            path: PathBuf::from(path),
            offset,
            size: offset,
            mtime: Utc.with_ymd_and_hms(2026, 1, 29, 10, 0, 0).unwrap(),
            tail_fingerprint: "f".repeat(64),
            line: 2,
        }
    }

    #[test]
    fn test_json_store_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().join("state"));

        assert!(store.load(Path::new("/tmp/a.jsonl")).unwrap().is_none());

        store.save(&state("/tmp/a.jsonl", 10)).unwrap();
        store.save(&state("/tmp/a.jsonl", 20)).unwrap();
        let loaded = store.load(Path::new("/tmp/a.jsonl")).unwrap().unwrap();
        assert_eq!(loaded.offset, 20);

        // No temp files left behind.
        let names: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[test]
    fn test_json_store_corrupt_entry_is_isolated() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().to_path_buf());
        store.save(&state("/tmp/a.jsonl", 10)).unwrap();
        store.save(&state("/tmp/b.jsonl", 30)).unwrap();

        fs::write(store.entry_path(Path::new("/tmp/a.jsonl")), "{not json").unwrap();

        assert!(matches!(
            store.load(Path::new("/tmp/a.jsonl")),
            Err(StateError::Corrupt { .. })
        ));
        assert_eq!(
            store.load(Path::new("/tmp/b.jsonl")).unwrap().unwrap().offset,
            30
        );
    }

    #[test]
    fn test_json_store_remove() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().to_path_buf());
        store.save(&state("/tmp/a.jsonl", 10)).unwrap();
        store.remove(Path::new("/tmp/a.jsonl")).unwrap();
        store.remove(Path::new("/tmp/a.jsonl")).unwrap();
        assert!(store.load(Path::new("/tmp/a.jsonl")).unwrap().is_none());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStateStore::new();
        store.save(&state("/tmp/a.jsonl", 10)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.load(Path::new("/tmp/a.jsonl")).unwrap().unwrap().offset,
            10
        );
        store.remove(Path::new("/tmp/a.jsonl")).unwrap();
        assert!(store.is_empty());
    }
}
