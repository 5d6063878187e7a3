//! Persisted session state.
//!
//! The state file is the only thing shared between concurrent invocations.
//! Readers never lock. Writers go through [`StateStore::compare_and_swap`],
//! which holds an advisory lock on a sidecar file only while it compares the
//! stored version and renames a fully written temp file into place.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::paths::Paths;

/// Retries after a lost compare-and-swap in [`StateStore::save`]
const MAX_RETRIES: usize = 1;

/// State stored in ~/.kube/kubesess/state.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Bumped on every write
    #[serde(default)]
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_namespace: Option<String>,

    /// Namespaces used per context
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seen_namespaces: BTreeMap<String, BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn seen_namespaces(&self, context: &str) -> BTreeSet<String> {
        self.seen_namespaces.get(context).cloned().unwrap_or_default()
    }

    pub fn record_namespace(&mut self, context: &str, namespace: &str) {
        self.seen_namespaces
            .entry(context.to_string())
            .or_default()
            .insert(namespace.to_string());
    }
}

/// What is on disk, for diagnostics
#[derive(Debug)]
pub enum StateHealth {
    Missing,
    Valid(SessionState),
    Corrupt(String),
}

/// Versioned access to the state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");
        Self { path, lock_path }
    }

    pub fn from_paths(paths: &Paths) -> Self {
        Self {
            path: paths.state_file.clone(),
            lock_path: paths.lock_file(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current state.
    ///
    /// A missing file is the zero state. A corrupt file is logged and treated
    /// as missing; the next successful write replaces it.
    pub fn load(&self) -> Result<SessionState> {
        match self.inspect()? {
            StateHealth::Missing => Ok(SessionState::default()),
            StateHealth::Valid(state) => Ok(state),
            StateHealth::Corrupt(reason) => {
                let err = Error::CorruptState {
                    path: self.path.clone(),
                    reason,
                };
                warn!("{}; starting from empty state", err);
                Ok(SessionState::default())
            }
        }
    }

    pub fn inspect(&self) -> Result<StateHealth> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StateHealth::Missing),
            Err(source) => {
                return Err(Error::StoreUnavailable {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(StateHealth::Corrupt("file is empty".to_string()));
        }

        Ok(match serde_json::from_str(&content) {
            Ok(state) => StateHealth::Valid(state),
            Err(e) => StateHealth::Corrupt(e.to_string()),
        })
    }

    /// Write `new_state` only if the stored version is still `expected`.
    ///
    /// Returns the state as written, with its version bumped.
    pub fn compare_and_swap(&self, expected: u64, mut new_state: SessionState) -> Result<SessionState> {
        self.ensure_dir()?;
        let _lock = StateLock::acquire(&self.lock_path)?;

        let found = match self.inspect()? {
            StateHealth::Valid(current) => current.version,
            StateHealth::Missing | StateHealth::Corrupt(_) => 0,
        };
        if found != expected {
            return Err(Error::Conflict { expected, found });
        }

        new_state.version = expected + 1;
        new_state.updated_at = Some(Utc::now());
        self.write_atomic(&new_state)?;

        debug!(version = new_state.version, path = %self.path.display(), "state written");
        Ok(new_state)
    }

    /// Apply `change` to the latest state and write it.
    ///
    /// On a conflict the state is re-read and `change` re-applied, at most
    /// [`MAX_RETRIES`] times. The last writer wins; nothing is ever torn.
    pub fn save<F>(&self, mut change: F) -> Result<SessionState>
    where
        F: FnMut(&mut SessionState),
    {
        let mut attempt = 0;
        loop {
            let mut state = self.load()?;
            let expected = state.version;
            change(&mut state);

            match self.compare_and_swap(expected, state) {
                Err(Error::Conflict { expected, found }) if attempt < MAX_RETRIES => {
                    debug!(expected, found, "state changed underneath us, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::StoreUnavailable {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    fn write_atomic(&self, state: &SessionState) -> Result<()> {
        let unavailable = |source: std::io::Error| Error::StoreUnavailable {
            path: self.path.clone(),
            source,
        };

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| unavailable(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        // Per-process name so two writers never share a temp file
        let temp_path = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));

        let written = File::create(&temp_path).and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&temp_path, &self.path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(unavailable(e));
        }
        Ok(())
    }
}

/// Exclusive advisory lock on the sidecar file, released on drop
struct StateLock {
    file: File,
}

impl StateLock {
    fn acquire(path: &Path) -> Result<Self> {
        let unavailable = |source: std::io::Error| Error::StoreUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(unavailable)?;

        // The OS drops the lock if its holder dies, so this cannot wedge.
        file.lock_exclusive().map_err(unavailable)?;
        Ok(Self { file })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> StateStore {
        StateStore::new(temp_dir.path().join("kubesess").join("state.json"))
    }

    #[test]
    fn test_state_default() {
        let state = SessionState::default();
        assert!(state.active_context.is_none());
        assert!(state.active_namespace.is_none());
        assert_eq!(state.version, 0);
    }

    #[test]
    fn test_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let state = store(&temp_dir).load().unwrap();
        assert_eq!(state, SessionState::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let written = store
            .save(|s| {
                s.active_context = Some("work".to_string());
                s.active_namespace = Some("apps".to_string());
                s.record_namespace("work", "apps");
            })
            .unwrap();
        assert_eq!(written.version, 1);
        assert!(written.updated_at.is_some());

        let loaded = store.load().unwrap();
        assert_eq!(loaded, written);
        assert!(loaded.seen_namespaces("work").contains("apps"));
    }

    #[test]
    fn test_versions_are_monotonic() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        for i in 1..=3 {
            let state = store.save(|s| s.active_context = Some(format!("c{}", i))).unwrap();
            assert_eq!(state.version, i);
        }
    }

    #[test]
    fn test_compare_and_swap_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let stale = store.load().unwrap();
        store.save(|s| s.active_context = Some("first".to_string())).unwrap();

        let mut update = stale.clone();
        update.active_context = Some("second".to_string());
        let result = store.compare_and_swap(stale.version, update);

        assert!(matches!(result, Err(Error::Conflict { expected: 0, found: 1 })));
        assert_eq!(store.load().unwrap().active_context.as_deref(), Some("first"));
    }

    #[test]
    fn test_corrupt_state_recovers() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.inspect().unwrap(), StateHealth::Corrupt(_)));
        assert_eq!(store.load().unwrap(), SessionState::default());

        let state = store.save(|s| s.active_context = Some("fixed".to_string())).unwrap();
        assert_eq!(state.version, 1);
        assert!(matches!(store.inspect().unwrap(), StateHealth::Valid(_)));
    }

    #[test]
    fn test_store_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = StateStore::new(blocker.join("state.json"));

        let result = store.save(|s| s.active_context = Some("x".to_string()));
        assert!(matches!(result, Err(Error::StoreUnavailable { .. })));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.save(|s| s.active_context = Some("x".to_string())).unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_concurrent_saves_never_tear() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        let barrier = Arc::new(Barrier::new(2));

        let writers: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|name| {
                let store = StateStore::new(&path);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.save(|s| s.active_context = Some(name.to_string()))
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap().unwrap();
        }

        let store = StateStore::new(&path);
        match store.inspect().unwrap() {
            StateHealth::Valid(state) => {
                assert_eq!(state.version, 2);
                let active = state.active_context.unwrap();
                assert!(active == "left" || active == "right");
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }
}
