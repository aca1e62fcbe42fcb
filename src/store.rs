//! Flat JSON file persistence
//!
//! Every store in the assistant is a single JSON document that is read,
//! modified and written back wholesale. `JsonFile` serialises those
//! read-modify-write cycles inside the process so the reminder poller and the
//! command path cannot lose each other's updates.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A JSON document on disk holding a value of type `T`
pub struct JsonFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Open a store, creating the file with an empty document if it is missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        };

        if !store.path.exists() {
            if let Some(parent) = store.path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create store directory: {}", parent.display())
                })?;
            }
            store.write(&T::default())?;
            log::debug!("Created empty store: {}", store.path.display());
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document
    pub fn load(&self) -> Result<T> {
        let _guard = self.guard();
        self.read()
    }

    /// Replace the whole document
    pub fn save(&self, value: &T) -> Result<()> {
        let _guard = self.guard();
        self.write(value)
    }

    /// Locked read-modify-write. The document is only written back when `f`
    /// reports a change.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> (R, bool)) -> Result<R> {
        let _guard = self.guard();
        let mut value = self.read()?;
        let (result, changed) = f(&mut value);
        if changed {
            self.write(&value)?;
        }
        Ok(result)
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // A poisoned lock only means another thread panicked mid-update; the
        // file on disk is still the source of truth.
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> Result<T> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read store: {}", self.path.display()))
            }
        };

        if content.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store: {}", self.path.display()))
    }

    fn write(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize store")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write store: {}", self.path.display()))
    }
}

/// Next sequential id for a store keyed `"{prefix}-{n}"`.
///
/// Starts from `len + 1` and counts upward past ids still in use, so a
/// removal followed by an add never overwrites an existing entry.
pub fn next_sequential_id<'a>(prefix: &str, keys: impl IntoIterator<Item = &'a String>) -> String {
    let keys: Vec<&String> = keys.into_iter().collect();
    let mut n = keys.len() + 1;
    loop {
        let candidate = format!("{}-{}", prefix, n);
        if !keys.iter().any(|k| **k == candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Numeric suffix of a sequential id, used to list entries in creation order
pub fn id_number(id: &str) -> u64 {
    id.rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_open_creates_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("items.json");
        let store: JsonFile<BTreeMap<String, String>> = JsonFile::open(&path).unwrap();

        assert!(path.exists());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_update_only_writes_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        let store: JsonFile<BTreeMap<String, String>> = JsonFile::open(&path).unwrap();

        store
            .update(|m| {
                m.insert("a".into(), "1".into());
                ((), true)
            })
            .unwrap();
        store
            .update(|m| {
                m.insert("b".into(), "2".into());
                ((), false)
            })
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["a"], "1");
    }

    #[test]
    fn test_empty_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        fs::write(&path, "").unwrap();
        let store: JsonFile<BTreeMap<String, String>> = JsonFile::open(&path).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        fs::write(&path, "{ not json").unwrap();
        let store: JsonFile<BTreeMap<String, String>> = JsonFile::open(&path).unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_next_sequential_id() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(next_sequential_id("task", &empty), "task-1");

        let keys = vec!["task-1".to_string(), "task-3".to_string()];
        // len + 1 == 3 is taken after task-2 was removed
        assert_eq!(next_sequential_id("task", &keys), "task-4");

        let keys = vec!["task-2".to_string()];
        assert_eq!(next_sequential_id("task", &keys), "task-3");
    }

    #[test]
    fn test_id_number() {
        assert_eq!(id_number("reminder-12"), 12);
        assert_eq!(id_number("task-2"), 2);
        assert_eq!(id_number("garbage"), u64::MAX);
    }
}
