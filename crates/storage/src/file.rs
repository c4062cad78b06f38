//! JSON-document store shared by every process on the host.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::StoreError;
use crate::lock::FileLock;
use crate::traits::GlobalStore;

/// Overrides the store directory.
pub const DIR_ENV: &str = "KWDSL_GLOBAL_DIR";
/// Directory name under the system temp dir when [`DIR_ENV`] is unset.
pub const DEFAULT_DIR_NAME: &str = "kwdsl_global_vars";
pub const DATA_FILE: &str = "global_vars.json";
pub const LOCK_FILE: &str = "global_vars.lock";

type Document = BTreeMap<String, Value>;

/// Global variables persisted as one JSON object, guarded by a sibling lock
/// file. Every operation locks, reads the whole document, and writes it back
/// if it changed. A missing, empty or corrupt document reads as empty.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    data_path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(FileStore {
            data_path: dir.join(DATA_FILE),
            lock_path: dir.join(LOCK_FILE),
            dir,
        })
    }

    /// Store at `$KWDSL_GLOBAL_DIR`, or the shared temp-dir default.
    pub fn from_env() -> Result<Self, StoreError> {
        FileStore::new(default_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    fn with_document<T>(
        &self,
        f: impl FnOnce(&mut Document) -> (T, bool),
    ) -> Result<T, StoreError> {
        let _lock = FileLock::acquire(&self.lock_path)?;
        let mut doc = self.read_document()?;
        let (out, dirty) = f(&mut doc);
        if dirty {
            self.write_document(&doc)?;
        }
        Ok(out)
    }

    fn read_document(&self) -> Result<Document, StoreError> {
        let text = match fs::read_to_string(&self.data_path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(StoreError::io(&self.data_path, e)),
        };
        if text.trim().is_empty() {
            return Ok(Document::new());
        }
        match serde_json::from_str::<Document>(&text) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                tracing::warn!(
                    path = %self.data_path.display(),
                    error = %e,
                    "global variable file is corrupt; treating it as empty"
                );
                Ok(Document::new())
            }
        }
    }

    fn write_document(&self, doc: &Document) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(doc)?;
        let tmp = self
            .dir
            .join(format!("{}.{}.tmp", DATA_FILE, std::process::id()));
        fs::write(&tmp, text).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.data_path).map_err(|e| StoreError::io(&self.data_path, e))
    }
}

pub fn default_dir() -> PathBuf {
    match std::env::var_os(DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::temp_dir().join(DEFAULT_DIR_NAME),
    }
}

impl GlobalStore for FileStore {
    fn get(&self, name: &str) -> Result<Option<Value>, StoreError> {
        self.with_document(|doc| (doc.get(name).cloned(), false))
    }

    fn set(&self, name: &str, value: Value) -> Result<(), StoreError> {
        tracing::debug!(name, "setting global variable");
        self.with_document(|doc| {
            doc.insert(name.to_owned(), value);
            ((), true)
        })
    }

    fn delete(&self, name: &str) -> Result<bool, StoreError> {
        self.with_document(|doc| {
            let removed = doc.remove(name).is_some();
            (removed, removed)
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.with_document(|doc| {
            doc.clear();
            ((), true)
        })
    }

    fn snapshot(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        self.with_document(|doc| (doc.clone(), false))
    }

    fn update(
        &self,
        name: &str,
        f: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> Result<Value, StoreError> {
        self.with_document(|doc| {
            let next = f(doc.get(name).cloned());
            doc.insert(name.to_owned(), next.clone());
            (next, true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_has_delete_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        assert_eq!(store.get("g_token").unwrap(), None);
        store.set("g_token", json!("abc")).unwrap();
        store.set("g_count", json!(3)).unwrap();
        assert_eq!(store.get("g_token").unwrap(), Some(json!("abc")));
        assert!(store.has("g_count").unwrap());

        assert!(store.delete("g_count").unwrap());
        assert!(!store.delete("g_count").unwrap());
        assert!(!store.has("g_count").unwrap());

        store.clear().unwrap();
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn separate_handles_see_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileStore::new(dir.path()).unwrap();
        let b = FileStore::new(dir.path()).unwrap();
        a.set("g_user", json!({"id": 7})).unwrap();
        assert_eq!(b.get("g_user").unwrap(), Some(json!({"id": 7})));
    }

    #[test]
    fn corrupt_document_reads_as_empty_and_is_repaired_by_writes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DATA_FILE), "{not json").unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.snapshot().unwrap().is_empty());
        store.set("g_x", json!(1)).unwrap();
        let text = fs::read_to_string(dir.path().join(DATA_FILE)).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"g_x": 1}));
    }

    #[test]
    fn concurrent_increments_never_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_owned();

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    // each worker opens its own handle, like a separate process
                    let store = FileStore::new(&path).unwrap();
                    for _ in 0..100 {
                        store
                            .update("g_counter", &mut |cur| {
                                let n = cur.and_then(|v| v.as_i64()).unwrap_or(0);
                                json!(n + 1)
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let store = FileStore::new(&path).unwrap();
        assert_eq!(store.get("g_counter").unwrap(), Some(json!(200)));
    }
}
