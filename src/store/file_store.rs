//! store::file_store
//!
//! JSON-file resource store.
//!
//! # Storage
//!
//! - `<path>` - `{ "<type>": { "<name>": { ... } } }`
//! - `<path>.lock` - OS-level exclusive lock held for each read-modify-write
//!
//! # Invariants
//!
//! - All writes are atomic (write to temp file, then rename)
//! - Lock acquisition is non-blocking (fails fast if locked)
//! - `id` and `createdAt` survive replacement; `lastModified` and `etag` do not

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{ResourceStore, StoreError};

type Document = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Resource store backed by one JSON file.
#[derive(Debug, Clone)]
pub struct FileResourceStore {
    path: PathBuf,
}

impl FileResourceStore {
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn write_error(&self, message: impl Into<String>) -> StoreError {
        StoreError::WriteError {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    fn read_error(&self, message: impl Into<String>) -> StoreError {
        StoreError::ReadError {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    fn read_document(&self) -> Result<Document, StoreError> {
        if !self.path.exists() {
            return Ok(Document::new());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| self.read_error(format!("cannot read file: {e}")))?;
        if content.trim().is_empty() {
            return Ok(Document::new());
        }
        serde_json::from_str(&content).map_err(|e| self.read_error(format!("cannot parse: {e}")))
    }

    fn write_document(&self, doc: &Document) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| self.write_error(format!("cannot serialize: {e}")))?;

        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| self.write_error(format!("cannot create temp file: {e}")))?;
            file.write_all(content.as_bytes())
                .map_err(|e| self.write_error(format!("cannot write: {e}")))?;
            file.sync_all()
                .map_err(|e| self.write_error(format!("cannot sync to disk: {e}")))?;
        }

        fs::rename(&temp_path, &self.path)
            .map_err(|e| self.write_error(format!("cannot rename temp file: {e}")))
    }

    /// Run `f` on the document under the store lock, writing it back when
    /// `f` reports a change.
    fn modify<T>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<(T, bool), StoreError>,
    ) -> Result<T, StoreError> {
        let _lock = StoreLock::acquire(self)?;
        let mut doc = self.read_document()?;
        let (out, changed) = f(&mut doc)?;
        if changed {
            self.write_document(&doc)?;
        }
        Ok(out)
    }
}

impl ResourceStore for FileResourceStore {
    fn get(&self, kind: &str, name: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let doc = self.read_document()?;
        Ok(doc.get(kind).and_then(|m| m.get(name)).cloned())
    }

    fn list(&self, kind: &str) -> Result<Vec<serde_json::Value>, StoreError> {
        let doc = self.read_document()?;
        Ok(doc
            .get(kind)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    fn put(
        &self,
        kind: &str,
        name: &str,
        resource: serde_json::Value,
    ) -> Result<serde_json::Value, StoreError> {
        let serde_json::Value::Object(mut fields) = resource else {
            return Err(StoreError::NotAnObject {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        };

        self.modify(|doc| {
            let bucket = doc.entry(kind.to_string()).or_default();
            let previous = bucket.get(name);
            let now = Utc::now().to_rfc3339();

            let id = previous
                .and_then(|p| p.get("id"))
                .cloned()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string().into());
            let created = previous
                .and_then(|p| p.get("createdAt"))
                .cloned()
                .unwrap_or_else(|| now.clone().into());

            fields.insert("id".into(), id);
            fields.insert("name".into(), name.into());
            fields.insert("type".into(), kind.into());
            fields.insert("createdAt".into(), created);
            fields.insert("lastModified".into(), now.into());
            fields.remove("etag");
            let etag = etag(&fields);
            fields.insert("etag".into(), etag.into());

            let saved = serde_json::Value::Object(fields);
            bucket.insert(name.to_string(), saved.clone());
            debug!(kind, name, "resource stored");
            Ok((saved, true))
        })
    }

    fn delete(&self, kind: &str, name: &str) -> Result<bool, StoreError> {
        self.modify(|doc| {
            let removed = doc
                .get_mut(kind)
                .map(|bucket| bucket.remove(name).is_some())
                .unwrap_or(false);
            if doc.get(kind).is_some_and(BTreeMap::is_empty) {
                doc.remove(kind);
            }
            Ok((removed, removed))
        })
    }
}

fn etag(fields: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut hasher = Sha256::new();
    // serde_json maps are key-ordered, so the encoding is stable.
    hasher.update(serde_json::Value::Object(fields.clone()).to_string().as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// Exclusive lock on `<path>.lock`, released on drop.
#[derive(Debug)]
struct StoreLock {
    file: File,
}

impl StoreLock {
    fn acquire(store: &FileResourceStore) -> Result<Self, StoreError> {
        if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| store.write_error(format!("cannot create directory: {e}")))?;
        }

        let lock_path = store.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| store.write_error(format!("cannot open lock file: {e}")))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(StoreError::Locked(store.path.clone()))
            }
            Err(e) => Err(store.write_error(format!("cannot acquire lock: {e}"))),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
