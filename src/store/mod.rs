//! store
//!
//! Local resource storage behind the bundled command table.
//!
//! # Design
//!
//! Resources are JSON objects addressed by `(type, name)`. The store owns
//! the server-side fields (`id`, `createdAt`, `lastModified`, `etag`) and
//! sets them on every [`ResourceStore::put`], so callers can tell a persisted
//! copy from the one they sent.
//!
//! # Example
//!
//! ```
//! use verbwork::store::{FileResourceStore, ResourceStore};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = FileResourceStore::with_path(dir.path().join("resources.json"));
//!
//! let saved = store.put("vm", "vm1", serde_json::json!({"size": "small"})).unwrap();
//! assert!(saved["etag"].is_string());
//! assert_eq!(store.get("vm", "vm1").unwrap(), Some(saved));
//! ```

mod file_store;

pub use file_store::FileResourceStore;

use std::path::PathBuf;

use thiserror::Error;

/// Fields the store manages on every resource.
pub const SERVER_FIELDS: &[&str] = &["id", "name", "type", "createdAt", "lastModified", "etag"];

/// Errors from resource storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process is writing the store.
    #[error("resource store {0} is locked by another process")]
    Locked(PathBuf),

    #[error("failed to read resource store {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    #[error("failed to write resource store {path}: {message}")]
    WriteError { path: PathBuf, message: String },

    /// Only JSON objects can be stored.
    #[error("resource {kind}/{name} must be a JSON object")]
    NotAnObject { kind: String, name: String },
}

/// Keyed storage for JSON resources.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait ResourceStore: Send + Sync {
    /// Fetch one resource, `None` when absent.
    fn get(&self, kind: &str, name: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// All resources of one type, ordered by name.
    fn list(&self, kind: &str) -> Result<Vec<serde_json::Value>, StoreError>;

    /// Create or replace a resource and return the persisted copy.
    fn put(
        &self,
        kind: &str,
        name: &str,
        resource: serde_json::Value,
    ) -> Result<serde_json::Value, StoreError>;

    /// Remove a resource. Returns whether it existed.
    fn delete(&self, kind: &str, name: &str) -> Result<bool, StoreError>;
}
