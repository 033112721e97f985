use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors opening a flat-document store. Both variants are fatal at startup:
/// running with a silently empty store would lose user flags and game state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A single JSON document kept in memory and flushed on every write.
///
/// The document is loaded once at startup; all later reads hit the cache.
/// A single mutex serializes writers per store, which is all the protection
/// the data model needs (single process, one store per file). Runtime flush
/// failures are logged and retried on the next natural write rather than
/// crashing the process.
pub struct JsonStore<T> {
    path: PathBuf,
    inner: Mutex<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    /// Load the document at `path`, or start from `T::default()` when the
    /// file does not exist yet. Unreadable or corrupt files are errors.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let inner = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| {
                StoreError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        debug!("Opened store {}", path.display());
        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    /// Read the document through a closure without taking a copy.
    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.lock().await;
        f(&guard)
    }

    /// Mutate the document and flush it back to disk before releasing the
    /// writer lock.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().await;
        let result = f(&mut guard);
        self.flush(&guard).await;
        result
    }

    async fn flush(&self, document: &T) {
        let serialized = match serde_json::to_string_pretty(document) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to serialize store {}: {}", self.path.display(), e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, serialized).await {
            error!(
                "Failed to write store {} (will retry on next write): {}",
                self.path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
    struct Doc {
        counter: u32,
        label: String,
    }

    #[tokio::test]
    async fn missing_file_starts_from_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonStore<Doc> = JsonStore::open(dir.path().join("doc.json")).unwrap();
        let doc = store.read(|d| d.clone()).await;
        assert_eq!(doc, Doc::default());
    }

    #[tokio::test]
    async fn updates_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        let store: JsonStore<Doc> = JsonStore::open(&path).unwrap();
        store
            .update(|d| {
                d.counter = 7;
                d.label = "seven".to_string();
            })
            .await;

        let reopened: JsonStore<Doc> = JsonStore::open(&path).unwrap();
        let doc = reopened.read(|d| d.clone()).await;
        assert_eq!(doc.counter, 7);
        assert_eq!(doc.label, "seven");
    }

    #[test]
    fn corrupt_file_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result: Result<JsonStore<Doc>, _> = JsonStore::open(&path);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }
}
