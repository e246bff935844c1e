//! File-backed storage adapter.
//!
//! A single JSON file on disk that survives process restarts so keys don't
//! reset to CLOSED on every reboot. Reads and writes go through `tokio::fs`
//! to stay off the async runtime's worker threads; a `tokio::sync::Mutex`
//! serializes writers so two concurrent `set_item` calls can't interleave
//! and truncate each other's output.

use async_trait::async_trait;
use keywheel_core::StorageAdapter;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::warn;

fn default_path() -> PathBuf {
    std::env::temp_dir().join("keywheel_key_state.json")
}

/// Persists the engine's key-state snapshot to a JSON file.
///
/// Failures (missing permissions, a vanished directory, invalid UTF-8) are
/// logged and swallowed, per `StorageAdapter`'s "persistence failures are
/// non-fatal" contract. Never causes `Engine::execute` to fail.
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Use the given path, or the process's temp directory if `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.unwrap_or_else(default_path),
            write_lock: Mutex::new(()),
        }
    }

    /// Like [`Self::new`], but deletes any existing file first, for
    /// callers who want a clean slate rather than resuming prior key state.
    pub async fn new_cleared(path: Option<PathBuf>) -> Self {
        let storage = Self::new(path);
        storage.clear().await;
        storage
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Remove the backing file, if it exists. Swallows errors other than
    /// the file already being absent.
    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to clear storage file");
            }
        }
    }
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn get_item(&self, key: &str) -> Option<String> {
        let _guard = self.write_lock.lock().await;
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "failed to read storage file");
                }
                return None;
            }
        };

        // The whole file is one JSON object keyed by storage key; `memory.rs`
        // expects the value for `key` specifically, not the file's contents.
        let doc: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "storage file is not valid JSON");
                return None;
            }
        };
        doc.get(key).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    async fn set_item(&self, key: &str, value: String) {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %parent.display(), error = %e, "failed to create storage directory");
                return;
            }
        }

        let mut doc: serde_json::Value = match tokio::fs::read_to_string(&self.path).await {
            Ok(existing) => {
                serde_json::from_str(&existing).unwrap_or_else(|_| serde_json::json!({}))
            }
            Err(_) => serde_json::json!({}),
        };

        let parsed_value =
            serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
        doc[key] = parsed_value;

        let encoded = match serde_json::to_string(&doc) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to serialize storage document");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&self.path, encoded).await {
            warn!(path = %self.path.display(), error = %e, "failed to write storage file");
        }
    }
}
