//! In-memory storage adapter.
//!
//! A process-lifetime key-value store, useful for tests or serverless
//! invocations where nothing should survive a restart. `DashMap` gives it
//! the same thread-safe, lock-free-read posture as `keywheel-core`'s
//! registry, without this crate needing its own mutex plumbing.

use async_trait::async_trait;
use dashmap::DashMap;
use keywheel_core::StorageAdapter;

/// Key-value storage that lives only for the process lifetime.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    store: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
        }
    }

    /// Number of entries currently stored.
    pub fn size(&self) -> usize {
        self.store.len()
    }

    /// Drop every stored entry.
    pub fn clear(&self) {
        self.store.clear();
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn get_item(&self, key: &str) -> Option<String> {
        self.store.get(key).map(|v| v.clone())
    }

    async fn set_item(&self, key: &str, value: String) {
        self.store.insert(key.to_string(), value);
    }
}
