//! Optional state persistence.
//!
//! A `get_item`/`set_item` adapter behind an `async_trait`, so a caller can
//! supply a custom persistence backend without the engine knowing its
//! concrete type. The engine persists the whole registry snapshot under one
//! fixed storage key.

use async_trait::async_trait;
use keywheel_types::key::KeyState;
use std::collections::HashMap;

/// The storage key the engine reads/writes the registry snapshot under.
/// Callers sharing a storage backend across engines should namespace their
/// own keys to avoid colliding with this one.
pub const STORAGE_KEY: &str = "keywheel_registry_state_v1";

/// Pluggable persistence for key health state. Implementors decide where
/// the JSON blob lives; the engine only ever calls `get_item`/`set_item`
/// with `STORAGE_KEY`.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn get_item(&self, key: &str) -> Option<String>;
    async fn set_item(&self, key: &str, value: String);
}

/// Serialize a registry snapshot for a `StorageAdapter::set_item` call.
pub fn encode_snapshot(snapshot: &HashMap<String, KeyState>) -> String {
    serde_json::to_string(snapshot).unwrap_or_default()
}

/// Parse a previously-encoded snapshot. Returns `None` on any decode error
/// rather than propagating — a corrupt or foreign blob should not prevent
/// the engine from starting with fresh key state.
pub fn decode_snapshot(raw: &str) -> Option<HashMap<String, KeyState>> {
    serde_json::from_str(raw).ok()
}
