//! Persist → reload round-trips through both shipped storage adapters,
//! driven through a real `Engine` rather than poking `KeyRegistry` directly.

use keywheel_core::{ClassifiableError, Engine, ExecuteOptions};
use keywheel_storage::{FileStorage, MemoryStorage};
use keywheel_types::config::{EngineConfig, InitialKey};
use keywheel_types::error::EngineError;
use keywheel_types::key::CircuitState;
use std::sync::Arc;

#[derive(Debug)]
struct UpstreamError(u16);

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {}", self.0)
    }
}

impl ClassifiableError for UpstreamError {
    fn status_code(&self) -> Option<u16> {
        Some(self.0)
    }
}

#[tokio::test]
async fn memory_storage_roundtrips_key_health_across_engines() {
    let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());

    let first = Engine::new(EngineConfig::new(vec![InitialKey::plain("sk-a")]))
        .with_storage(storage.clone())
        .await;
    let result: Result<i32, EngineError<UpstreamError>> = first
        .execute(
            |_key| async { Err::<i32, _>(UpstreamError(429)) },
            ExecuteOptions::new(),
        )
        .await;
    assert!(result.is_err());
    let before = first.all_keys().into_iter().find(|k| k.key == "sk-a").unwrap();
    assert_eq!(before.circuit_state, CircuitState::Open);
    assert_eq!(before.fail_count, 1);
    assert_eq!(before.total_requests, 1);

    let second = Engine::new(EngineConfig::new(vec![InitialKey::plain("sk-a")]))
        .with_storage(storage.clone())
        .await;
    let after = second.all_keys().into_iter().find(|k| k.key == "sk-a").unwrap();

    assert_eq!(after.circuit_state, before.circuit_state);
    assert_eq!(after.fail_count, before.fail_count);
    assert_eq!(after.failed_at, before.failed_at);
    assert_eq!(after.success_count, before.success_count);
    assert_eq!(after.total_requests, before.total_requests);
    assert_eq!(after.average_latency_ms, before.average_latency_ms);
}

#[tokio::test]
async fn file_storage_roundtrips_key_health_across_engines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let storage: Arc<FileStorage> = Arc::new(FileStorage::new(Some(path.clone())));

    let first = Engine::new(EngineConfig::new(vec![InitialKey::plain("sk-a")]))
        .with_storage(storage)
        .await;
    let ok: Result<i32, EngineError<UpstreamError>> =
        first.execute(|_key| async { Ok::<i32, UpstreamError>(7) }, ExecuteOptions::new()).await;
    assert_eq!(ok.unwrap(), 7);
    let before = first.all_keys().into_iter().find(|k| k.key == "sk-a").unwrap();
    assert_eq!(before.success_count, 1);

    // A fresh storage handle pointed at the same file picks up the snapshot.
    let reopened: Arc<FileStorage> = Arc::new(FileStorage::new(Some(path)));
    let second = Engine::new(EngineConfig::new(vec![InitialKey::plain("sk-a")]))
        .with_storage(reopened)
        .await;
    let after = second.all_keys().into_iter().find(|k| k.key == "sk-a").unwrap();
    assert_eq!(after.success_count, before.success_count);
    assert_eq!(after.circuit_state, before.circuit_state);
}

#[tokio::test]
async fn unknown_keys_in_snapshot_are_ignored_known_keys_absent_keep_defaults() {
    let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());

    // Seed state for "sk-a" and a key the next engine won't construct.
    let seed = Engine::new(EngineConfig::new(vec![
        InitialKey::plain("sk-a"),
        InitialKey::plain("sk-ghost"),
    ]))
    .with_storage(storage.clone())
    .await;
    let _: Result<i32, EngineError<UpstreamError>> = seed
        .execute(|_key| async { Err::<i32, _>(UpstreamError(500)) }, ExecuteOptions::new())
        .await;

    // Reload with only "sk-a" and a brand new "sk-b" that never appeared before.
    let reloaded = Engine::new(EngineConfig::new(vec![
        InitialKey::plain("sk-a"),
        InitialKey::plain("sk-b"),
    ]))
    .with_storage(storage)
    .await;

    let a = reloaded.all_keys().into_iter().find(|k| k.key == "sk-a").unwrap();
    assert_eq!(a.fail_count, 1);

    let b = reloaded.all_keys().into_iter().find(|k| k.key == "sk-b").unwrap();
    assert_eq!(b.circuit_state, CircuitState::Closed);
    assert_eq!(b.fail_count, 0);
}
