//! End-to-end scenarios, one test per numbered case.
//!
//! These exercise `Engine::execute` as a caller would, rather than reaching
//! into `KeyRegistry`/`classifier` directly the way the unit tests inside
//! `engine.rs` do.

use keywheel_core::{ClassifiableError, Engine, ExecuteOptions};
use keywheel_types::config::{EngineConfig, InitialKey, SemanticCacheSettings, StrategyKind};
use keywheel_types::error::EngineError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct UpstreamError {
    message: String,
    status: Option<u16>,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ClassifiableError for UpstreamError {
    fn status_code(&self) -> Option<u16> {
        self.status
    }
}

fn err(message: &str, status: u16) -> UpstreamError {
    UpstreamError {
        message: message.to_string(),
        status: Some(status),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Scenario 1: rotation on 429.
#[tokio::test]
async fn scenario_1_rotation_on_429() {
    init_tracing();
    let engine = Engine::new(EngineConfig::new(vec![
        InitialKey::plain("A"),
        InitialKey::plain("B"),
        InitialKey::plain("C"),
    ]));
    let calls = Mutex::new(Vec::new());

    let result: Result<String, EngineError<UpstreamError>> = engine
        .execute(
            |key| {
                calls.lock().unwrap().push(key.clone());
                async move {
                    if key == "A" {
                        Err(err("quota exceeded", 429))
                    } else {
                        Ok("from B".to_string())
                    }
                }
            },
            ExecuteOptions::new().with_max_retries(3),
        )
        .await;

    assert_eq!(result.unwrap(), "from B");
    assert_eq!(*calls.lock().unwrap(), vec!["A", "B"]);

    let a = engine.all_keys().into_iter().find(|k| k.key == "A").unwrap();
    assert_eq!(a.fail_count, 1);
    assert_eq!(a.circuit_state, keywheel_types::key::CircuitState::Open);

    let b = engine.all_keys().into_iter().find(|k| k.key == "B").unwrap();
    assert_eq!(b.success_count, 1);
}

/// Scenario 2: AUTH kills the key; the next execute has nothing left to try.
#[tokio::test]
async fn scenario_2_auth_kills_key() {
    init_tracing();
    let engine = Engine::new(EngineConfig::new(vec![InitialKey::plain("A")]));

    let result: Result<i32, EngineError<UpstreamError>> = engine
        .execute(
            |_key| async { Err::<i32, _>(err("403 forbidden", 403)) },
            ExecuteOptions::new(),
        )
        .await;
    assert!(matches!(result, Err(EngineError::Upstream(_))));
    assert!(engine.all_keys()[0].is_dead());

    let next: Result<i32, EngineError<UpstreamError>> = engine
        .execute(|_key| async { Ok::<i32, UpstreamError>(1) }, ExecuteOptions::new())
        .await;
    assert!(matches!(next, Err(EngineError::AllKeysExhausted)));
}

/// Scenario 3: a slow call times out and surfaces TIMEOUT, marking the key
/// with the transient-family cooldown.
#[tokio::test]
async fn scenario_3_timeout_surfaces_as_timeout() {
    init_tracing();
    let engine = Engine::new(EngineConfig::new(vec![InitialKey::plain("A")]));

    let result: Result<i32, EngineError<UpstreamError>> = engine
        .execute(
            |_key| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<i32, UpstreamError>(1)
            },
            ExecuteOptions::new().with_timeout_ms(100),
        )
        .await;

    assert!(matches!(result, Err(EngineError::Timeout { ms: 100 })));
    assert_eq!(engine.all_keys()[0].fail_count, 1);
}

/// Scenario 4: backoff actually sleeps between attempts. Measures wall-clock
/// gaps rather than mocking the clock, since the contract is about real
/// elapsed time between attempts.
#[tokio::test]
async fn scenario_4_backoff_sleeps_between_attempts() {
    init_tracing();
    let engine = Engine::new(EngineConfig::new(vec![InitialKey::plain("A")]));
    let attempts = AtomicU32::new(0);

    let start = Instant::now();
    let result: Result<i32, EngineError<UpstreamError>> = engine
        .execute(
            |_key| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(err("internal error", 500)) }
            },
            ExecuteOptions::new().with_max_retries(2),
        )
        .await;
    let elapsed = start.elapsed();

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    // two sleeps: backoff(0) >= 1000ms, backoff(1) >= 2000ms, before jitter.
    assert!(
        elapsed >= Duration::from_millis(3_000),
        "expected at least 3000ms of backoff, got {elapsed:?}"
    );
}

/// Scenario 5: a cache hit bypasses the live path and the bulkhead entirely.
#[tokio::test]
async fn scenario_5_cache_hit_bypasses_live_path() {
    init_tracing();
    let mut config = EngineConfig::new(vec![InitialKey::plain("A")]);
    config.max_concurrency = Some(1);
    config.semantic_cache = Some(SemanticCacheSettings {
        threshold: 0.95,
        ttl_ms: 60_000,
    });
    let engine = Engine::new(config)
        .with_embedding_fn(|_prompt: String| async { Ok::<Vec<f32>, anyhow::Error>(vec![1.0, 0.0]) });

    let calls = AtomicU32::new(0);
    let seeded: Result<String, EngineError<UpstreamError>> = engine
        .execute(
            |_key| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<String, UpstreamError>("R".to_string()) }
            },
            ExecuteOptions::new().with_prompt("x"),
        )
        .await;
    assert_eq!(seeded.unwrap(), "R");

    let hit: Result<String, EngineError<UpstreamError>> = engine
        .execute(
            |_key| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<String, UpstreamError>("should not see this".to_string()) }
            },
            ExecuteOptions::new().with_prompt("x"),
        )
        .await;
    assert_eq!(hit.unwrap(), "R");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "fn must not run on a cache hit");
}

/// Scenario 6: weighted selection converges to the configured split over
/// many calls.
#[tokio::test]
async fn scenario_6_weighted_distribution_converges() {
    init_tracing();
    let mut config = EngineConfig::new(vec![
        InitialKey::detailed("A", 1.0, "default"),
        InitialKey::detailed("B", 3.0, "default"),
    ]);
    config.strategy = StrategyKind::Weighted;
    let engine = Engine::new(config);

    let mut b_count = 0u32;
    const N: u32 = 10_000;
    for _ in 0..N {
        let result: Result<String, EngineError<UpstreamError>> = engine
            .execute(
                |key| async move { Ok(if key == "B" { "b".to_string() } else { "a".to_string() }) },
                ExecuteOptions::new(),
            )
            .await;
        if result.unwrap() == "b" {
            b_count += 1;
        }
    }

    let share = b_count as f64 / N as f64;
    assert!(
        (0.72..=0.78).contains(&share),
        "expected B's share in [0.72, 0.78], got {share}"
    );
}

/// Boundary: 0 retries means exactly one attempt.
#[tokio::test]
async fn boundary_zero_retries_is_one_attempt() {
    init_tracing();
    let engine = Engine::new(EngineConfig::new(vec![InitialKey::plain("A")]));
    let attempts = AtomicU32::new(0);
    let _: Result<i32, EngineError<UpstreamError>> = engine
        .execute(
            |_key| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(err("boom", 500)) }
            },
            ExecuteOptions::new(),
        )
        .await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

/// Boundary: a zero-capacity bulkhead rejects the very first call.
#[tokio::test]
async fn boundary_zero_concurrency_rejects_first_call() {
    init_tracing();
    let mut config = EngineConfig::new(vec![InitialKey::plain("A")]);
    config.max_concurrency = Some(0);
    let engine = Engine::new(config);

    let result: Result<i32, EngineError<UpstreamError>> = engine
        .execute(|_key| async { Ok::<i32, UpstreamError>(1) }, ExecuteOptions::new())
        .await;
    assert!(matches!(result, Err(EngineError::BulkheadRejection)));
}

/// Boundary: an empty key list always fails with AllKeysExhausted.
#[tokio::test]
async fn boundary_empty_key_list_exhausts_immediately() {
    init_tracing();
    let engine = Engine::new(EngineConfig::new(vec![]));
    let result: Result<i32, EngineError<UpstreamError>> = engine
        .execute(|_key| async { Ok::<i32, UpstreamError>(1) }, ExecuteOptions::new())
        .await;
    assert!(matches!(result, Err(EngineError::AllKeysExhausted)));
}

/// Boundary: a 0ms timeout expires essentially immediately.
#[tokio::test]
async fn boundary_zero_timeout_expires_immediately() {
    init_tracing();
    let engine = Engine::new(EngineConfig::new(vec![InitialKey::plain("A")]));
    let result: Result<i32, EngineError<UpstreamError>> = engine
        .execute(
            |_key| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<i32, UpstreamError>(1)
            },
            ExecuteOptions::new().with_timeout_ms(0),
        )
        .await;
    assert!(matches!(result, Err(EngineError::Timeout { ms: 0 })));
}
