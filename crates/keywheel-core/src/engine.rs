//! The orchestrator — binds selection, classification, the
//! circuit breaker, retry/backoff, the bulkhead, and the semantic cache into
//! one `execute(fn, options)` contract, composing several small,
//! independently-testable collaborators behind a single call site.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use keywheel_types::config::EngineConfig;
use keywheel_types::error::EngineError;
use keywheel_types::key::KeyState;

use crate::backoff::backoff_ms;
use crate::bulkhead::Bulkhead;
use crate::cache::SemanticCache;
use crate::classifier::{classify, ClassifiableError};
use crate::events::EventBus;
use crate::registry::{KeyRegistry, RegistryStats};
use crate::selector::{closest_to_recovery, strategy_for, Strategy};
use crate::storage::{decode_snapshot, encode_snapshot, StorageAdapter, STORAGE_KEY};

/// A boxed, owned future — used for the per-call fallback closure, which
/// (like the user's own call function) may need to do async work of its own.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Computes an embedding vector for a prompt. Implement this on your own
/// embedding client to enable the semantic cache; errors are non-fatal to
/// `execute` — they are logged and the call proceeds to the live path.
///
/// Note the embedding implementation may itself call back into
/// [`Engine::execute`] (e.g. to reach an embeddings API through the same
/// key-rotation machinery) — `Engine` guards against the unbounded
/// recursion that would otherwise cause by bypassing the cache for calls
/// made while an embedding is already being resolved.
#[async_trait]
pub trait EmbeddingFn: Send + Sync {
    async fn embed(&self, prompt: &str) -> anyhow::Result<Vec<f32>>;
}

#[async_trait]
impl<F, Fut> EmbeddingFn for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<f32>>> + Send,
{
    async fn embed(&self, prompt: &str) -> anyhow::Result<Vec<f32>> {
        self(prompt.to_string()).await
    }
}

tokio::task_local! {
    static IN_EMBEDDING_CALL: ();
}

/// Per-call knobs. Unlike [`EngineConfig`], these vary call to call, so they
/// live on `execute`'s argument rather than the engine itself.
pub struct ExecuteOptions<'a, T> {
    pub timeout_ms: Option<u64>,
    /// Additional attempts beyond the first. `0` (default) means one shot.
    pub max_retries: u32,
    /// Caller-supplied finish reason (e.g. a model's `"SAFETY"` stop
    /// reason), fed into the classifier ahead of any error inspection.
    pub finish_reason: Option<String>,
    /// Restrict selection to keys tagged with this provider.
    pub provider: Option<String>,
    /// Prompt text for the semantic cache. No effect if the engine has no
    /// cache configured.
    pub prompt: Option<String>,
    /// Invoked instead of raising, once retries are exhausted or no key is
    /// available. Per-call (not engine-level) because different calls
    /// through the same engine may return different `T`.
    pub fallback: Option<Box<dyn FnOnce() -> BoxFuture<'a, T> + Send + 'a>>,
}

impl<'a, T> Default for ExecuteOptions<'a, T> {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            max_retries: 0,
            finish_reason: None,
            provider: None,
            prompt: None,
            fallback: None,
        }
    }
}

impl<'a, T> ExecuteOptions<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_fallback<F, Fut>(mut self, fallback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = T> + Send + 'a,
    {
        self.fallback = Some(Box::new(move || Box::pin(fallback())));
        self
    }
}

/// Wraps the caller's error with the engine's own internal timeout failure
/// so both flow through the same classifier rule set.
enum Attempt<E> {
    Upstream(E),
    Timeout { ms: u64 },
}

impl<E: std::fmt::Display> std::fmt::Display for Attempt<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream(e) => write!(f, "{e}"),
            Self::Timeout { ms } => write!(f, "timed out after {ms}ms"),
        }
    }
}

impl<E: ClassifiableError> ClassifiableError for Attempt<E> {
    fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream(e) => e.status_code(),
            Self::Timeout { .. } => None,
        }
    }

    fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. }) || matches!(self, Self::Upstream(e) if e.is_timeout())
    }
}

/// Ties key selection, the circuit breaker, retry/backoff, the bulkhead,
/// and the semantic cache into one `execute` contract.
pub struct Engine {
    registry: KeyRegistry,
    strategy: Box<dyn Strategy>,
    bulkhead: Bulkhead,
    events: EventBus,
    cache: Option<SemanticCache>,
    embed: Option<Box<dyn EmbeddingFn>>,
    storage: Option<Arc<dyn StorageAdapter>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let cache = config.semantic_cache.map(SemanticCache::new);
        Self {
            registry: KeyRegistry::new(config.initial_keys),
            strategy: strategy_for(config.strategy),
            bulkhead: Bulkhead::new(config.max_concurrency),
            events: EventBus::new(),
            cache,
            embed: None,
            storage: None,
        }
    }

    /// Attach the closure that computes prompt embeddings for the semantic
    /// cache. Has no effect if the engine was built without
    /// `semantic_cache` configuration.
    pub fn with_embedding_fn(mut self, embed: impl EmbeddingFn + 'static) -> Self {
        self.embed = Some(Box::new(embed));
        self
    }

    /// Attach a storage adapter and synchronously load any persisted key
    /// state. Call before the engine starts serving traffic.
    pub async fn with_storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        if let Some(raw) = storage.get_item(STORAGE_KEY).await {
            if let Some(snapshot) = decode_snapshot(&raw) {
                self.registry.restore(snapshot);
            } else {
                warn!("stored key state was not valid JSON, starting fresh");
            }
        }
        self.storage = Some(storage);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn all_keys(&self) -> Vec<KeyState> {
        self.registry.all()
    }

    /// Select a key directly, bypassing `execute`'s retry loop. Mutates
    /// `last_used` and persists, same as a selection made inside `execute`.
    pub async fn get_key(&self) -> Option<KeyState> {
        self.get_key_by_provider(None).await
    }

    pub async fn get_key_by_provider(&self, provider: Option<&str>) -> Option<KeyState> {
        let selected = self.select(provider);
        if let Some(ref k) = selected {
            self.registry.touch_selected(&k.key);
            self.persist().await;
        }
        selected
    }

    fn select(&self, provider: Option<&str>) -> Option<KeyState> {
        let eligible = self.registry.eligible(provider, &self.events);
        if let Some(picked) = self.strategy.next(&eligible) {
            return Some(picked);
        }
        let non_dead = self.registry.non_dead(provider);
        if non_dead.is_empty() {
            return None;
        }
        closest_to_recovery(&non_dead)
    }

    async fn persist(&self) {
        if let Some(storage) = &self.storage {
            let snapshot = self.registry.snapshot();
            storage.set_item(STORAGE_KEY, encode_snapshot(&snapshot)).await;
        }
    }

    /// Resolve the prompt's embedding vector once, reused for both the
    /// pre-call lookup and the post-call store. `None` if caching isn't
    /// configured, the call is itself a reentrant embedding resolution, or
    /// the embedding call failed (logged, non-fatal).
    async fn resolve_prompt_vector(&self, prompt: &str) -> Option<Vec<f32>> {
        self.cache.as_ref()?;
        let embed = self.embed.as_ref()?;
        if IN_EMBEDDING_CALL.try_with(|_| ()).is_ok() {
            return None;
        }
        match IN_EMBEDDING_CALL.scope((), embed.embed(prompt)).await {
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!(error = %err, "embedding computation failed, bypassing cache");
                None
            }
        }
    }

    /// Run `call` through the full pipeline: semantic cache, bulkhead,
    /// selection, timeout, classification, circuit breaker, retry/backoff.
    ///
    /// `call` receives the selected key's identity and returns the
    /// caller's own `Result<T, E>`; at most one invocation happens per
    /// attempt, at most `max_retries + 1` attempts total.
    pub async fn execute<T, E, F, Fut>(
        &self,
        mut call: F,
        mut options: ExecuteOptions<'_, T>,
    ) -> Result<T, EngineError<E>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifiableError,
        T: Serialize + DeserializeOwned,
    {
        let prompt_vector = match options.prompt.as_deref() {
            Some(p) => self.resolve_prompt_vector(p).await,
            None => None,
        };

        if let (Some(vector), Some(cache)) = (prompt_vector.as_ref(), self.cache.as_ref()) {
            if let Some(value) = cache.lookup(vector) {
                if let Ok(result) = serde_json::from_value::<T>(value) {
                    self.events.emit_execute_success("CACHE_HIT".to_string(), 0);
                    return Ok(result);
                }
            }
        }

        let _guard = match self.bulkhead.try_acquire() {
            Ok(guard) => guard,
            Err(()) => {
                self.events.emit_bulkhead_rejected();
                return Err(EngineError::BulkheadRejection);
            }
        };

        let max_attempts = options.max_retries.saturating_add(1);

        for attempt in 0..max_attempts {
            let Some(key_state) = self.select(options.provider.as_deref()) else {
                self.events.emit_all_keys_exhausted();
                if let Some(fallback) = options.fallback.take() {
                    self.events.emit_fallback("all keys exhausted");
                    return Ok(fallback().await);
                }
                return Err(EngineError::AllKeysExhausted);
            };
            self.registry.touch_selected(&key_state.key);
            self.persist().await;

            let start = Instant::now();
            let attempt_result: Result<T, Attempt<E>> = match options.timeout_ms {
                Some(timeout_ms) => {
                    match tokio::time::timeout(
                        Duration::from_millis(timeout_ms),
                        call(key_state.key.clone()),
                    )
                    .await
                    {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(Attempt::Upstream(e)),
                        Err(_) => Err(Attempt::Timeout { ms: timeout_ms }),
                    }
                }
                None => call(key_state.key.clone()).await.map_err(Attempt::Upstream),
            };

            match attempt_result {
                Ok(value) => {
                    let duration_ms = start.elapsed().as_millis() as u64;
                    self.registry
                        .mark_success(&key_state.key, Some(duration_ms as f64), &self.events);
                    self.events
                        .emit_execute_success(key_state.key.clone(), duration_ms);

                    if let (Some(prompt), Some(vector), Some(cache)) =
                        (options.prompt.as_deref(), prompt_vector.as_ref(), self.cache.as_ref())
                    {
                        if let Ok(json) = serde_json::to_value(&value) {
                            cache.store(vector.clone(), prompt.to_string(), json);
                        }
                    }

                    self.persist().await;
                    return Ok(value);
                }
                Err(attempt_err) => {
                    let classification = classify(&attempt_err, options.finish_reason.as_deref());
                    self.registry
                        .mark_failed(&key_state.key, &classification, &self.events);
                    self.events
                        .emit_execute_failed(key_state.key.clone(), attempt_err.to_string());

                    let is_last_attempt = attempt + 1 >= max_attempts;
                    if !classification.retryable || is_last_attempt {
                        self.persist().await;
                        if is_last_attempt {
                            if let Some(fallback) = options.fallback.take() {
                                self.events.emit_fallback("max retries exceeded");
                                return Ok(fallback().await);
                            }
                        }
                        return Err(match attempt_err {
                            Attempt::Upstream(e) => EngineError::Upstream(e),
                            Attempt::Timeout { ms } => EngineError::Timeout { ms },
                        });
                    }

                    self.persist().await;
                    let delay_ms = backoff_ms(attempt);
                    self.events
                        .emit_retry(key_state.key.clone(), attempt + 1, delay_ms);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }

        unreachable!("the last attempt always returns before the loop exits")
    }
}
