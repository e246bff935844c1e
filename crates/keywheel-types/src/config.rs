//! Engine construction config.

/// One entry in the `initial_keys` list passed to the engine constructor.
///
/// A `Plain` string may itself be comma-separated (e.g. `"sk-a,sk-b"`); the
/// registry splits and deduplicates by identity before constructing
/// `KeyState`s.
#[derive(Debug, Clone)]
pub enum InitialKey {
    Plain(String),
    Detailed {
        key: String,
        weight: f64,
        provider: String,
    },
}

impl InitialKey {
    pub fn plain(key: impl Into<String>) -> Self {
        Self::Plain(key.into())
    }

    pub fn detailed(key: impl Into<String>, weight: f64, provider: impl Into<String>) -> Self {
        Self::Detailed {
            key: key.into(),
            weight,
            provider: provider.into(),
        }
    }
}

/// Which selector strategy the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    Standard,
    Weighted,
    Latency,
}

/// Semantic cache configuration. Presence of this struct on
/// `EngineConfig` is what enables the cache; there is no separate
/// `enabled` flag.
#[derive(Debug, Clone, Copy)]
pub struct SemanticCacheSettings {
    /// Minimum cosine similarity for a cache hit, in `[0, 1]`.
    pub threshold: f32,
    /// Entry time-to-live.
    pub ttl_ms: u64,
}

impl Default for SemanticCacheSettings {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            ttl_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Top-level engine configuration.
///
/// `fallback_fn` and `get_embedding` are deliberately NOT here: the
/// embedding closure is attached separately via `Engine::with_embedding_fn`
/// (it always returns `Vec<f32>`, independent of any particular call's
/// `T`), and the fallback closure is supplied per call via
/// `ExecuteOptions`.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub initial_keys: Vec<InitialKey>,
    pub strategy: StrategyKind,
    /// `None` means unbounded concurrency. `Some(0)` means every call fails
    /// fast with `BulkheadRejection`.
    pub max_concurrency: Option<u32>,
    pub semantic_cache: Option<SemanticCacheSettings>,
}

impl EngineConfig {
    pub fn new(initial_keys: Vec<InitialKey>) -> Self {
        Self {
            initial_keys,
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_concurrency(mut self, max: u32) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    pub fn with_semantic_cache(mut self, settings: SemanticCacheSettings) -> Self {
        self.semantic_cache = Some(settings);
        self
    }
}
