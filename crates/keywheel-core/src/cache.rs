//! Semantic (vector-similarity) cache.
//!
//! A `Mutex`-guarded bounded store with lazy TTL eviction, keyed by
//! embedding-vector similarity rather than exact string match, since a
//! `DashMap` can't express "scan for nearest neighbor."

use keywheel_types::config::SemanticCacheSettings;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// One remembered prompt/response pair.
struct CacheEntry {
    vector: Vec<f32>,
    prompt: String,
    response: serde_json::Value,
    inserted_at_ms: u64,
}

/// Hard cap on stored entries; oldest inserted evicted first once hit.
const MAX_ENTRIES: usize = 500;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Cosine similarity. Mismatched lengths or zero-norm vectors yield 0.0,
/// never a division error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Thread-safe, TTL-bounded, similarity-indexed response cache.
pub struct SemanticCache {
    entries: Mutex<VecDeque<CacheEntry>>,
    settings: SemanticCacheSettings,
}

impl SemanticCache {
    pub fn new(settings: SemanticCacheSettings) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            settings,
        }
    }

    /// Scan newest-first, dropping TTL-expired entries as encountered, and
    /// return the highest-similarity response at or above `threshold`.
    pub fn lookup(&self, vector: &[f32]) -> Option<serde_json::Value> {
        let now = now_ms();
        let mut entries = self.entries.lock().expect("cache mutex poisoned");

        entries.retain(|e| now.saturating_sub(e.inserted_at_ms) <= self.settings.ttl_ms);

        let mut best: Option<(f32, &CacheEntry)> = None;
        for entry in entries.iter().rev() {
            let sim = cosine_similarity(vector, &entry.vector);
            if sim < self.settings.threshold {
                continue;
            }
            // Strict `>` keeps the first (newest) entry on an exact tie,
            // since we're scanning newest-first.
            if best.is_none_or(|(best_sim, _)| sim > best_sim) {
                best = Some((sim, entry));
            }
        }
        best.map(|(_, e)| e.response.clone())
    }

    /// Evict any entry with an identical prompt, append the new entry, and
    /// drop the oldest entry if over capacity.
    pub fn store(&self, vector: Vec<f32>, prompt: String, response: serde_json::Value) {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.retain(|e| e.prompt != prompt);
        entries.push_back(CacheEntry {
            vector,
            prompt,
            response,
            inserted_at_ms: now_ms(),
        });
        while entries.len() > MAX_ENTRIES {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
