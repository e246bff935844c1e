//! Key rotation, circuit breaking, retry, and semantic caching for outbound
//! provider calls.
//!
//! [`engine::Engine`] is the public entry point — construct one with
//! [`keywheel_types::config::EngineConfig`] and drive traffic through
//! [`engine::Engine::execute`].

pub mod backoff;
pub mod bulkhead;
pub mod cache;
pub mod classifier;
pub mod engine;
pub mod events;
pub mod registry;
pub mod selector;
pub mod storage;

pub use classifier::ClassifiableError;
pub use engine::{EmbeddingFn, Engine, ExecuteOptions};
pub use events::{EventBus, EventHandler};
pub use registry::{KeyRegistry, RegistryStats};
pub use storage::StorageAdapter;
