//! Concrete [`StorageAdapter`](keywheel_core::StorageAdapter) implementations.
//!
//! Kept in their own crate so embedding `keywheel-core` doesn't pull in
//! filesystem I/O for callers who only want in-process persistence (or none
//! at all).

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;
