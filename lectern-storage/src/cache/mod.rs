//! In-process caching for read-heavy entities.
//!
//! The cache is a plain concurrent map from string keys to cloned values. It
//! has no expiry or eviction; repositories keep it coherent by overwriting or
//! removing entries after every successful write, and fill it after a store
//! read through [`MemoryCache::fill`] so that a slow read cannot undo a write.

mod memory;
mod stats;

pub use memory::{CacheStamp, MemoryCache};
pub use stats::CacheStats;
