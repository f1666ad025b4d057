use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::CacheStats;

/// Position in a cache's write history, taken before a backing-store read.
///
/// Pass it back to [`MemoryCache::fill`] so that a value read from the
/// store is only cached if no write or removal has landed since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheStamp(u64);

#[derive(Debug)]
struct Slot<T> {
    value: T,
    written_at: u64,
}

/// Concurrency-safe in-memory key/value cache.
///
/// Values are cloned in and out, so callers never hold a lock across an
/// `.await`. The last `set` for a key wins, and a `fill` never overrides a
/// `set` or `remove` that happened after its stamp was taken.
#[derive(Debug)]
pub struct MemoryCache<T> {
    entries: DashMap<String, Slot<T>>,
    clock: AtomicU64,
    last_removal: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            last_removal: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<T: Clone> MemoryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: T) {
        let written_at = self.tick();
        self.entries.insert(key.into(), Slot { value, written_at });
    }

    /// Take a stamp to pair with a later [`fill`](Self::fill).
    pub fn stamp(&self) -> CacheStamp {
        CacheStamp(self.clock.load(Ordering::SeqCst))
    }

    /// Cache `value` read from the backing store after `stamp` was taken.
    ///
    /// The value is dropped if `key` was written after the stamp, or if any
    /// entry was removed after it, since the read may predate that removal.
    /// Returns whether the value was stored.
    pub fn fill(&self, key: impl Into<String>, value: T, stamp: CacheStamp) -> bool {
        match self.entries.entry(key.into()) {
            Entry::Occupied(mut entry) => {
                if entry.get().written_at > stamp.0 {
                    return false;
                }
                entry.insert(Slot {
                    value,
                    written_at: stamp.0,
                });
                true
            }
            Entry::Vacant(entry) => {
                if self.last_removal.load(Ordering::SeqCst) > stamp.0 {
                    return false;
                }
                entry.insert(Slot {
                    value,
                    written_at: stamp.0,
                });
                true
            }
        }
    }

    /// Look up the current value for `key`.
    pub fn get(&self, key: &str) -> Option<T> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value().value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop the entry for `key`, returning it if present.
    pub fn remove(&self, key: &str) -> Option<T> {
        self.mark_removal();
        self.entries.remove(key).map(|(_, slot)| slot.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry. Hit/miss counters are kept.
    pub fn clear(&self) {
        self.mark_removal();
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
        }
    }

    // Must run before the entry is taken out, so a fill that finds the key
    // vacant also sees the removal.
    fn mark_removal(&self) {
        let at = self.tick();
        self.last_removal.fetch_max(at, Ordering::SeqCst);
    }
}
