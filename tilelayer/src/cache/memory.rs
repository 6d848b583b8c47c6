//! In-memory tile tier.
//!
//! Bounded by bytes and by entry count. All access goes through one
//! `parking_lot::Mutex`; critical sections are short map operations and
//! never span an `.await`, so the lock is safe to take from async code and
//! from the memory-pressure hook on any thread.

use parking_lot::Mutex;

use super::lru::{AccessClock, LruIndex};
use super::types::MemoryTierConfig;
use crate::tile::{EncodedImage, SourceKind, TileAddress};

/// Memory tier of the tile cache.
pub struct MemoryTier {
    index: Mutex<LruIndex<TileAddress, EncodedImage>>,
    config: MemoryTierConfig,
    clock: AccessClock,
}

impl MemoryTier {
    pub fn new(config: MemoryTierConfig, clock: AccessClock) -> Self {
        Self {
            index: Mutex::new(LruIndex::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> MemoryTierConfig {
        self.config
    }

    /// Returns the tile and marks it most recently used.
    pub fn get(&self, address: &TileAddress) -> Option<EncodedImage> {
        let tick = self.clock.tick();
        self.index.lock().touch(address, tick).cloned()
    }

    pub fn contains(&self, address: &TileAddress) -> bool {
        self.index.lock().contains(address)
    }

    /// Stores a tile. Does not evict; call [`evict_to_budget`](Self::evict_to_budget).
    pub fn insert(&self, address: TileAddress, image: EncodedImage) {
        let tick = self.clock.tick();
        let size = image.len() as u64;
        self.index.lock().insert(address, image, size, tick);
    }

    /// Evicts least recently used tiles until the configured limits hold.
    ///
    /// Returns `(tiles evicted, bytes freed)`.
    pub fn evict_to_budget(&self) -> (usize, u64) {
        self.evict_to(self.config.max_bytes, self.config.max_entries)
    }

    /// Evicts down to an explicit byte and entry limit.
    pub fn evict_to(&self, max_bytes: u64, max_entries: usize) -> (usize, u64) {
        let evicted = self.index.lock().evict_until(max_bytes, max_entries);
        let bytes = evicted.iter().map(|entry| entry.size_bytes).sum();
        (evicted.len(), bytes)
    }

    /// Drops every tile of `source`, or all tiles.
    pub fn clear(&self, source: Option<SourceKind>) -> usize {
        let mut index = self.index.lock();
        match source {
            Some(kind) => index.remove_where(|address| address.source() == kind).len(),
            None => {
                let count = index.len();
                *index = LruIndex::new();
                count
            }
        }
    }

    /// `(tiles, bytes)` for `source`, or for the whole tier.
    pub fn usage(&self, source: Option<SourceKind>) -> (usize, u64) {
        match source {
            Some(kind) => self.usage_where(|address| address.source() == kind),
            None => {
                let index = self.index.lock();
                (index.len(), index.total_bytes())
            }
        }
    }

    /// `(tiles, bytes)` of the tiles matching `predicate`.
    ///
    /// The predicate runs under the tier lock and must not call back into
    /// this tier.
    pub fn usage_where(&self, predicate: impl FnMut(&TileAddress) -> bool) -> (usize, u64) {
        self.index.lock().usage_where(predicate)
    }
}
