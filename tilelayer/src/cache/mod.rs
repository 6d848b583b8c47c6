//! Two-tier tile cache.
//!
//! [`TileCache`] layers a bounded [`MemoryTier`] over an optional
//! [`DiskTier`] partitioned by source kind:
//!
//! ```text
//! get:  memory ──miss──► disk ──hit──► promote to memory
//! put:  memory + disk, then evict whatever is over budget
//! ```
//!
//! Both tiers evict in strict LRU order using ticks from one shared
//! [`AccessClock`]. Disk failures are logged and reported as misses; they
//! never reach the fetch path.
//!
//! # Example
//!
//! ```ignore
//! let cache = TileCache::open(
//!     CacheConfig::default().with_disk(DiskTierConfig::split_evenly(dir, 100 * 1024 * 1024)),
//! ).await?;
//! cache.put(&address, image).await;
//! assert!(cache.get(&address).await.is_some());
//! ```

mod budget;
mod disk;
mod lru;
mod memory;
mod types;

pub use budget::{CacheBudget, CpuClass, DeviceProfile};
pub use disk::{DiskTier, ScanReport};
pub use lru::{AccessClock, Evicted, LruIndex};
pub use memory::MemoryTier;
pub use types::{
    CacheConfig, CacheError, CacheStats, DiskTierConfig, EvictionReport, MemoryTierConfig,
    DEFAULT_DISK_BYTES, DEFAULT_MEMORY_BYTES, DEFAULT_MEMORY_ENTRIES,
};

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::tile::{EncodedImage, SourceKind, TileAddress};

/// Memory tier target after a pressure signal, as a fraction of its budget.
const PRESSURE_TARGET_RATIO: f64 = 0.5;

/// Memory and disk tiers behind one interface.
///
/// Internally synchronized: share it as `Arc<TileCache>`.
pub struct TileCache {
    memory: MemoryTier,
    disk: Option<DiskTier>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TileCache {
    /// Opens the cache, rebuilding the disk index if a disk tier is configured.
    pub async fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let clock = AccessClock::new();
        let disk = match &config.disk {
            Some(disk_config) => Some(DiskTier::open(disk_config, clock.clone()).await?.0),
            None => None,
        };
        Ok(Self {
            memory: MemoryTier::new(config.memory, clock),
            disk,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// A cache with no disk tier.
    pub fn memory_only(config: MemoryTierConfig) -> Self {
        Self {
            memory: MemoryTier::new(config, AccessClock::new()),
            disk: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn has_disk_tier(&self) -> bool {
        self.disk.is_some()
    }

    /// Looks in memory, then on disk. Disk hits are promoted into memory.
    pub async fn get(&self, address: &TileAddress) -> Option<EncodedImage> {
        if let Some(image) = self.memory.get(address) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(image);
        }

        let found = match &self.disk {
            Some(disk) => match disk.read(address).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(tile = %address, error = %e, "Disk cache read failed, treating as miss");
                    None
                }
            },
            None => None,
        };

        match found {
            Some(image) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.memory.insert(*address, image.clone());
                self.evict_memory();
                Some(image)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Memory-only lookup; never touches the disk.
    pub fn get_memory(&self, address: &TileAddress) -> Option<EncodedImage> {
        self.memory.get(address)
    }

    /// Stores a tile in both tiers, then evicts anything over budget.
    ///
    /// A failed disk write is logged; the tile still lands in memory.
    pub async fn put(&self, address: &TileAddress, image: EncodedImage) {
        self.memory.insert(*address, image.clone());
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.write(address, &image).await {
                warn!(tile = %address, error = %e, "Disk cache write failed");
            }
        }
        self.evict_if_over_budget().await;
    }

    /// Evicts least recently used tiles from every tier over budget.
    pub async fn evict_if_over_budget(&self) -> EvictionReport {
        let mut report = EvictionReport::default();
        let (memory_evicted, memory_bytes_freed) = self.memory.evict_to_budget();
        report.memory_evicted = memory_evicted;
        report.memory_bytes_freed = memory_bytes_freed;

        if let Some(disk) = &self.disk {
            let (disk_evicted, disk_bytes_freed) = disk.evict_if_over_budget().await;
            report.disk_evicted = disk_evicted;
            report.disk_bytes_freed = disk_bytes_freed;
        }

        self.record_evictions(&report);
        report
    }

    /// Host memory-pressure hook: shrinks the memory tier to half its byte
    /// budget. The disk tier is untouched. Safe to call at any time.
    pub fn handle_memory_pressure(&self) -> EvictionReport {
        let config = self.memory.config();
        let target = (config.max_bytes as f64 * PRESSURE_TARGET_RATIO) as u64;
        let (memory_evicted, memory_bytes_freed) = self.memory.evict_to(target, config.max_entries);
        let report = EvictionReport {
            memory_evicted,
            memory_bytes_freed,
            ..EvictionReport::default()
        };
        self.record_evictions(&report);
        info!(
            evicted = memory_evicted,
            freed_bytes = memory_bytes_freed,
            target_bytes = target,
            "Memory pressure: memory cache trimmed"
        );
        report
    }

    /// Drops every tile of `source` (or all tiles) from both tiers.
    pub async fn clear(&self, source: Option<SourceKind>) {
        let memory = self.memory.clear(source);
        let disk = match &self.disk {
            Some(disk) => disk.clear(source).await,
            None => 0,
        };
        info!(
            source = source.map_or("all", |kind| kind.name()),
            memory = memory,
            disk = disk,
            "Tile cache cleared"
        );
    }

    /// Statistics for one source kind or for the whole cache.
    pub fn stats(&self, source: Option<SourceKind>) -> CacheStats {
        let (memory_entries, memory_bytes) = self.memory.usage(source);
        let (disk_entries, disk_bytes) = self
            .disk
            .as_ref()
            .map_or((0, 0), |disk| disk.usage(source));

        // Tiles only in memory (not yet on disk, or no disk tier)
        let (memory_only, memory_only_bytes) = match &self.disk {
            Some(disk) => self.memory.usage_where(|address| {
                source.map_or(true, |kind| address.source() == kind) && !disk.contains(address)
            }),
            None => (memory_entries, memory_bytes),
        };

        CacheStats {
            tile_count: disk_entries + memory_only,
            size_bytes: disk_bytes + memory_only_bytes,
            memory_entries,
            memory_bytes,
            disk_entries,
            disk_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_memory(&self) {
        let (evicted, bytes) = self.memory.evict_to_budget();
        if evicted > 0 {
            debug!(evicted = evicted, freed_bytes = bytes, "Memory cache over budget");
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    fn record_evictions(&self, report: &EvictionReport) {
        let total = report.total_evicted() as u64;
        if total > 0 {
            self.evictions.fetch_add(total, Ordering::Relaxed);
        }
    }
}
