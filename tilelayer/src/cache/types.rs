//! Core types for the tile cache.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::tile::SourceKind;

/// Default memory tier byte budget (50 MB).
pub const DEFAULT_MEMORY_BYTES: u64 = 50 * 1024 * 1024;

/// Default memory tier entry cap.
pub const DEFAULT_MEMORY_ENTRIES: usize = 2048;

/// Default total disk budget (100 MB), split across source partitions.
pub const DEFAULT_DISK_BYTES: u64 = 100 * 1024 * 1024;

/// Cache-related errors.
///
/// These never reach the fetch path: the cache logs them and reports a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("Cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File in the cache directory that is not a valid entry
    #[error("Invalid cache entry: {0}")]
    InvalidEntry(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Memory tier limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTierConfig {
    pub max_bytes: u64,
    pub max_entries: usize,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MEMORY_BYTES,
            max_entries: DEFAULT_MEMORY_ENTRIES,
        }
    }
}

/// Disk tier location and per-source budgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskTierConfig {
    pub root: PathBuf,
    pub budgets: HashMap<SourceKind, u64>,
}

impl DiskTierConfig {
    /// Splits `total_bytes` evenly across every source kind.
    pub fn split_evenly(root: impl Into<PathBuf>, total_bytes: u64) -> Self {
        let share = total_bytes / SourceKind::ALL.len() as u64;
        Self {
            root: root.into(),
            budgets: SourceKind::ALL.iter().map(|kind| (*kind, share)).collect(),
        }
    }

    /// Overrides one partition's budget.
    pub fn with_budget(mut self, kind: SourceKind, bytes: u64) -> Self {
        self.budgets.insert(kind, bytes);
        self
    }

    pub fn budget_for(&self, kind: SourceKind) -> u64 {
        self.budgets.get(&kind).copied().unwrap_or(0)
    }
}

/// Complete cache configuration.
///
/// Without a disk tier the cache is memory only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheConfig {
    pub memory: MemoryTierConfig,
    pub disk: Option<DiskTierConfig>,
}

impl CacheConfig {
    pub fn with_memory(mut self, memory: MemoryTierConfig) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_disk(mut self, disk: DiskTierConfig) -> Self {
        self.disk = Some(disk);
        self
    }
}

/// Cache statistics for diagnostics.
///
/// When taken for a single source kind, the tier figures only cover that
/// partition; hit and miss counters are always cache-wide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Distinct tiles held in either tier
    pub tile_count: usize,
    /// Bytes held in either tier (disk bytes plus memory-only bytes)
    pub size_bytes: u64,

    pub memory_entries: usize,
    pub memory_bytes: u64,
    pub disk_entries: usize,
    pub disk_bytes: u64,

    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles, {} bytes (memory {}/{} B, disk {}/{} B), hit rate {:.1}%",
            self.tile_count,
            self.size_bytes,
            self.memory_entries,
            self.memory_bytes,
            self.disk_entries,
            self.disk_bytes,
            self.hit_rate() * 100.0
        )
    }
}

/// What an eviction pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub memory_evicted: usize,
    pub memory_bytes_freed: u64,
    pub disk_evicted: usize,
    pub disk_bytes_freed: u64,
}

impl EvictionReport {
    pub fn total_evicted(&self) -> usize {
        self.memory_evicted + self.disk_evicted
    }
}
