//! Engine configuration.
//!
//! [`EngineConfig`] gathers the configuration of every component so the
//! engine is wired consistently from one place, either built in code or
//! converted from a [`ConfigFile`].

use std::path::PathBuf;
use std::time::Duration;

use super::error::EngineError;
use crate::cache::{CacheBudget, CacheConfig, DeviceProfile, DiskTierConfig, MemoryTierConfig};
use crate::config::ConfigFile;
use crate::coord::DigitalZoomRange;
use crate::fetch::{FetcherConfig, RetryPolicy};
use crate::loader::LoaderConfig;
use crate::provider::SourceConfig;
use crate::scheduler::{ConnectionClass, SchedulerConfig};

/// Backstop timeout of the HTTP client. Per-attempt deadlines are enforced
/// by the fetcher.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`TileEngine`](super::TileEngine).
///
/// The default is a memory-only engine with stock budgets.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub fetcher: FetcherConfig,
    pub loader: LoaderConfig,
    pub scheduler: SchedulerConfig,
    pub sources: SourceConfig,
    pub http_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            fetcher: FetcherConfig::default(),
            loader: LoaderConfig::default(),
            scheduler: SchedulerConfig::default(),
            sources: SourceConfig::default(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Translates a loaded configuration file.
    ///
    /// The disk tier is always enabled, rooted at the configured directory
    /// or the platform cache directory.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        let download = &config.download;
        let viewport = &config.viewport;
        let sources = config.sources.to_source_config();

        Self {
            cache: CacheConfig::default()
                .with_memory(MemoryTierConfig {
                    max_bytes: config.cache.memory_size as u64,
                    max_entries: config.cache.memory_entries,
                })
                .with_disk(DiskTierConfig::split_evenly(
                    config.cache_directory(),
                    config.cache.disk_size as u64,
                )),
            fetcher: FetcherConfig::default()
                .with_retry(RetryPolicy::exponential_from(
                    download.max_retries,
                    Duration::from_millis(download.retry_base_delay_ms),
                ))
                .with_attempt_timeout(Duration::from_secs(download.timeout)),
            loader: LoaderConfig::default()
                .with_low_res_zoom_offset(config.loader.low_res_zoom_offset)
                .with_max_concurrent_fetches(download.max_concurrent),
            scheduler: SchedulerConfig::default()
                .with_batches(viewport.visible_batch, viewport.buffer_batch)
                .with_digital_zoom_range(DigitalZoomRange::new(
                    viewport.digital_zoom_min,
                    viewport.digital_zoom_max,
                ))
                .with_default_source(sources.default_source),
            sources,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Sizes the caches and JPEG quality for the device.
    ///
    /// Keeps an already configured disk root; the disk budget is replaced.
    pub fn with_device_profile(mut self, profile: &DeviceProfile) -> Self {
        let budget = CacheBudget::for_device(profile);
        self.cache.memory = MemoryTierConfig {
            max_bytes: budget.memory_bytes,
            max_entries: budget.memory_entries,
        };
        self.cache.disk = self
            .cache
            .disk
            .take()
            .map(|disk| DiskTierConfig::split_evenly(disk.root, budget.disk_bytes));
        self.fetcher = self.fetcher.with_jpeg_quality(budget.jpeg_quality);
        self
    }

    /// Enables the disk tier under `root`, split evenly across sources.
    pub fn with_disk_cache(mut self, root: impl Into<PathBuf>, total_bytes: u64) -> Self {
        self.cache.disk = Some(DiskTierConfig::split_evenly(root, total_bytes));
        self
    }

    /// Disables the disk tier.
    pub fn memory_only(mut self) -> Self {
        self.cache.disk = None;
        self
    }

    pub fn with_memory_cache(mut self, max_bytes: u64, max_entries: usize) -> Self {
        self.cache.memory = MemoryTierConfig {
            max_bytes,
            max_entries,
        };
        self
    }

    pub fn with_fetcher(mut self, fetcher: FetcherConfig) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_connection_class(mut self, connection: ConnectionClass) -> Self {
        self.scheduler = self.scheduler.with_connection(connection);
        self
    }

    /// Replaces the provider endpoints; the scheduler starts on their
    /// default source.
    pub fn with_sources(mut self, sources: SourceConfig) -> Self {
        self.scheduler = self.scheduler.with_default_source(sources.default_source);
        self.sources = sources;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Rejects settings the components cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        let range = self.scheduler.digital_zoom_range;
        if !(range.min > 0.0 && range.min.is_finite() && range.max.is_finite()) {
            return Err(EngineError::Config(format!(
                "digital zoom bounds must be positive and finite, got {}..{}",
                range.min, range.max
            )));
        }
        if range.min > range.max {
            return Err(EngineError::Config(format!(
                "digital zoom range is empty ({} > {})",
                range.min, range.max
            )));
        }
        if !(range.min..=range.max).contains(&1.0) {
            return Err(EngineError::Config(format!(
                "digital zoom range {}..{} must include 1.0",
                range.min, range.max
            )));
        }
        if self.cache.memory.max_entries == 0 {
            return Err(EngineError::Config(
                "memory cache must hold at least one tile".to_string(),
            ));
        }
        if self.fetcher.attempt_timeout.is_zero() {
            return Err(EngineError::Config(
                "download attempt timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CpuClass;
    use crate::tile::SourceKind;

    #[test]
    fn test_default_is_memory_only() {
        let config = EngineConfig::default();
        assert!(config.cache.disk.is_none());
        assert_eq!(config.loader.max_concurrent_fetches, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_config_file() {
        let mut file = ConfigFile::default();
        file.cache.directory = Some(PathBuf::from("/tmp/tiles"));
        file.cache.disk_size = 300;
        file.download.max_retries = 5;
        file.download.max_concurrent = 2;
        file.loader.low_res_zoom_offset = 3;
        file.viewport.visible_batch = 4;
        file.sources.default = SourceKind::Satellite;

        let config = EngineConfig::from_config_file(&file);
        let disk = config.cache.disk.as_ref().unwrap();
        assert_eq!(disk.root, PathBuf::from("/tmp/tiles"));
        assert_eq!(disk.budget_for(SourceKind::Street), 100);
        assert_eq!(config.fetcher.retry.max_attempts(), 5);
        assert_eq!(config.loader.max_concurrent_fetches, 2);
        assert_eq!(config.loader.low_res_zoom_offset, 3);
        assert_eq!(config.scheduler.visible_batch, 4);
        assert_eq!(config.scheduler.default_source, SourceKind::Satellite);
        assert_eq!(config.sources.default_source, SourceKind::Satellite);
    }

    #[test]
    fn test_device_profile_sizes_caches() {
        let profile = DeviceProfile {
            available_memory_bytes: 8 * 1024 * 1024 * 1024,
            cpu_class: CpuClass::High,
        };
        let budget = CacheBudget::for_device(&profile);
        let config = EngineConfig::default()
            .with_disk_cache("/tmp/tiles", 1)
            .with_device_profile(&profile);

        assert_eq!(config.cache.memory.max_bytes, budget.memory_bytes);
        assert_eq!(config.fetcher.jpeg_quality, budget.jpeg_quality);
        let disk = config.cache.disk.unwrap();
        assert_eq!(disk.root, PathBuf::from("/tmp/tiles"));
        assert_eq!(disk.budget_for(SourceKind::Satellite), budget.disk_bytes / 3);
    }

    #[test]
    fn test_with_sources_moves_default_source() {
        let sources = SourceConfig {
            default_source: SourceKind::SatelliteAlt,
            ..SourceConfig::default()
        };
        let config = EngineConfig::default().with_sources(sources);
        assert_eq!(config.scheduler.default_source, SourceKind::SatelliteAlt);
    }

    #[test]
    fn test_validate_rejects_bad_digital_zoom() {
        let inverted = EngineConfig::default().with_scheduler(
            SchedulerConfig::default().with_digital_zoom_range(DigitalZoomRange::new(4.0, 2.0)),
        );
        assert!(matches!(inverted.validate(), Err(EngineError::Config(_))));

        let excludes_one = EngineConfig::default().with_scheduler(
            SchedulerConfig::default().with_digital_zoom_range(DigitalZoomRange::new(2.0, 4.0)),
        );
        assert!(excludes_one.validate().is_err());

        let zero = EngineConfig::default().with_scheduler(
            SchedulerConfig::default().with_digital_zoom_range(DigitalZoomRange::new(0.0, 4.0)),
        );
        assert!(zero.validate().is_err());
    }
}
