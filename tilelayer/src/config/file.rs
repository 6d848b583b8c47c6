//! Configuration file handling for ~/.tilelayer/config.ini.
//!
//! Settings structs and their defaults live here; parsing is in
//! [`super::parser`].

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use crate::cache::{DEFAULT_DISK_BYTES, DEFAULT_MEMORY_BYTES, DEFAULT_MEMORY_ENTRIES};
use crate::fetch::{DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS};
use crate::loader::{DEFAULT_LOW_RES_ZOOM_OFFSET, DEFAULT_MAX_CONCURRENT_FETCHES};
use crate::provider::SourceConfig;
use crate::scheduler::{DEFAULT_BUFFER_BATCH, DEFAULT_VISIBLE_BATCH};
use crate::tile::SourceKind;

/// Default per-attempt download timeout in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 10;

/// Default digital zoom bounds.
pub const DEFAULT_DIGITAL_ZOOM_MIN: f64 = 0.1;
pub const DEFAULT_DIGITAL_ZOOM_MAX: f64 = 10.0;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// `[cache]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Disk tier root; `None` uses the platform cache directory
    pub directory: Option<PathBuf>,
    pub memory_size: usize,
    pub memory_entries: usize,
    /// Total disk budget, split evenly across sources
    pub disk_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: None,
            memory_size: DEFAULT_MEMORY_BYTES as usize,
            memory_entries: DEFAULT_MEMORY_ENTRIES,
            disk_size: DEFAULT_DISK_BYTES as usize,
        }
    }
}

/// `[download]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Per-attempt timeout in seconds
    pub timeout: u64,
    /// Attempts per tile, including the first
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_concurrent: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

/// `[loader]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSettings {
    pub low_res_zoom_offset: u8,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            low_res_zoom_offset: DEFAULT_LOW_RES_ZOOM_OFFSET,
        }
    }
}

/// `[viewport]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSettings {
    pub visible_batch: usize,
    pub buffer_batch: usize,
    pub digital_zoom_min: f64,
    pub digital_zoom_max: f64,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            visible_batch: DEFAULT_VISIBLE_BATCH,
            buffer_batch: DEFAULT_BUFFER_BATCH,
            digital_zoom_min: DEFAULT_DIGITAL_ZOOM_MIN,
            digital_zoom_max: DEFAULT_DIGITAL_ZOOM_MAX,
        }
    }
}

/// `[sources]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub street_host: String,
    pub satellite_base: String,
    pub satellitealt_base: String,
    pub default: SourceKind,
}

impl Default for SourceSettings {
    fn default() -> Self {
        let endpoints = SourceConfig::default();
        Self {
            street_host: endpoints.street_host,
            satellite_base: endpoints.arcgis_base,
            satellitealt_base: endpoints.quadkey_base,
            default: endpoints.default_source,
        }
    }
}

impl SourceSettings {
    pub fn to_source_config(&self) -> SourceConfig {
        SourceConfig {
            street_host: self.street_host.clone(),
            arcgis_base: self.satellite_base.clone(),
            quadkey_base: self.satellitealt_base.clone(),
            default_source: self.default,
        }
    }
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub download: DownloadSettings,
    pub loader: LoaderSettings,
    pub viewport: ViewportSettings,
    pub sources: SourceSettings,
}

impl ConfigFile {
    /// Loads from the default path (~/.tilelayer/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Loads from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Parses INI text.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(content).map_err(ini::Error::Parse)?;
        super::parser::parse_ini(&ini)
    }

    /// Disk tier root, falling back to the platform cache directory.
    pub fn cache_directory(&self) -> PathBuf {
        self.cache
            .directory
            .clone()
            .unwrap_or_else(default_cache_directory)
    }
}

/// Path to the config directory (~/.tilelayer).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilelayer")
}

/// Path to the config file (~/.tilelayer/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// Platform cache directory for tiles (e.g. ~/.cache/tilelayer on Linux).
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(config_directory)
        .join("tilelayer")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.cache.memory_size, 50 * 1024 * 1024);
        assert_eq!(config.cache.memory_entries, 2048);
        assert_eq!(config.download.timeout, 10);
        assert_eq!(config.download.max_retries, 3);
        assert_eq!(config.loader.low_res_zoom_offset, 2);
        assert_eq!(config.sources.default, SourceKind::Street);
        assert!(config.cache.directory.is_none());
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp_dir.path().join("missing.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(
            &path,
            "[cache]\nmemory_size = 16MB\n\n[download]\nmax_concurrent = 4\n\n[sources]\ndefault = satellitealt\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.cache.memory_size, 16 * 1024 * 1024);
        assert_eq!(config.download.max_concurrent, 4);
        assert_eq!(config.sources.default, SourceKind::SatelliteAlt);
        assert_eq!(config.viewport, ViewportSettings::default());
    }

    #[test]
    fn test_load_from_unreadable_file_fails() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[cache\nmemory_size = 16MB\n").unwrap();
        assert!(matches!(
            ConfigFile::load_from(&path),
            Err(ConfigFileError::ReadError(_))
        ));
    }

    #[test]
    fn test_source_settings_map_to_endpoints() {
        let settings = SourceSettings {
            street_host: "tiles.example.org".to_string(),
            ..Default::default()
        };
        let endpoints = settings.to_source_config();
        assert_eq!(endpoints.street_host, "tiles.example.org");
        assert_eq!(endpoints.arcgis_base, SourceConfig::default().arcgis_base);
    }
}
