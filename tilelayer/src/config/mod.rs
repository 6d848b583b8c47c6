//! User configuration.
//!
//! Settings are read from an INI file (default `~/.tilelayer/config.ini`).
//! Every key is optional; anything missing keeps its built-in default.
//!
//! ```ini
//! [cache]
//! memory_size = 50MB
//! disk_size = 100MB
//!
//! [sources]
//! default = satellite
//! ```

mod file;
mod parser;
mod size;

pub use file::{
    config_directory, config_file_path, default_cache_directory, CacheSettings, ConfigFile,
    ConfigFileError, DownloadSettings, LoaderSettings, SourceSettings, ViewportSettings,
    DEFAULT_DIGITAL_ZOOM_MAX, DEFAULT_DIGITAL_ZOOM_MIN, DEFAULT_DOWNLOAD_TIMEOUT_SECS,
};
pub use parser::parse_ini;
pub use size::{format_size, parse_size, SizeParseError};
