//! Engine error types.

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigFileError;
use crate::provider::ProviderError;
use crate::tile::AddressError;

/// Errors raised by the engine facade.
///
/// Once running, the engine reports per-tile problems through
/// [`TileLoadState::Failed`](crate::TileLoadState::Failed) instead; only a
/// viewport it cannot plan is returned as an error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Inconsistent engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read or parsed
    #[error(transparent)]
    ConfigFile(#[from] ConfigFileError),

    /// Disk tier could not be opened
    #[error("Failed to open tile cache: {0}")]
    Cache(#[from] CacheError),

    /// HTTP transport could not be built
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] ProviderError),

    /// Failed to create the Tokio runtime
    #[error("Failed to create Tokio runtime: {0}")]
    RuntimeCreation(String),

    /// Viewport cannot be planned
    #[error("Invalid viewport: {0}")]
    Viewport(#[from] AddressError),
}
