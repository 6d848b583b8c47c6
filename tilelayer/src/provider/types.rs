//! Provider types and traits

use thiserror::Error;

use crate::tile::{SourceKind, TileAddress, TileEncoding};

/// Errors that can occur during provider operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Zoom level not supported by this provider
    #[error("Zoom level {0} not supported by provider")]
    UnsupportedZoom(u8),

    /// No provider bound to the requested source
    #[error("No provider registered for source '{0}'")]
    Unregistered(SourceKind),

    /// HTTP client could not be created
    #[error("HTTP error: {0}")]
    Http(String),
}

/// A remote raster tile source.
///
/// Implementors only know how to address tiles; the actual download is done
/// by the fetcher through an injected HTTP transport. Consumers never talk to
/// a provider directly, they look one up in the
/// [`ProviderRegistry`](super::ProviderRegistry).
pub trait TileSourceProvider: Send + Sync {
    /// Returns the provider's name for logging and identification.
    fn name(&self) -> &str;

    /// Builds the download URL for `address`.
    ///
    /// Returns [`ProviderError::UnsupportedZoom`] when the address zoom lies
    /// outside [`zoom_range`](Self::zoom_range), before any request is made.
    fn url_for(&self, address: &TileAddress) -> Result<String, ProviderError>;

    /// Attribution text the UI must display alongside this source.
    fn attribution(&self) -> &str;

    /// Inclusive `(min, max)` zoom levels the source serves.
    fn zoom_range(&self) -> (u8, u8);

    /// Checks if this provider supports the given zoom level.
    fn supports_zoom(&self, zoom: u8) -> bool {
        let (min, max) = self.zoom_range();
        zoom >= min && zoom <= max
    }

    /// The encoding the source normally serves.
    fn encoding(&self) -> TileEncoding;
}
