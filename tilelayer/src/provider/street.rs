//! Street map provider.
//!
//! # URL Pattern
//!
//! `https://tile.{host}/{z}/{x}/{y}.png`
//!
//! Standard slippy-map XYZ addressing: column before row. The host is
//! configurable so mirrors and self-hosted tile servers work unchanged.

use super::types::{ProviderError, TileSourceProvider};
use crate::tile::{TileAddress, TileEncoding};

/// Default street tile host.
pub const DEFAULT_STREET_HOST: &str = "openstreetmap.org";

const MIN_ZOOM: u8 = 0;
const MAX_ZOOM: u8 = 19;

/// Street map tiles from an OpenStreetMap-style tile server.
#[derive(Debug, Clone)]
pub struct StreetProvider {
    host: String,
}

impl StreetProvider {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Default for StreetProvider {
    fn default() -> Self {
        Self::new(DEFAULT_STREET_HOST)
    }
}

impl TileSourceProvider for StreetProvider {
    fn name(&self) -> &str {
        "Street"
    }

    fn url_for(&self, address: &TileAddress) -> Result<String, ProviderError> {
        if !self.supports_zoom(address.zoom()) {
            return Err(ProviderError::UnsupportedZoom(address.zoom()));
        }
        Ok(format!(
            "https://tile.{}/{}/{}/{}.png",
            self.host,
            address.zoom(),
            address.column(),
            address.row()
        ))
    }

    fn attribution(&self) -> &str {
        "© OpenStreetMap contributors"
    }

    fn zoom_range(&self) -> (u8, u8) {
        (MIN_ZOOM, MAX_ZOOM)
    }

    fn encoding(&self) -> TileEncoding {
        TileEncoding::Png
    }
}
