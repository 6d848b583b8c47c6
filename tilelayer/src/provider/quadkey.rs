//! Quadkey-addressed imagery provider (Virtual Earth style).
//!
//! # URL Pattern
//!
//! `{base}/tiles/a{quadkey}.jpeg?g=1`
//!
//! The quadkey encodes column, row and zoom in one base-4 string, see
//! [`tile_to_quadkey`]. Zoom 0 has no quadkey, so the supported range
//! starts at 1.

use super::types::{ProviderError, TileSourceProvider};
use crate::coord::tile_to_quadkey;
use crate::tile::{TileAddress, TileEncoding};

/// Default quadkey tile server.
pub const DEFAULT_QUADKEY_BASE: &str = "https://ecn.t0.tiles.virtualearth.net";

const MIN_ZOOM: u8 = 1;
const MAX_ZOOM: u8 = 19;

/// Aerial imagery addressed by quadkey.
#[derive(Debug, Clone)]
pub struct QuadkeyProvider {
    base_url: String,
}

impl QuadkeyProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for QuadkeyProvider {
    fn default() -> Self {
        Self::new(DEFAULT_QUADKEY_BASE)
    }
}

impl TileSourceProvider for QuadkeyProvider {
    fn name(&self) -> &str {
        "Quadkey"
    }

    fn url_for(&self, address: &TileAddress) -> Result<String, ProviderError> {
        if !self.supports_zoom(address.zoom()) {
            return Err(ProviderError::UnsupportedZoom(address.zoom()));
        }
        let quadkey = tile_to_quadkey(address.column(), address.row(), address.zoom());
        Ok(format!("{}/tiles/a{}.jpeg?g=1", self.base_url, quadkey))
    }

    fn attribution(&self) -> &str {
        "© Microsoft Corporation"
    }

    fn zoom_range(&self) -> (u8, u8) {
        (MIN_ZOOM, MAX_ZOOM)
    }

    fn encoding(&self) -> TileEncoding {
        TileEncoding::Jpeg
    }
}
