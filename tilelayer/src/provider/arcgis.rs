//! ArcGIS World Imagery provider.
//!
//! Provides access to Esri's World Imagery basemap, which offers high-resolution
//! satellite and aerial imagery with global coverage.
//!
//! # URL Pattern
//!
//! `{base}/MapServer/tile/{z}/{y}/{x}`
//!
//! Note the row comes before the column, the reverse of the street layout.
//!
//! # Terms of Use
//!
//! The World Imagery basemap is provided by Esri and is subject to their
//! terms of use. See: <https://www.esri.com/en-us/legal/terms/full-master-agreement>

use super::types::{ProviderError, TileSourceProvider};
use crate::tile::{TileAddress, TileEncoding};

/// Base URL for ArcGIS World Imagery tiles.
pub const DEFAULT_ARCGIS_BASE: &str =
    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery";

/// Minimum zoom level supported by ArcGIS World Imagery.
const MIN_ZOOM: u8 = 0;

/// Maximum zoom level supported by ArcGIS World Imagery.
/// ArcGIS provides imagery up to zoom level 19 in most areas.
const MAX_ZOOM: u8 = 19;

/// ArcGIS World Imagery satellite provider.
///
/// No API key or authentication required for the public tier. Higher zoom
/// levels (17-19) may not be available in all regions.
#[derive(Debug, Clone)]
pub struct ArcGisProvider {
    base_url: String,
}

impl ArcGisProvider {
    /// Creates a provider against a MapServer base URL (without the
    /// trailing `/MapServer`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for ArcGisProvider {
    fn default() -> Self {
        Self::new(DEFAULT_ARCGIS_BASE)
    }
}

impl TileSourceProvider for ArcGisProvider {
    fn name(&self) -> &str {
        "ArcGIS"
    }

    fn url_for(&self, address: &TileAddress) -> Result<String, ProviderError> {
        if !self.supports_zoom(address.zoom()) {
            return Err(ProviderError::UnsupportedZoom(address.zoom()));
        }
        Ok(format!(
            "{}/MapServer/tile/{}/{}/{}",
            self.base_url,
            address.zoom(),
            address.row(),
            address.column()
        ))
    }

    fn attribution(&self) -> &str {
        "Esri, Maxar, Earthstar Geographics, and the GIS User Community"
    }

    fn zoom_range(&self) -> (u8, u8) {
        (MIN_ZOOM, MAX_ZOOM)
    }

    fn encoding(&self) -> TileEncoding {
        TileEncoding::Jpeg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::SourceKind;

    fn address(column: u32, row: u32, zoom: u8) -> TileAddress {
        TileAddress::new(column, row, zoom, SourceKind::Satellite).unwrap()
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(ArcGisProvider::default().name(), "ArcGIS");
    }

    #[test]
    fn test_zoom_range() {
        let provider = ArcGisProvider::default();
        assert_eq!(provider.zoom_range(), (0, 19));
        assert!(provider.supports_zoom(0));
        assert!(provider.supports_zoom(19));
        assert!(!provider.supports_zoom(20));
    }

    #[test]
    fn test_url_swaps_row_and_column() {
        let provider = ArcGisProvider::default();
        let url = provider.url_for(&address(200, 100, 15)).unwrap();
        assert_eq!(
            url,
            "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/15/100/200"
        );
    }

    #[test]
    fn test_url_construction_max_zoom() {
        let provider = ArcGisProvider::new("https://example.com/arcgis/");
        let url = provider.url_for(&address(524287, 262143, 19)).unwrap();
        assert_eq!(
            url,
            "https://example.com/arcgis/MapServer/tile/19/262143/524287"
        );
    }

    #[test]
    fn test_unsupported_zoom() {
        let provider = ArcGisProvider::default();
        match provider.url_for(&address(0, 0, 21)) {
            Err(ProviderError::UnsupportedZoom(zoom)) => assert_eq!(zoom, 21),
            other => panic!("Expected UnsupportedZoom error, got {:?}", other),
        }
    }
}
