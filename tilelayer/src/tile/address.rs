//! Tile address and source kind types.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Highest zoom level an address may carry (2^24 tiles per side still fits u32).
pub const MAX_ZOOM: u8 = 24;

/// Number of tiles along one side of the grid at `zoom`.
///
/// Zoom levels above [`MAX_ZOOM`] are treated as [`MAX_ZOOM`]; callers that
/// accept a zoom from outside reject those before getting here.
#[inline]
pub fn tiles_per_side(zoom: u8) -> u32 {
    1u32 << zoom.min(MAX_ZOOM)
}

/// Errors raised when constructing or parsing a tile address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Zoom level above [`MAX_ZOOM`]
    #[error("Invalid zoom level: {0} (must be between 0 and {max})", max = MAX_ZOOM)]
    InvalidZoom(u8),

    /// Column or row outside `0..2^zoom`
    #[error("Tile ({column}, {row}) is outside the grid at zoom {zoom}")]
    OutOfRange { column: u32, row: u32, zoom: u8 },

    /// Source name not recognised
    #[error("Unknown tile source: '{0}'")]
    UnknownSource(String),

    /// Key did not have the `{source}_{zoom}_{column}_{row}` shape
    #[error("Malformed tile key: '{0}'")]
    Malformed(String),
}

/// Kind of raster map a tile belongs to.
///
/// Each kind is bound to exactly one tile source provider through the
/// provider registry. The lower-case name is part of the cache key and must
/// not contain `_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    /// Street map (OpenStreetMap-style XYZ tiles)
    Street,
    /// Satellite imagery (ArcGIS-style row/column tiles)
    Satellite,
    /// Alternate satellite imagery (quadkey tiles)
    SatelliteAlt,
}

impl SourceKind {
    /// All known source kinds, in registration order.
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Street,
        SourceKind::Satellite,
        SourceKind::SatelliteAlt,
    ];

    /// Lower-case name used in cache keys and directory names.
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Street => "street",
            SourceKind::Satellite => "satellite",
            SourceKind::SatelliteAlt => "satellitealt",
        }
    }

    /// Looks up a kind by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| AddressError::UnknownSource(s.to_string()))
    }
}

/// Normalized square of an ancestor tile that covers a descendant tile.
///
/// `x`, `y` and `size` are fractions of the ancestor's edge length, so the
/// renderer can crop `[x, x + size) × [y, y + size)` and magnify it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AncestorRegion {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl AncestorRegion {
    /// The region covering the whole tile.
    pub const FULL: AncestorRegion = AncestorRegion {
        x: 0.0,
        y: 0.0,
        size: 1.0,
    };
}

/// Address of one raster tile.
///
/// Column increases eastward and row increases southward in the Web
/// Mercator grid. Addresses are only constructed through [`TileAddress::new`]
/// (or parsing), so `0 <= column, row < 2^zoom` always holds.
///
/// # Example
///
/// ```
/// use tilelayer::tile::{SourceKind, TileAddress};
///
/// let address = TileAddress::new(5, 3, 10, SourceKind::Street).unwrap();
/// assert_eq!(address.key(), "street_10_5_3");
/// assert_eq!("street_10_5_3".parse::<TileAddress>().unwrap(), address);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    column: u32,
    row: u32,
    zoom: u8,
    source: SourceKind,
}

impl TileAddress {
    /// Create a validated tile address.
    pub fn new(column: u32, row: u32, zoom: u8, source: SourceKind) -> Result<Self, AddressError> {
        if zoom > MAX_ZOOM {
            return Err(AddressError::InvalidZoom(zoom));
        }
        let side = tiles_per_side(zoom);
        if column >= side || row >= side {
            return Err(AddressError::OutOfRange { column, row, zoom });
        }
        Ok(Self {
            column,
            row,
            zoom,
            source,
        })
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Canonical cache key: `"{source}_{zoom}_{column}_{row}"`.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// On-disk filename for this tile with the given extension.
    pub fn filename(&self, extension: &str) -> String {
        format!("{}.{}", self, extension)
    }

    /// Same grid position served by another source.
    pub fn with_source(&self, source: SourceKind) -> Self {
        Self { source, ..*self }
    }

    /// Coarser tile covering this one.
    ///
    /// Walks `levels` zoom levels up, but never above `min_zoom`. Returns
    /// `None` when no coarser level is available.
    pub fn ancestor(&self, levels: u8, min_zoom: u8) -> Option<(TileAddress, AncestorRegion)> {
        let target = self.zoom.saturating_sub(levels).max(min_zoom);
        if target >= self.zoom {
            return None;
        }

        let shift = self.zoom - target;
        let parent = Self {
            column: self.column >> shift,
            row: self.row >> shift,
            zoom: target,
            source: self.source,
        };

        let span = f64::from(tiles_per_side(shift));
        let region = AncestorRegion {
            x: f64::from(self.column - (parent.column << shift)) / span,
            y: f64::from(self.row - (parent.row << shift)) / span,
            size: 1.0 / span,
        };

        Some((parent, region))
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.source.name(),
            self.zoom,
            self.column,
            self.row
        )
    }
}

impl FromStr for TileAddress {
    type Err = AddressError;

    /// Parses a cache key, with or without a trailing `.{ext}`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stem = s.split_once('.').map_or(s, |(stem, _)| stem);
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() != 4 {
            return Err(AddressError::Malformed(s.to_string()));
        }

        let source: SourceKind = parts[0].parse()?;
        let malformed = || AddressError::Malformed(s.to_string());
        let zoom: u8 = parts[1].parse().map_err(|_| malformed())?;
        let column: u32 = parts[2].parse().map_err(|_| malformed())?;
        let row: u32 = parts[3].parse().map_err(|_| malformed())?;

        Self::new(column, row, zoom, source)
    }
}

/// Parses an on-disk cache filename into its address and extension.
///
/// Returns `None` for anything that is not `{source}_{zoom}_{column}_{row}.{ext}`.
pub fn parse_cache_filename(filename: &str) -> Option<(TileAddress, &str)> {
    let (stem, extension) = filename.rsplit_once('.')?;
    if extension.is_empty() || stem.contains('.') {
        return None;
    }
    let address = stem.parse().ok()?;
    Some((address, extension))
}
