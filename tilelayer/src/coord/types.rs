//! Coordinate type definitions

use thiserror::Error;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Latitude is outside -90.0 to 90.0
    #[error("Invalid latitude: {0} (must be between -90 and 90)")]
    InvalidLatitude(f64),

    /// Longitude is outside -180.0 to 180.0
    #[error("Invalid longitude: {0} (must be between {min} and {max})", min = MIN_LON, max = MAX_LON)]
    InvalidLongitude(f64),

    /// Quadkey contains invalid characters or is too long
    #[error("Invalid quadkey: '{0}' (must contain only digits 0-3)")]
    InvalidQuadkey(String),
}

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoordinate {
    latitude: f64,
    longitude: f64,
}

impl GeoCoordinate {
    /// Create a validated coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordError::InvalidLatitude(latitude));
        }
        if !(MIN_LON..=MAX_LON).contains(&longitude) {
            return Err(CoordError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Create a coordinate, clamping both axes into the valid range.
    pub fn clamped(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: latitude.clamp(-90.0, 90.0),
            longitude: longitude.clamp(MIN_LON, MAX_LON),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Latitude clamped into the range Web Mercator can represent.
    pub fn mercator_latitude(&self) -> f64 {
        self.latitude.clamp(MIN_LAT, MAX_LAT)
    }
}

/// Fractional position in the tile grid of one zoom level.
///
/// Integer parts select the tile, fractional parts the position inside it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TilePoint {
    pub x: f64,
    pub y: f64,
}

impl TilePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Allowed digital zoom multipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigitalZoomRange {
    pub min: f64,
    pub max: f64,
}

impl DigitalZoomRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp a requested multiplier into range. NaN maps to 1.0.
    pub fn clamp(&self, digital_zoom: f64) -> f64 {
        if digital_zoom.is_nan() {
            return 1.0_f64.clamp(self.min, self.max);
        }
        digital_zoom.clamp(self.min, self.max)
    }
}

impl Default for DigitalZoomRange {
    fn default() -> Self {
        Self {
            min: 0.1,
            max: 10.0,
        }
    }
}

/// A geographic coordinate projected into the tile grid.
///
/// This is a computed snapshot: build it with
/// [`CoordinateTransformer::precise`](super::CoordinateTransformer::precise) and
/// rebuild it when zoom or digital zoom change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreciseMapCoordinate {
    pub geo: GeoCoordinate,
    pub tile: TilePoint,
    pub zoom: u8,
    pub digital_zoom: f64,
}
