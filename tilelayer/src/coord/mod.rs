//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude)
//! and fractional Web Mercator tile coordinates, quadkey encoding, and the
//! screen projection used to place tiles on the canvas.
//!
//! All math is `f64` end to end. At zoom 18 and above a single tile pixel is
//! well under a metre, and sub-pixel dragging accumulates error quickly in
//! single precision.

mod screen;
mod types;


pub use screen::{
    screen_position_of, CanvasSize, CoordinateTransformer, ScreenPoint, TilePlacement, TILE_SIZE,
};
pub use types::{
    CoordError, DigitalZoomRange, GeoCoordinate, PreciseMapCoordinate, TilePoint, MAX_LAT,
    MAX_LON, MIN_LAT, MIN_LON,
};

use std::f64::consts::PI;

use crate::tile::{tiles_per_side, AddressError, SourceKind, TileAddress};

/// Converts a geographic coordinate to fractional tile coordinates.
///
/// Latitude is clamped to the Web Mercator range first, so the result always
/// lies in `[0, 2^zoom]` on both axes.
#[inline]
pub fn geo_to_tile(geo: &GeoCoordinate, zoom: u8) -> TilePoint {
    let n = f64::from(tiles_per_side(zoom));

    let x = (geo.longitude() + 180.0) / 360.0 * n;

    let lat_rad = geo.mercator_latitude().to_radians();
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n;

    TilePoint::new(x.clamp(0.0, n), y.clamp(0.0, n))
}

/// Converts fractional tile coordinates back to a geographic coordinate.
///
/// Inputs outside `[0, 2^zoom]` are clamped to the grid edge.
#[inline]
pub fn tile_to_geo(point: TilePoint, zoom: u8) -> GeoCoordinate {
    let n = f64::from(tiles_per_side(zoom));
    let x = point.x.clamp(0.0, n);
    let y = point.y.clamp(0.0, n);

    let lon = x / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();

    // Clamp guards rounding at the grid edges.
    GeoCoordinate::clamped(lat, lon)
}

/// Returns the address of the tile containing `geo` at `zoom`.
pub fn tile_containing(
    geo: &GeoCoordinate,
    zoom: u8,
    source: SourceKind,
) -> Result<TileAddress, AddressError> {
    if zoom > crate::tile::MAX_ZOOM {
        return Err(AddressError::InvalidZoom(zoom));
    }
    let point = geo_to_tile(geo, zoom);
    let max_index = tiles_per_side(zoom) - 1;

    // x == 2^zoom happens at longitude 180 and latitude MIN_LAT
    let column = (point.x.floor() as u32).min(max_index);
    let row = (point.y.floor() as u32).min(max_index);

    TileAddress::new(column, row, zoom, source)
}

/// Converts tile coordinates to a quadkey string.
///
/// Walks from `zoom` down to 1, taking one base-4 digit per level from the
/// matching bit of column (weight 1) and row (weight 2). Zoom 0 yields an
/// empty string.
///
/// # Example
///
/// ```
/// use tilelayer::coord::tile_to_quadkey;
///
/// assert_eq!(tile_to_quadkey(3, 5, 3), "213");
/// ```
pub fn tile_to_quadkey(column: u32, row: u32, zoom: u8) -> String {
    let mut quadkey = String::with_capacity(zoom as usize);
    for level in (1..=zoom).rev() {
        let mask = 1u32 << (level - 1);
        let mut digit = b'0';
        if column & mask != 0 {
            digit += 1;
        }
        if row & mask != 0 {
            digit += 2;
        }
        quadkey.push(digit as char);
    }
    quadkey
}

/// Converts a quadkey back to `(column, row, zoom)`.
pub fn quadkey_to_tile(quadkey: &str) -> Result<(u32, u32, u8), CoordError> {
    if quadkey.len() > crate::tile::MAX_ZOOM as usize {
        return Err(CoordError::InvalidQuadkey(quadkey.to_string()));
    }

    let zoom = quadkey.len() as u8;
    let mut column = 0u32;
    let mut row = 0u32;

    for (i, ch) in quadkey.chars().enumerate() {
        let mask = 1u32 << (zoom as usize - i - 1);
        match ch {
            '0' => {}
            '1' => column |= mask,
            '2' => row |= mask,
            '3' => {
                column |= mask;
                row |= mask;
            }
            _ => return Err(CoordError::InvalidQuadkey(quadkey.to_string())),
        }
    }

    Ok((column, row, zoom))
}
