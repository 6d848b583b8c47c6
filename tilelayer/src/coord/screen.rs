//! Tile-to-screen projection.

use super::types::{DigitalZoomRange, GeoCoordinate, PreciseMapCoordinate, TilePoint};
use super::{geo_to_tile, tile_to_geo};
use crate::tile::{tiles_per_side, TileAddress};

/// Edge length of a source tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Size of the rendering surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A point on the canvas, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Where a tile is drawn: top-left corner plus on-screen edge length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlacement {
    pub address: TileAddress,
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

/// Projects a fractional tile coordinate onto the canvas.
///
/// `origin` is the tile coordinate drawn at the canvas center. Every
/// placement in the crate goes through here so tiles line up seamlessly at
/// any digital zoom.
#[inline]
pub fn screen_position_of(
    coord: TilePoint,
    origin: TilePoint,
    canvas: CanvasSize,
    digital_zoom: f64,
) -> ScreenPoint {
    let scale = TILE_SIZE * digital_zoom;
    ScreenPoint {
        x: (coord.x - origin.x) * scale + canvas.width / 2.0,
        y: (coord.y - origin.y) * scale + canvas.height / 2.0,
    }
}

/// Coordinate math bound to a tile size and digital zoom range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransformer {
    tile_size: f64,
    digital_zoom_range: DigitalZoomRange,
}

impl Default for CoordinateTransformer {
    fn default() -> Self {
        Self::new(DigitalZoomRange::default())
    }
}

impl CoordinateTransformer {
    pub fn new(digital_zoom_range: DigitalZoomRange) -> Self {
        Self {
            tile_size: TILE_SIZE,
            digital_zoom_range,
        }
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    pub fn digital_zoom_range(&self) -> DigitalZoomRange {
        self.digital_zoom_range
    }

    /// Clamps a digital zoom multiplier into the configured range.
    pub fn clamp_digital_zoom(&self, digital_zoom: f64) -> f64 {
        self.digital_zoom_range.clamp(digital_zoom)
    }

    /// Projects `geo` into the tile grid at `zoom`.
    pub fn precise(&self, geo: GeoCoordinate, zoom: u8, digital_zoom: f64) -> PreciseMapCoordinate {
        PreciseMapCoordinate {
            geo,
            tile: geo_to_tile(&geo, zoom),
            zoom,
            digital_zoom: self.clamp_digital_zoom(digital_zoom),
        }
    }

    /// Recomputes `coord` at another zoom level.
    pub fn with_zoom(&self, coord: &PreciseMapCoordinate, zoom: u8) -> PreciseMapCoordinate {
        self.precise(coord.geo, zoom, coord.digital_zoom)
    }

    /// Recomputes `coord` with another digital zoom multiplier.
    pub fn with_digital_zoom(
        &self,
        coord: &PreciseMapCoordinate,
        digital_zoom: f64,
    ) -> PreciseMapCoordinate {
        PreciseMapCoordinate {
            digital_zoom: self.clamp_digital_zoom(digital_zoom),
            ..*coord
        }
    }

    pub fn screen_position_of(
        &self,
        coord: TilePoint,
        origin: TilePoint,
        canvas: CanvasSize,
        digital_zoom: f64,
    ) -> ScreenPoint {
        screen_position_of(coord, origin, canvas, self.clamp_digital_zoom(digital_zoom))
    }

    /// Screen rectangle of `address` with `origin` at the canvas center.
    pub fn tile_placement(
        &self,
        address: TileAddress,
        origin: TilePoint,
        canvas: CanvasSize,
        digital_zoom: f64,
    ) -> TilePlacement {
        let digital_zoom = self.clamp_digital_zoom(digital_zoom);
        let corner = TilePoint::new(f64::from(address.column()), f64::from(address.row()));
        let top_left = screen_position_of(corner, origin, canvas, digital_zoom);
        TilePlacement {
            address,
            x: top_left.x,
            y: top_left.y,
            size: self.tile_size * digital_zoom,
        }
    }

    /// Moves `center` by a pixel drag.
    ///
    /// Dragging right moves the map right, so the center moves left. The
    /// column axis wraps around the antimeridian, the row axis is clamped.
    pub fn pan_by_pixels(
        &self,
        center: &PreciseMapCoordinate,
        dx: f64,
        dy: f64,
    ) -> PreciseMapCoordinate {
        let n = f64::from(tiles_per_side(center.zoom));
        let scale = self.tile_size * center.digital_zoom;

        let x = (center.tile.x - dx / scale).rem_euclid(n);
        let y = (center.tile.y - dy / scale).clamp(0.0, n);
        let tile = TilePoint::new(x, y);

        PreciseMapCoordinate {
            geo: tile_to_geo(tile, center.zoom),
            tile,
            ..*center
        }
    }
}
