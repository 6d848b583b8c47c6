//! Working-set planning: which tiles a viewport needs, in which order.

use std::collections::HashSet;

use crate::coord::{geo_to_tile, CanvasSize, GeoCoordinate, TilePoint, TILE_SIZE};
use crate::tile::{tiles_per_side, SourceKind, TileAddress, MAX_ZOOM};

/// What the host is looking at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: GeoCoordinate,
    pub zoom: u8,
    /// Magnification of the fetched tiles; `1.0` means none
    pub digital_zoom: f64,
    pub canvas: CanvasSize,
    pub source: SourceKind,
}

impl Viewport {
    pub fn new(center: GeoCoordinate, zoom: u8, canvas: CanvasSize, source: SourceKind) -> Self {
        Self {
            center,
            zoom,
            digital_zoom: 1.0,
            canvas,
            source,
        }
    }

    pub fn with_digital_zoom(mut self, digital_zoom: f64) -> Self {
        self.digital_zoom = digital_zoom;
        self
    }

    pub fn with_source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    /// Whether the existing tiles are being magnified rather than replaced.
    pub fn is_digital_zoom_engaged(&self) -> bool {
        self.digital_zoom != 1.0
    }

    /// Center in fractional tile coordinates at the viewport zoom.
    pub fn center_tile(&self) -> TilePoint {
        geo_to_tile(&self.center, self.zoom)
    }
}

/// Network quality hint from the host, used to size the buffer ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionClass {
    Fast,
    #[default]
    Moderate,
    Slow,
    Metered,
}

impl ConnectionClass {
    /// Buffer ring width as a fraction of the canvas, per edge.
    pub fn buffer_fraction(&self) -> f64 {
        match self {
            ConnectionClass::Fast => 0.5,
            ConnectionClass::Moderate => 0.4,
            ConnectionClass::Slow | ConnectionClass::Metered => 0.3,
        }
    }
}

/// Tiles a viewport needs, nearest to the center first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TilePlan {
    /// Tiles intersecting the canvas
    pub visible: Vec<TileAddress>,
    /// Ring beyond the canvas edges, disjoint from `visible`
    pub buffer: Vec<TileAddress>,
}

impl TilePlan {
    pub fn len(&self) -> usize {
        self.visible.len() + self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.buffer.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileAddress> {
        self.visible.iter().chain(self.buffer.iter())
    }

    pub fn addresses(&self) -> HashSet<TileAddress> {
        self.iter().copied().collect()
    }
}

/// Half-open rectangle in fractional tile units around the viewport center.
struct Extent {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl Extent {
    fn around(center: TilePoint, half_width: f64, half_height: f64) -> Self {
        Self {
            min_x: center.x - half_width,
            max_x: center.x + half_width,
            min_y: center.y - half_height,
            max_y: center.y + half_height,
        }
    }

    /// Unwrapped columns and clamped rows of every tile touching the extent.
    fn cells(&self, side: i64) -> impl Iterator<Item = (i64, i64)> {
        let (min_x, max_x) = (self.min_x.floor() as i64, self.max_x.ceil() as i64 - 1);
        let min_y = (self.min_y.floor() as i64).max(0);
        let max_y = (self.max_y.ceil() as i64 - 1).min(side - 1);
        (min_y..=max_y).flat_map(move |y| (min_x..=max_x).map(move |x| (x, y)))
    }
}

/// Plans the visible tiles and the buffer ring for `viewport`.
///
/// The buffer extends `buffer_fraction` of the canvas size beyond each edge.
/// Columns wrap around the antimeridian; rows past the poles are dropped.
/// A tile reached through more than one wrap is listed once, at its
/// nearest position.
///
/// An empty canvas or a zoom above [`MAX_ZOOM`] plans nothing.
pub fn plan_tiles(viewport: &Viewport, buffer_fraction: f64) -> TilePlan {
    let canvas = viewport.canvas;
    let scale = TILE_SIZE * viewport.digital_zoom;
    if viewport.zoom > MAX_ZOOM {
        return TilePlan::default();
    }
    if !(canvas.width > 0.0 && canvas.height > 0.0 && scale > 0.0) {
        return TilePlan::default();
    }

    let side = i64::from(tiles_per_side(viewport.zoom));
    let center = viewport.center_tile();
    let half_width = canvas.width / 2.0 / scale;
    let half_height = canvas.height / 2.0 / scale;
    let buffer_fraction = buffer_fraction.max(0.0);

    let inner = Extent::around(center, half_width, half_height);
    let outer = Extent::around(
        center,
        half_width + canvas.width * buffer_fraction / scale,
        half_height + canvas.height * buffer_fraction / scale,
    );

    let mut seen = HashSet::new();
    let visible = ordered(inner.cells(side), center, side, viewport, &mut seen);
    let buffer = ordered(outer.cells(side), center, side, viewport, &mut seen);
    TilePlan { visible, buffer }
}

fn ordered(
    cells: impl Iterator<Item = (i64, i64)>,
    center: TilePoint,
    side: i64,
    viewport: &Viewport,
    seen: &mut HashSet<TileAddress>,
) -> Vec<TileAddress> {
    let mut cells: Vec<(f64, i64, i64)> = cells
        .map(|(x, y)| {
            let dx = x as f64 + 0.5 - center.x;
            let dy = y as f64 + 0.5 - center.y;
            (dx * dx + dy * dy, x, y)
        })
        .collect();
    cells.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.2.cmp(&b.2)).then(a.1.cmp(&b.1)));

    cells
        .into_iter()
        .filter_map(|(_, x, y)| {
            TileAddress::new(
                x.rem_euclid(side) as u32,
                y as u32,
                viewport.zoom,
                viewport.source,
            )
            .ok()
        })
        .filter(|address| seen.insert(*address))
        .collect()
}
