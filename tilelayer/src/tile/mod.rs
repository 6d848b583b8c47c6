//! Tile addressing and encoded tile images.
//!
//! A [`TileAddress`] identifies one raster tile of one [`SourceKind`]. Its
//! canonical string form (`"{source}_{zoom}_{column}_{row}"`) doubles as the
//! cache key and the on-disk filename stem, so the format is load-bearing.

mod address;
mod image;

pub use address::{
    parse_cache_filename, tiles_per_side, AddressError, AncestorRegion, SourceKind, TileAddress,
    MAX_ZOOM,
};
pub use image::{EncodedImage, TileEncoding};
