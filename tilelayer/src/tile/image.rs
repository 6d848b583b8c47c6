//! Encoded tile image bytes.

use std::fmt;

use bytes::Bytes;
use image::ImageFormat;

/// Raster encodings the engine knows how to store and hand to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileEncoding {
    Png,
    Jpeg,
    WebP,
}

impl TileEncoding {
    /// All encodings, in fallback preference order.
    pub const ALL: [TileEncoding; 3] = [TileEncoding::Png, TileEncoding::Jpeg, TileEncoding::WebP];

    /// File extension used for cache files.
    pub fn extension(&self) -> &'static str {
        match self {
            TileEncoding::Png => "png",
            TileEncoding::Jpeg => "jpg",
            TileEncoding::WebP => "webp",
        }
    }

    /// Maps a cache file extension back to an encoding.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "png" => Some(TileEncoding::Png),
            "jpg" | "jpeg" => Some(TileEncoding::Jpeg),
            "webp" => Some(TileEncoding::WebP),
            _ => None,
        }
    }

    /// Detects the encoding from the leading magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match image::guess_format(data).ok()? {
            ImageFormat::Png => Some(TileEncoding::Png),
            ImageFormat::Jpeg => Some(TileEncoding::Jpeg),
            ImageFormat::WebP => Some(TileEncoding::WebP),
            _ => None,
        }
    }

    /// The matching `image` crate format.
    pub fn image_format(&self) -> ImageFormat {
        match self {
            TileEncoding::Png => ImageFormat::Png,
            TileEncoding::Jpeg => ImageFormat::Jpeg,
            TileEncoding::WebP => ImageFormat::WebP,
        }
    }
}

impl fmt::Display for TileEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An encoded (not yet decoded) tile image.
///
/// Backed by [`Bytes`], so clones share the underlying buffer. This is what
/// the cache stores and what tile load states carry to the renderer.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data: Bytes,
    encoding: TileEncoding,
}

impl EncodedImage {
    pub fn new(data: impl Into<Bytes>, encoding: TileEncoding) -> Self {
        Self {
            data: data.into(),
            encoding,
        }
    }

    /// Wraps raw bytes, detecting the encoding from their magic bytes.
    pub fn sniffed(data: impl Into<Bytes>) -> Option<Self> {
        let data = data.into();
        let encoding = TileEncoding::sniff(&data)?;
        Some(Self { data, encoding })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn encoding(&self) -> TileEncoding {
        self.encoding
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("encoding", &self.encoding)
            .field("len", &self.data.len())
            .finish()
    }
}
