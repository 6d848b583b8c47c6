//! Image format support and transcoding.
//!
//! Sources may serve encodings the consumer cannot display. Support is
//! probed once at startup and carried in the fetcher config; a tile in an
//! unsupported encoding is decoded and re-encoded to the fallback before it
//! leaves the fetcher.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;

use super::error::FetchError;
use crate::tile::{EncodedImage, TileEncoding};

/// Which tile encodings the consumer can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSupport {
    png: bool,
    jpeg: bool,
    webp: bool,
}

impl FormatSupport {
    /// Every encoding supported.
    pub fn all() -> Self {
        Self {
            png: true,
            jpeg: true,
            webp: true,
        }
    }

    /// Only the listed encodings supported.
    pub fn only(encodings: &[TileEncoding]) -> Self {
        let mut support = Self {
            png: false,
            jpeg: false,
            webp: false,
        };
        for encoding in encodings {
            support.set(*encoding, true);
        }
        support
    }

    /// Probes the image codecs compiled into this build.
    pub fn probe() -> Self {
        let mut support = Self::only(&[]);
        for encoding in TileEncoding::ALL {
            support.set(encoding, encoding.image_format().reading_enabled());
        }
        support
    }

    pub fn supports(&self, encoding: TileEncoding) -> bool {
        match encoding {
            TileEncoding::Png => self.png,
            TileEncoding::Jpeg => self.jpeg,
            TileEncoding::WebP => self.webp,
        }
    }

    fn set(&mut self, encoding: TileEncoding, enabled: bool) {
        match encoding {
            TileEncoding::Png => self.png = enabled,
            TileEncoding::Jpeg => self.jpeg = enabled,
            TileEncoding::WebP => self.webp = enabled,
        }
    }
}

impl Default for FormatSupport {
    fn default() -> Self {
        Self::probe()
    }
}

/// Decodes `image` and re-encodes it as `target`.
///
/// CPU bound: call from `spawn_blocking`.
pub fn transcode(
    image: &EncodedImage,
    target: TileEncoding,
    jpeg_quality: u8,
) -> Result<EncodedImage, FetchError> {
    let decoded = image::load_from_memory_with_format(
        image.data(),
        image.encoding().image_format(),
    )
    .map_err(|e| FetchError::Decode(format!("{} body: {}", image.encoding(), e)))?;

    let mut buffer = Vec::with_capacity(image.len());
    match target {
        TileEncoding::Jpeg => {
            // JPEG has no alpha channel
            let rgb = decoded.to_rgb8();
            JpegEncoder::new_with_quality(&mut buffer, jpeg_quality.clamp(1, 100))
                .encode_image(&rgb)
                .map_err(|e| FetchError::Decode(format!("JPEG encode: {}", e)))?;
        }
        TileEncoding::Png | TileEncoding::WebP => {
            let format: ImageFormat = target.image_format();
            decoded
                .write_to(&mut Cursor::new(&mut buffer), format)
                .map_err(|e| FetchError::Decode(format!("{} encode: {}", target, e)))?;
        }
    }

    Ok(EncodedImage::new(buffer, target))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    /// A small valid JPEG.
    pub(crate) fn sample_jpeg() -> Vec<u8> {
        let img = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 128]));
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, 90)
            .encode_image(&img)
            .unwrap();
        buffer
    }

    /// A small valid PNG.
    pub(crate) fn sample_png() -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, Rgb([10, 200, 30]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_probe_finds_default_codecs() {
        let support = FormatSupport::probe();
        assert!(support.supports(TileEncoding::Png));
        assert!(support.supports(TileEncoding::Jpeg));
    }

    #[test]
    fn test_only() {
        let support = FormatSupport::only(&[TileEncoding::Png]);
        assert!(support.supports(TileEncoding::Png));
        assert!(!support.supports(TileEncoding::Jpeg));
        assert!(!support.supports(TileEncoding::WebP));
    }

    #[test]
    fn test_transcode_jpeg_to_png() {
        let jpeg = EncodedImage::new(sample_jpeg(), TileEncoding::Jpeg);
        let png = transcode(&jpeg, TileEncoding::Png, 85).unwrap();
        assert_eq!(png.encoding(), TileEncoding::Png);
        assert_eq!(TileEncoding::sniff(png.data()), Some(TileEncoding::Png));
    }

    #[test]
    fn test_transcode_png_to_jpeg() {
        let png = EncodedImage::new(sample_png(), TileEncoding::Png);
        let jpeg = transcode(&png, TileEncoding::Jpeg, 70).unwrap();
        assert_eq!(TileEncoding::sniff(jpeg.data()), Some(TileEncoding::Jpeg));
    }

    #[test]
    fn test_transcode_garbage_is_decode_error() {
        let bogus = EncodedImage::new(vec![0xFF, 0xD8, 0xFF, 0x00], TileEncoding::Jpeg);
        assert!(matches!(
            transcode(&bogus, TileEncoding::Png, 85),
            Err(FetchError::Decode(_))
        ));
    }
}
