// ============================================================================
// IMAGE I/O — source decoding and heightmap raster encoding
// ============================================================================

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};

use crate::error::{HeightmapError, Result};
use crate::ops::PixelBuffer;

/// Maximum accepted source dimension in pixels (per axis).
/// Guards against decompression bombs from remote catalogs.
const MAX_SOURCE_DIM: u32 = 16_384;

// ============================================================================
// SOURCE IMAGE
// ============================================================================

/// Decoded, read-only color image. Cheap to share between pipeline runs.
#[derive(Clone, Debug)]
pub struct SourceImage {
    image: Arc<RgbaImage>,
}

impl SourceImage {
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// True when both hold the same pixels. Clones of one image compare
    /// without touching the pixel data.
    pub fn same_pixels(&self, other: &SourceImage) -> bool {
        Arc::ptr_eq(&self.image, &other.image) || *self.image == *other.image
    }

    /// Downscale to `max_width` keeping the aspect ratio, the way the image
    /// service answers a `{width},` request. Narrower images are returned
    /// unchanged.
    pub fn limit_width(&self, max_width: u32) -> SourceImage {
        if max_width == 0 || self.width() <= max_width {
            return self.clone();
        }
        let height = ((self.height() as u64 * max_width as u64) / self.width() as u64).max(1) as u32;
        let resized = image::imageops::resize(self.image(), max_width, height, image::imageops::FilterType::Triangle);
        SourceImage::from_rgba(resized)
    }
}

/// Decode fetched bytes (JPEG, PNG, WEBP, ...) into a [`SourceImage`].
pub fn decode_source(bytes: &[u8]) -> Result<SourceImage> {
    if bytes.is_empty() {
        return Err(HeightmapError::decode("empty image payload"));
    }
    let img = image::load_from_memory(bytes)
        .map_err(|e| HeightmapError::decode(e.to_string()))?
        .to_rgba8();
    validate_dimensions(img.width(), img.height())?;
    Ok(SourceImage::from_rgba(img))
}

/// Synchronously load a source image from disk.
pub fn load_source(path: &Path) -> Result<SourceImage> {
    let img = image::open(path)
        .map_err(|e| HeightmapError::decode(format!("{}: {}", path.display(), e)))?
        .to_rgba8();
    validate_dimensions(img.width(), img.height())?;
    Ok(SourceImage::from_rgba(img))
}

fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(HeightmapError::decode("source image has zero dimensions"));
    }
    if width > MAX_SOURCE_DIM || height > MAX_SOURCE_DIM {
        return Err(HeightmapError::decode(format!(
            "source image {}x{} exceeds {} px limit",
            width, height, MAX_SOURCE_DIM
        )));
    }
    Ok(())
}

// ============================================================================
// ENCODED RASTER
// ============================================================================

/// Final PNG-encoded heightmap. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedRaster {
    width: u32,
    height: u32,
    png: Vec<u8>,
}

impl EncodedRaster {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.png
    }

    /// `data:image/png;base64,...` form, usable directly as a texture URL.
    pub fn to_data_uri(&self) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(&self.png))
    }

    /// Decode back into pixels for texture upload.
    pub fn decode(&self) -> Result<RgbaImage> {
        let img = image::load_from_memory_with_format(&self.png, image::ImageFormat::Png)
            .map_err(|e| HeightmapError::decode(format!("heightmap raster: {}", e)))?
            .to_rgba8();
        if img.width() != self.width || img.height() != self.height {
            return Err(HeightmapError::decode(format!(
                "heightmap raster is {}x{}, expected {}x{}",
                img.width(),
                img.height(),
                self.width,
                self.height
            )));
        }
        Ok(img)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| HeightmapError::encode(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&self.png)
            .and_then(|_| writer.flush())
            .map_err(|e| HeightmapError::encode(e.to_string()))
    }
}

/// Serialize a finished buffer as PNG. Output is byte-identical for
/// identical input.
pub fn encode_png(buf: &PixelBuffer) -> Result<EncodedRaster> {
    if buf.is_empty() {
        return Err(HeightmapError::encode("cannot encode an empty buffer"));
    }
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(buf.as_raw(), buf.width(), buf.height(), image::ColorType::Rgba8)
        .map_err(|e| HeightmapError::encode(e.to_string()))?;
    Ok(EncodedRaster {
        width: buf.width(),
        height: buf.height(),
        png,
    })
}
