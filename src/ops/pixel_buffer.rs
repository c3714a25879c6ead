// ============================================================================
// PIXEL BUFFER — mutable RGBA8 working copy owned by one pipeline run
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::error::{HeightmapError, Result};
use crate::io::SourceImage;

/// Interleaved RGBA8 samples. Three-channel sources are expanded with an
/// opaque alpha on load, so every stage can assume a stride of 4.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Fresh working copy of a decoded source.
    pub fn from_source(source: &SourceImage) -> Result<Self> {
        if source.width() == 0 || source.height() == 0 {
            return Err(HeightmapError::decode("source image has zero dimensions"));
        }
        Ok(Self {
            image: source.image().clone(),
        })
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Build from raw RGBA bytes. Returns `None` when the length does not
    /// match `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, data).map(|image| Self { image })
    }

    /// Solid fill, mostly useful for tests and placeholders.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, image::Rgba(rgba)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Sum of every R, G and B sample. Alpha is excluded.
    pub fn color_energy(&self) -> u64 {
        self.image
            .as_raw()
            .chunks_exact(4)
            .map(|px| px[0] as u64 + px[1] as u64 + px[2] as u64)
            .sum()
    }

    /// Single-channel view of the red channel, which after the luminance
    /// stage carries the height value.
    pub fn height_samples(&self) -> Vec<u8> {
        self.image.as_raw().chunks_exact(4).map(|px| px[0]).collect()
    }

    /// Run `f` over every pixel's `[r, g, b, a]` in place, parallel by row.
    pub(crate) fn for_each_pixel_mut<F>(&mut self, f: F)
    where
        F: Fn(&mut [u8]) + Sync,
    {
        if self.is_empty() {
            return;
        }
        let stride = self.image.width() as usize * 4;
        let raw: &mut [u8] = &mut self.image;
        raw.par_chunks_mut(stride).for_each(|row| {
            for px in row.chunks_exact_mut(4) {
                f(px);
            }
        });
    }

    /// Apply a 256-entry lookup table to R, G and B.
    pub(crate) fn apply_color_lut(&mut self, lut: &[u8; 256]) {
        self.for_each_pixel_mut(|px| {
            px[0] = lut[px[0] as usize];
            px[1] = lut[px[1] as usize];
            px[2] = lut[px[2] as usize];
        });
    }
}
