// ============================================================================
// HEIGHTMAP PIPELINE — fixed stage order + encoding, inline or on rayon
// ============================================================================
//
// Stage order is Luminance → Contrast → Invert → Smoothing on one owned
// buffer. Background runs post their results through an mpsc channel which
// the host loop drains once per tick.
// ============================================================================

use std::sync::mpsc;
use std::time::Instant;

use crate::catalog::ArtworkId;
use crate::error::Result;
use crate::io::{self, EncodedRaster, SourceImage};
use crate::ops::adjustments::{CONTRAST_MAX, CONTRAST_MIN};
use crate::ops::{self, PixelBuffer};

/// Largest smoothing radius accepted, in pixels.
pub const MAX_SMOOTHING_RADIUS: f32 = 64.0;

/// One immutable snapshot of the heightmap controls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightmapParams {
    pub smoothing_radius: f32,
    pub contrast: f32,
    pub invert: bool,
}

impl HeightmapParams {
    /// Sanitising constructor: contrast is clamped into range, negative or
    /// non-finite radii become 0 and radii above [`MAX_SMOOTHING_RADIUS`]
    /// are clamped with a warning.
    pub fn new(smoothing_radius: f32, contrast: f32, invert: bool) -> Self {
        let smoothing_radius = if smoothing_radius.is_finite() {
            if smoothing_radius > MAX_SMOOTHING_RADIUS {
                log::warn!(
                    "smoothing radius {} clamped to {}",
                    smoothing_radius,
                    MAX_SMOOTHING_RADIUS
                );
            }
            smoothing_radius.clamp(0.0, MAX_SMOOTHING_RADIUS)
        } else {
            0.0
        };
        let contrast = if contrast.is_finite() {
            contrast.clamp(CONTRAST_MIN, CONTRAST_MAX)
        } else {
            0.0
        };
        Self {
            smoothing_radius,
            contrast,
            invert,
        }
    }
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self::new(0.0, 0.0, false)
    }
}

/// Run every stage in order on a fresh copy of `source`.
pub fn process(source: &SourceImage, params: HeightmapParams) -> Result<PixelBuffer> {
    let mut buf = PixelBuffer::from_source(source)?;
    ops::luminance(&mut buf);
    ops::contrast(&mut buf, params.contrast);
    ops::invert(&mut buf, params.invert);
    ops::smooth(&mut buf, params.smoothing_radius);
    Ok(buf)
}

/// Convert `source` into an encoded heightmap.
///
/// Fails with `Decode` when the source cannot become a pixel buffer and
/// `Encode` when PNG serialization fails. Never retries.
pub async fn generate_heightmap(source: &SourceImage, params: HeightmapParams) -> Result<EncodedRaster> {
    let start = Instant::now();
    let buf = process(source, params)?;
    let raster = io::encode_png(&buf)?;
    log::debug!(
        "heightmap {}x{} ({:?}) generated in {:.1}ms, {} bytes",
        raster.width(),
        raster.height(),
        params,
        start.elapsed().as_secs_f64() * 1000.0,
        raster.as_bytes().len()
    );
    Ok(raster)
}

/// Drive [`generate_heightmap`] to completion on the current thread.
pub fn generate_heightmap_blocking(source: &SourceImage, params: HeightmapParams) -> Result<EncodedRaster> {
    pollster::block_on(generate_heightmap(source, params))
}

// ============================================================================
// BACKGROUND JOBS
// ============================================================================

/// A queued regeneration for one artwork.
#[derive(Clone, Debug)]
pub struct HeightmapRequest {
    pub sequence: u64,
    pub artwork: ArtworkId,
    pub source: SourceImage,
    pub params: HeightmapParams,
}

/// Completed run, successful or not. Carries its sequence so the consumer
/// can discard stale completions.
#[derive(Debug)]
pub struct HeightmapResult {
    pub sequence: u64,
    pub artwork: ArtworkId,
    pub params: HeightmapParams,
    pub raster: Result<EncodedRaster>,
}

/// Runs pipeline requests on the rayon pool; results are collected with
/// [`HeightmapJobs::drain`] from the host loop.
pub struct HeightmapJobs {
    sender: mpsc::Sender<HeightmapResult>,
    receiver: mpsc::Receiver<HeightmapResult>,
    in_flight: usize,
}

impl HeightmapJobs {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            in_flight: 0,
        }
    }

    /// Start a run and return immediately.
    pub fn submit(&mut self, request: HeightmapRequest) {
        let sender = self.sender.clone();
        self.in_flight += 1;
        rayon::spawn(move || {
            let raster = generate_heightmap_blocking(&request.source, request.params);
            // Receiver gone means the owner shut down; nothing to report to.
            let _ = sender.send(HeightmapResult {
                sequence: request.sequence,
                artwork: request.artwork,
                params: request.params,
                raster,
            });
        });
    }

    /// All results that have completed since the last call, in completion
    /// order. Never blocks.
    pub fn drain(&mut self) -> Vec<HeightmapResult> {
        let mut done = Vec::new();
        while let Ok(result) = self.receiver.try_recv() {
            done.push(result);
        }
        self.in_flight = self.in_flight.saturating_sub(done.len());
        done
    }

    /// Block until every submitted run has reported back.
    pub fn wait_all(&mut self) -> Vec<HeightmapResult> {
        let mut done = self.drain();
        while self.in_flight > 0 {
            match self.receiver.recv() {
                Ok(result) => {
                    self.in_flight -= 1;
                    done.push(result);
                }
                Err(_) => break,
            }
        }
        done
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Default for HeightmapJobs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HeightmapError;
    use image::RgbaImage;

    fn gradient(w: u32, h: u32) -> SourceImage {
        let img = RgbaImage::from_fn(w, h, |x, y| {
            image::Rgba([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 90, 255])
        });
        SourceImage::from_rgba(img)
    }

    #[test]
    fn params_are_sanitised() {
        let p = HeightmapParams::new(-4.0, 900.0, true);
        assert_eq!(p.smoothing_radius, 0.0);
        assert_eq!(p.contrast, CONTRAST_MAX);
        let p = HeightmapParams::new(f32::NAN, f32::INFINITY, false);
        assert_eq!(p, HeightmapParams::default());
        assert_eq!(HeightmapParams::new(500.0, 0.0, false).smoothing_radius, MAX_SMOOTHING_RADIUS);
    }

    #[test]
    fn stages_run_in_fixed_order() {
        // red → 76 → contrast 0 → inverted 179, no blur
        let src = SourceImage::from_rgba(RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255])));
        let buf = process(&src, HeightmapParams::new(0.0, 0.0, true)).unwrap();
        assert_eq!(buf.pixel(1, 1), [179, 179, 179, 255]);
    }

    #[test]
    fn identical_inputs_give_identical_bytes() {
        let src = gradient(40, 25);
        let params = HeightmapParams::new(2.5, 35.0, true);
        let a = generate_heightmap_blocking(&src, params).unwrap();
        let b = generate_heightmap_blocking(&src, params).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_params_give_a_new_raster() {
        let src = gradient(16, 16);
        let a = generate_heightmap_blocking(&src, HeightmapParams::default()).unwrap();
        let b = generate_heightmap_blocking(&src, HeightmapParams::new(0.0, 0.0, true)).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn zero_sized_source_fails_with_decode() {
        let src = SourceImage::from_rgba(RgbaImage::new(0, 0));
        let err = generate_heightmap_blocking(&src, HeightmapParams::default()).unwrap_err();
        assert!(matches!(err, HeightmapError::Decode(_)));
    }

    #[test]
    fn background_jobs_report_every_submission() {
        let mut jobs = HeightmapJobs::new();
        let src = gradient(8, 8);
        for seq in 1..=3 {
            jobs.submit(HeightmapRequest {
                sequence: seq,
                artwork: ArtworkId::new("a"),
                source: src.clone(),
                params: HeightmapParams::new(seq as f32, 0.0, false),
            });
        }
        let mut seqs: Vec<u64> = jobs.wait_all().into_iter().map(|r| r.sequence).collect();
        seqs.sort();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(jobs.in_flight(), 0);
    }
}
