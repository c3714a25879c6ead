// ============================================================================
// TEXTURE MANAGER — builds terrain textures and tracks their lifetimes
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::context::GpuContext;
use super::cpu::CpuTextureAllocator;
use super::texture::{TextureAllocator, TextureKind, TextureResource, WgpuTextureAllocator};
use crate::error::{HeightmapError, Result};
use crate::io::{EncodedRaster, SourceImage};
use crate::ops::PixelBuffer;

/// Build and release counters, per texture kind.
#[derive(Debug, Default)]
pub struct ResourceStats {
    built: [AtomicU64; 2],
    released: [AtomicU64; 2],
}

impl ResourceStats {
    pub(crate) fn record_build(&self, kind: TextureKind) {
        self.built[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self, kind: TextureKind) {
        self.released[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn built(&self, kind: TextureKind) -> u64 {
        self.built[kind.index()].load(Ordering::Relaxed)
    }

    pub fn released(&self, kind: TextureKind) -> u64 {
        self.released[kind.index()].load(Ordering::Relaxed)
    }

    /// Textures of `kind` allocated and not yet released.
    pub fn live(&self, kind: TextureKind) -> u64 {
        self.built(kind).saturating_sub(self.released(kind))
    }
}

/// Heightmap texture plus the sequence number of the run that produced it.
/// Keeps a host copy of the uploaded samples for CPU-side displacement.
#[derive(Debug)]
pub struct DisplacementResource {
    texture: TextureResource,
    sequence: u64,
    heights: Vec<u8>,
}

impl DisplacementResource {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Row-major height samples, `width * height` bytes.
    pub fn heights(&self) -> &[u8] {
        &self.heights
    }

    pub fn texture(&self) -> &TextureResource {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn is_released(&self) -> bool {
        self.texture.is_released()
    }

    /// Idempotent.
    pub fn release(&mut self) {
        self.texture.release();
    }
}

/// Front door for texture allocation. Cheap to clone; clones share the
/// backend and the counters.
#[derive(Clone)]
pub struct TextureManager {
    allocator: Arc<dyn TextureAllocator>,
    stats: Arc<ResourceStats>,
    next_id: Arc<AtomicU64>,
}

impl TextureManager {
    pub fn new(allocator: Arc<dyn TextureAllocator>) -> Self {
        Self {
            allocator,
            stats: Arc::new(ResourceStats::default()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Host-memory textures.
    pub fn headless() -> Self {
        Self::new(Arc::new(CpuTextureAllocator::new()))
    }

    /// wgpu textures when a context exists, host memory otherwise.
    pub fn for_context(ctx: Option<&GpuContext>) -> Self {
        match ctx {
            Some(ctx) => Self::new(Arc::new(WgpuTextureAllocator::new(ctx))),
            None => {
                log::info!("no GPU context, keeping terrain textures in host memory");
                Self::headless()
            }
        }
    }

    pub fn stats(&self) -> &ResourceStats {
        &self.stats
    }

    pub fn backend_name(&self) -> &str {
        self.allocator.backend_name()
    }

    /// Upload the artwork colors.
    pub fn build_color(&self, source: &SourceImage) -> Result<TextureResource> {
        let img = source.image();
        self.allocate(TextureKind::Color, img.width(), img.height(), img.as_raw())
    }

    /// Decode `raster` and upload its height channel.
    pub fn build_displacement(&self, raster: &EncodedRaster, sequence: u64) -> Result<DisplacementResource> {
        let buf = PixelBuffer::from_rgba_image(raster.decode()?);
        let heights = buf.height_samples();
        let texture = self.allocate(TextureKind::Displacement, buf.width(), buf.height(), &heights)?;
        Ok(DisplacementResource {
            texture,
            sequence,
            heights,
        })
    }

    fn allocate(&self, kind: TextureKind, width: u32, height: u32, data: &[u8]) -> Result<TextureResource> {
        let max = self.allocator.max_dimension();
        if width == 0 || height == 0 || width > max || height > max {
            return Err(HeightmapError::resource(format!(
                "{} of {}x{} not supported (max {})",
                kind.label(),
                width,
                height,
                max
            )));
        }
        let handle = self.allocator.allocate(kind, width, height, data)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.stats.record_build(kind);
        log::trace!("built {} #{} ({}x{})", kind.label(), id, width, height);
        Ok(TextureResource::new(id, kind, width, height, handle, self.stats.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::encode_png;
    use crate::ops::PixelBuffer;

    fn raster(w: u32, h: u32, v: u8) -> EncodedRaster {
        encode_png(&PixelBuffer::filled(w, h, [v, v, v, 255])).unwrap()
    }

    #[test]
    fn release_is_idempotent_and_counted_once() {
        let mgr = TextureManager::headless();
        let mut res = mgr.build_displacement(&raster(3, 3, 10), 1).unwrap();
        assert_eq!(mgr.stats().live(TextureKind::Displacement), 1);
        res.release();
        res.release();
        assert!(res.is_released());
        drop(res);
        assert_eq!(mgr.stats().released(TextureKind::Displacement), 1);
        assert_eq!(mgr.stats().live(TextureKind::Displacement), 0);
    }

    #[test]
    fn drop_releases() {
        let mgr = TextureManager::headless();
        {
            let _res = mgr.build_displacement(&raster(2, 2, 0), 7).unwrap();
        }
        assert_eq!(mgr.stats().built(TextureKind::Displacement), 1);
        assert_eq!(mgr.stats().live(TextureKind::Displacement), 0);
    }

    #[test]
    fn displacement_is_single_channel() {
        let mgr = TextureManager::headless();
        let res = mgr.build_displacement(&raster(5, 4, 200), 1).unwrap();
        assert_eq!(res.texture().byte_size(), 20);
        assert_eq!(res.sequence(), 1);
        assert_eq!(res.heights(), &[200u8; 20][..]);
    }

    #[test]
    fn oversize_texture_is_a_resource_error() {
        let mgr = TextureManager::new(Arc::new(CpuTextureAllocator::with_max_dimension(4)));
        let err = mgr.build_displacement(&raster(5, 2, 0), 1).unwrap_err();
        assert!(matches!(err, HeightmapError::Resource(_)));
        assert_eq!(mgr.stats().built(TextureKind::Displacement), 0);
    }
}
