// ============================================================================
// TERRAIN TEXTURES — backend-neutral handles + the wgpu backend
// ============================================================================

use std::sync::Arc;

use super::context::GpuContext;
use super::manager::ResourceStats;
use crate::error::{HeightmapError, Result};

/// What a texture is used for. Decides its pixel layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Artwork colors, RGBA8 sRGB.
    Color,
    /// Heightmap, single channel R8.
    Displacement,
}

impl TextureKind {
    pub const ALL: [TextureKind; 2] = [TextureKind::Color, TextureKind::Displacement];

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureKind::Color => 4,
            TextureKind::Displacement => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TextureKind::Color => "terrain color map",
            TextureKind::Displacement => "terrain displacement map",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            TextureKind::Color => 0,
            TextureKind::Displacement => 1,
        }
    }
}

/// Backend-specific texture memory.
pub trait TextureHandle: Send {
    /// Free the backing memory. Called at most once by [`TextureResource`].
    fn destroy(&mut self);

    /// Bytes of pixel storage held.
    fn byte_size(&self) -> usize;

    /// View for binding into a wgpu material, when this handle is GPU-resident.
    fn wgpu_view(&self) -> Option<&wgpu::TextureView> {
        None
    }
}

/// Something that can turn pixel bytes into a texture.
pub trait TextureAllocator: Send + Sync {
    /// `data` is laid out as `kind.bytes_per_pixel()` bytes per pixel,
    /// rows tightly packed.
    fn allocate(&self, kind: TextureKind, width: u32, height: u32, data: &[u8]) -> Result<Box<dyn TextureHandle>>;

    fn max_dimension(&self) -> u32;

    fn backend_name(&self) -> &str;
}

// ============================================================================
// OWNED TEXTURE RESOURCE
// ============================================================================

/// A live texture. Released exactly once: by an explicit [`release`] or,
/// failing that, on drop.
///
/// [`release`]: TextureResource::release
pub struct TextureResource {
    id: u64,
    kind: TextureKind,
    width: u32,
    height: u32,
    handle: Option<Box<dyn TextureHandle>>,
    stats: Arc<ResourceStats>,
}

impl TextureResource {
    pub(crate) fn new(
        id: u64,
        kind: TextureKind,
        width: u32,
        height: u32,
        handle: Box<dyn TextureHandle>,
        stats: Arc<ResourceStats>,
    ) -> Self {
        Self {
            id,
            kind,
            width,
            height,
            handle: Some(handle),
            stats,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    pub fn byte_size(&self) -> usize {
        self.handle.as_ref().map_or(0, |h| h.byte_size())
    }

    pub fn wgpu_view(&self) -> Option<&wgpu::TextureView> {
        self.handle.as_ref().and_then(|h| h.wgpu_view())
    }

    /// Free the texture. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.destroy();
            self.stats.record_release(self.kind);
            log::trace!("released {} #{}", self.kind.label(), self.id);
        }
    }
}

impl Drop for TextureResource {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for TextureResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureResource")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("released", &self.is_released())
            .finish()
    }
}

// ============================================================================
// WGPU BACKEND
// ============================================================================

struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bytes: usize,
}

impl TextureHandle for WgpuTexture {
    fn destroy(&mut self) {
        self.texture.destroy();
    }

    fn byte_size(&self) -> usize {
        self.bytes
    }

    fn wgpu_view(&self) -> Option<&wgpu::TextureView> {
        Some(&self.view)
    }
}

/// Allocates sampled textures on a [`GpuContext`] device.
pub struct WgpuTextureAllocator {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    max_texture_dim: u32,
}

impl WgpuTextureAllocator {
    pub fn new(ctx: &GpuContext) -> Self {
        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            adapter_name: ctx.adapter_name.clone(),
            max_texture_dim: ctx.max_texture_dim,
        }
    }

    fn format(kind: TextureKind) -> wgpu::TextureFormat {
        match kind {
            TextureKind::Color => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureKind::Displacement => wgpu::TextureFormat::R8Unorm,
        }
    }
}

impl TextureAllocator for WgpuTextureAllocator {
    fn allocate(&self, kind: TextureKind, width: u32, height: u32, data: &[u8]) -> Result<Box<dyn TextureHandle>> {
        let bpp = kind.bytes_per_pixel();
        if data.len() != width as usize * height as usize * bpp {
            return Err(HeightmapError::resource(format!(
                "{} upload is {} bytes, expected {}",
                kind.label(),
                data.len(),
                width as usize * height as usize * bpp
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(kind.label()),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::format(kind),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = validation.or(oom) {
            // Partially created textures still get torn down.
            texture.destroy();
            return Err(HeightmapError::resource(format!("{}: {}", kind.label(), err)));
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bpp as u32 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Box::new(WgpuTexture {
            texture,
            view,
            bytes: data.len(),
        }))
    }

    fn max_dimension(&self) -> u32 {
        self.max_texture_dim
    }

    fn backend_name(&self) -> &str {
        &self.adapter_name
    }
}
