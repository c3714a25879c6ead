// ============================================================================
// CPU TEXTURES — host-memory fallback when no adapter is available
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::texture::{TextureAllocator, TextureHandle, TextureKind};
use crate::error::{HeightmapError, Result};

/// Keeps texture bytes on the heap. Same lifecycle as the wgpu backend, so
/// headless runs and tests exercise identical bookkeeping.
pub struct CpuTextureAllocator {
    resident: Arc<AtomicUsize>,
    max_dim: u32,
}

struct CpuTexture {
    pixels: Vec<u8>,
    resident: Arc<AtomicUsize>,
}

impl TextureHandle for CpuTexture {
    fn destroy(&mut self) {
        self.resident.fetch_sub(self.pixels.len(), Ordering::Relaxed);
        self.pixels = Vec::new();
    }

    fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

impl CpuTextureAllocator {
    pub fn new() -> Self {
        Self::with_max_dimension(16_384)
    }

    pub fn with_max_dimension(max_dim: u32) -> Self {
        Self {
            resident: Arc::new(AtomicUsize::new(0)),
            max_dim,
        }
    }

    /// Bytes currently held by live textures.
    pub fn resident_bytes(&self) -> usize {
        self.resident.load(Ordering::Relaxed)
    }
}

impl Default for CpuTextureAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureAllocator for CpuTextureAllocator {
    fn allocate(&self, kind: TextureKind, width: u32, height: u32, data: &[u8]) -> Result<Box<dyn TextureHandle>> {
        let expected = width as usize * height as usize * kind.bytes_per_pixel();
        if data.len() != expected {
            return Err(HeightmapError::resource(format!(
                "{} upload is {} bytes, expected {}",
                kind.label(),
                data.len(),
                expected
            )));
        }
        self.resident.fetch_add(data.len(), Ordering::Relaxed);
        Ok(Box::new(CpuTexture {
            pixels: data.to_vec(),
            resident: self.resident.clone(),
        }))
    }

    fn max_dimension(&self) -> u32 {
        self.max_dim
    }

    fn backend_name(&self) -> &str {
        "cpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroy_returns_memory() {
        let alloc = CpuTextureAllocator::new();
        let mut tex = alloc.allocate(TextureKind::Displacement, 4, 4, &[0; 16]).unwrap();
        assert_eq!(alloc.resident_bytes(), 16);
        tex.destroy();
        assert_eq!(alloc.resident_bytes(), 0);
        assert_eq!(tex.byte_size(), 0);
    }

    #[test]
    fn wrong_length_upload_is_rejected() {
        let alloc = CpuTextureAllocator::new();
        assert!(alloc.allocate(TextureKind::Color, 2, 2, &[0; 4]).is_err());
        assert_eq!(alloc.resident_bytes(), 0);
    }
}
