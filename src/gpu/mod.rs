// ============================================================================
// GPU MODULE — terrain texture ownership
// ============================================================================
//
// Architecture:
//   context.rs — wgpu Device, Queue, adapter init
//   texture.rs — backend-neutral TextureResource + wgpu allocator
//   cpu.rs     — host-memory allocator for headless runs
//   manager.rs — TextureManager, DisplacementResource, lifetime counters
// ============================================================================

pub mod context;
pub mod cpu;
pub mod manager;
pub mod texture;

pub use context::GpuContext;
pub use cpu::CpuTextureAllocator;
pub use manager::{DisplacementResource, ResourceStats, TextureManager};
pub use texture::{TextureAllocator, TextureHandle, TextureKind, TextureResource, WgpuTextureAllocator};
