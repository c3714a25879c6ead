// ============================================================================
// HEIGHTMAP OPERATIONS — CPU pixel stages
// ============================================================================
//
//   pixel_buffer.rs — owned RGBA8 working buffer
//   adjustments.rs  — luminance, contrast, invert
//   filters.rs      — Gaussian smoothing
// ============================================================================

pub mod adjustments;
pub mod filters;
pub mod pixel_buffer;

pub use adjustments::{contrast, invert, luminance};
pub use filters::smooth;
pub use pixel_buffer::PixelBuffer;
