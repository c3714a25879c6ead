//! ArtRelief — turns artwork images into displaced terrain.
//!
//! The heart of the crate is [`pipeline::generate_heightmap`] (luminance →
//! contrast → invert → smoothing → PNG) and [`terrain::TerrainSurface`], which
//! owns the color and displacement textures of one terrain mesh and swaps
//! them without leaking GPU memory.

pub mod catalog;
pub mod cli;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod io;
pub mod logger;
pub mod ops;
pub mod pipeline;
pub mod settings;
pub mod terrain;

pub use error::HeightmapError;
pub use io::{EncodedRaster, SourceImage};
pub use pipeline::{HeightmapParams, generate_heightmap};
pub use terrain::TerrainSurface;
