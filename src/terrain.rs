// ============================================================================
// TERRAIN SURFACE — displaced plane, its material, and heightmap rebinding
// ============================================================================
//
// The surface is the single writer of its material bindings. Renderers
// borrow `material()` once per frame; because rebinding takes `&mut self`,
// a superseded texture can never be released while a frame still reads it.
// ============================================================================

use crate::catalog::ArtworkId;
use crate::error::{HeightmapError, Result};
use crate::geometry::PlaneGeometry;
use crate::gpu::{DisplacementResource, TextureManager, TextureResource};
use crate::io::{EncodedRaster, SourceImage};
use crate::pipeline::{self, HeightmapJobs, HeightmapParams, HeightmapRequest, HeightmapResult};

pub const DISPLACEMENT_SCALE_MIN: f32 = -2.0;
pub const DISPLACEMENT_SCALE_MAX: f32 = 2.0;
pub const DEFAULT_DISPLACEMENT_SCALE: f32 = -0.75;
pub const DEFAULT_PLANE_SIZE: f32 = 10.0;
pub const DEFAULT_SEGMENTS: u32 = 128;

/// Material parameters and texture bindings read by the renderer.
#[derive(Debug)]
pub struct TerrainMaterial {
    color_map: Option<TextureResource>,
    displacement_map: Option<DisplacementResource>,
    pub displacement_scale: f32,
    pub metalness: f32,
    pub roughness: f32,
}

impl TerrainMaterial {
    pub fn color_map(&self) -> Option<&TextureResource> {
        self.color_map.as_ref()
    }

    pub fn displacement_map(&self) -> Option<&DisplacementResource> {
        self.displacement_map.as_ref()
    }
}

impl Default for TerrainMaterial {
    fn default() -> Self {
        Self {
            color_map: None,
            displacement_map: None,
            displacement_scale: DEFAULT_DISPLACEMENT_SCALE,
            metalness: 0.0,
            roughness: 1.0,
        }
    }
}

/// What [`TerrainSurface::accept`] did with a completed run.
#[derive(Debug)]
pub enum AcceptOutcome {
    Bound { sequence: u64 },
    Stale { sequence: u64, applied: u64 },
    WrongArtwork { sequence: u64 },
    Failed { sequence: u64, error: HeightmapError },
}

pub struct TerrainSurface {
    geometry: PlaneGeometry,
    material: TerrainMaterial,
    textures: TextureManager,
    artwork: Option<ArtworkId>,
    source: Option<SourceImage>,
    next_sequence: u64,
    applied_sequence: u64,
}

impl TerrainSurface {
    pub fn new(textures: TextureManager) -> Self {
        Self::with_geometry(textures, PlaneGeometry::new(DEFAULT_PLANE_SIZE, DEFAULT_SEGMENTS))
    }

    pub fn with_geometry(textures: TextureManager, geometry: PlaneGeometry) -> Self {
        Self {
            geometry,
            material: TerrainMaterial::default(),
            textures,
            artwork: None,
            source: None,
            next_sequence: 0,
            applied_sequence: 0,
        }
    }

    pub fn geometry(&self) -> &PlaneGeometry {
        &self.geometry
    }

    pub fn material(&self) -> &TerrainMaterial {
        &self.material
    }

    pub fn artwork(&self) -> Option<&ArtworkId> {
        self.artwork.as_ref()
    }

    pub fn applied_sequence(&self) -> u64 {
        self.applied_sequence
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    // ------------------------------------------------------------------
    // Material-only updates
    // ------------------------------------------------------------------

    /// Pure material mutation; the heightmap is not regenerated.
    pub fn set_displacement_scale(&mut self, scale: f32) {
        if scale.is_finite() {
            self.material.displacement_scale = scale.clamp(DISPLACEMENT_SCALE_MIN, DISPLACEMENT_SCALE_MAX);
        }
    }

    pub fn set_metalness(&mut self, metalness: f32) {
        if metalness.is_finite() {
            self.material.metalness = metalness.clamp(0.0, 1.0);
        }
    }

    pub fn set_roughness(&mut self, roughness: f32) {
        if roughness.is_finite() {
            self.material.roughness = roughness.clamp(0.0, 1.0);
        }
    }

    // ------------------------------------------------------------------
    // Artwork changes
    // ------------------------------------------------------------------

    /// Switch to a new artwork: rebuild the color map and drop the old
    /// heightmap. Does nothing when `artwork` is already current with the
    /// same pixels; a changed source under the same id counts as a switch.
    ///
    /// On failure the surface keeps its previous artwork and bindings.
    pub fn set_artwork(&mut self, artwork: ArtworkId, source: SourceImage) -> Result<()> {
        let unchanged = self.artwork.as_ref() == Some(&artwork)
            && self.source.as_ref().is_some_and(|current| current.same_pixels(&source));
        if unchanged {
            return Ok(());
        }
        let color = self.textures.build_color(&source)?;
        log::info!(
            "artwork {} ({}x{}) on {}",
            artwork,
            source.width(),
            source.height(),
            self.textures.backend_name()
        );
        // Old color map is released by the replacement.
        self.material.color_map = Some(color);
        self.clear_displacement();
        self.artwork = Some(artwork);
        self.source = Some(source);
        // Results still in flight for the previous artwork carry older
        // sequence numbers and a different id; both checks reject them.
        self.applied_sequence = self.next_sequence;
        Ok(())
    }

    fn clear_displacement(&mut self) {
        if let Some(mut old) = self.material.displacement_map.take() {
            old.release();
        }
    }

    // ------------------------------------------------------------------
    // Synchronous regenerate-and-rebind
    // ------------------------------------------------------------------

    /// Integration entry point: make the surface show `artwork` through a
    /// heightmap generated with `params`.
    ///
    /// Any failure leaves the last good heightmap bound and is returned.
    pub fn apply_to_surface(
        &mut self,
        artwork: ArtworkId,
        source: &SourceImage,
        params: HeightmapParams,
        displacement_scale: f32,
    ) -> Result<()> {
        self.set_artwork(artwork.clone(), source.clone()).inspect_err(|e| {
            log::error!("artwork {} could not be applied: {}", artwork, e);
        })?;
        self.set_displacement_scale(displacement_scale);

        let raster = pipeline::generate_heightmap_blocking(source, params).inspect_err(|e| {
            log::error!("heightmap for {} failed: {}", artwork, e);
        })?;
        self.apply_raster(&raster)
            .inspect_err(|e| {
                log::error!("heightmap for {} not bound: {}", artwork, e);
            })
            .map(|_| ())
    }

    /// Bind an already generated raster as the newest heightmap and return
    /// the sequence it was given.
    pub fn apply_raster(&mut self, raster: &EncodedRaster) -> Result<u64> {
        let sequence = self.issue_sequence();
        self.bind(sequence, raster)?;
        Ok(sequence)
    }

    fn issue_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    /// Build a texture from `raster` and make it current, releasing the
    /// previous binding. A failed build changes nothing.
    fn bind(&mut self, sequence: u64, raster: &EncodedRaster) -> Result<()> {
        let resource = self.textures.build_displacement(raster, sequence)?;
        if let Some(mut old) = self.material.displacement_map.replace(resource) {
            old.release();
        }
        self.applied_sequence = sequence;
        log::debug!("bound heightmap #{} ({}x{})", sequence, raster.width(), raster.height());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Background regenerate-and-rebind
    // ------------------------------------------------------------------

    /// Queue a regeneration for the current artwork and return its sequence.
    /// Returns `None` when no artwork is set.
    pub fn submit_params(&mut self, jobs: &mut HeightmapJobs, params: HeightmapParams) -> Option<u64> {
        let artwork = self.artwork.clone()?;
        let source = self.source.clone()?;
        let sequence = self.issue_sequence();
        jobs.submit(HeightmapRequest {
            sequence,
            artwork,
            source,
            params,
        });
        Some(sequence)
    }

    /// Feed one completed run. Binds it when it is newer than what is shown
    /// and belongs to the current artwork; otherwise it is dropped before
    /// any texture is allocated.
    pub fn accept(&mut self, result: HeightmapResult) -> AcceptOutcome {
        let sequence = result.sequence;
        if self.artwork.as_ref() != Some(&result.artwork) {
            log::debug!("dropping heightmap #{} for old artwork {}", sequence, result.artwork);
            return AcceptOutcome::WrongArtwork { sequence };
        }
        if sequence <= self.applied_sequence {
            log::debug!("dropping stale heightmap #{} (showing #{})", sequence, self.applied_sequence);
            return AcceptOutcome::Stale {
                sequence,
                applied: self.applied_sequence,
            };
        }
        let bound = result.raster.and_then(|raster| self.bind(sequence, &raster));
        match bound {
            Ok(()) => AcceptOutcome::Bound { sequence },
            Err(error) => {
                log::warn!("heightmap #{} not applied: {}", sequence, error);
                AcceptOutcome::Failed { sequence, error }
            }
        }
    }

    /// Drain finished runs and apply them in completion order. Returns how
    /// many were bound.
    pub fn poll(&mut self, jobs: &mut HeightmapJobs) -> usize {
        jobs.drain()
            .into_iter()
            .map(|result| self.accept(result))
            .filter(|outcome| matches!(outcome, AcceptOutcome::Bound { .. }))
            .count()
    }

    // ------------------------------------------------------------------
    // CPU-side view of the displaced mesh
    // ------------------------------------------------------------------

    /// Vertex positions as the renderer would displace them right now.
    pub fn displaced_positions(&self) -> Vec<[f32; 3]> {
        match &self.material.displacement_map {
            Some(map) => self.geometry.displaced_positions(
                map.heights(),
                map.width(),
                map.height(),
                self.material.displacement_scale,
            ),
            None => self.geometry.vertices().iter().map(|v| v.position).collect(),
        }
    }

    /// Release every texture and forget the artwork.
    pub fn clear(&mut self) {
        self.clear_displacement();
        if let Some(mut color) = self.material.color_map.take() {
            color.release();
        }
        self.artwork = None;
        self.source = None;
        self.applied_sequence = self.next_sequence;
    }
}

impl Drop for TerrainSurface {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TextureKind;
    use image::RgbaImage;

    fn source(v: u8) -> SourceImage {
        SourceImage::from_rgba(RgbaImage::from_fn(6, 6, |x, y| {
            image::Rgba([v.wrapping_add((x * 20) as u8), (y * 30) as u8, 40, 255])
        }))
    }

    fn surface() -> TerrainSurface {
        TerrainSurface::with_geometry(TextureManager::headless(), PlaneGeometry::new(1.0, 4))
    }

    #[test]
    fn scale_change_does_not_rebuild() {
        let mut s = surface();
        let src = source(0);
        s.apply_to_surface(ArtworkId::new("a"), &src, HeightmapParams::default(), -0.75)
            .unwrap();
        let built = s.textures().stats().built(TextureKind::Displacement);
        s.set_displacement_scale(1.5);
        assert_eq!(s.material().displacement_scale, 1.5);
        assert_eq!(s.textures().stats().built(TextureKind::Displacement), built);
        s.set_displacement_scale(9.0);
        assert_eq!(s.material().displacement_scale, DISPLACEMENT_SCALE_MAX);
    }

    #[test]
    fn params_change_keeps_color_map() {
        let mut s = surface();
        let src = source(0);
        s.apply_to_surface(ArtworkId::new("a"), &src, HeightmapParams::default(), 0.5)
            .unwrap();
        let color_id = s.material().color_map().unwrap().id();
        s.apply_to_surface(ArtworkId::new("a"), &src, HeightmapParams::new(1.0, 20.0, true), 0.5)
            .unwrap();
        assert_eq!(s.material().color_map().unwrap().id(), color_id);
        assert_eq!(s.textures().stats().built(TextureKind::Color), 1);
        assert_eq!(s.textures().stats().live(TextureKind::Displacement), 1);
    }

    #[test]
    fn new_pixels_under_same_id_rebuild_color_map() {
        let mut s = surface();
        s.apply_to_surface(ArtworkId::new("a"), &source(0), HeightmapParams::default(), 0.5)
            .unwrap();
        let color_id = s.material().color_map().unwrap().id();
        s.set_artwork(ArtworkId::new("a"), source(0)).unwrap();
        assert_eq!(s.material().color_map().unwrap().id(), color_id);
        assert!(s.material().displacement_map().is_some());

        s.apply_to_surface(ArtworkId::new("a"), &source(120), HeightmapParams::default(), 0.5)
            .unwrap();
        assert_ne!(s.material().color_map().unwrap().id(), color_id);
        let stats = s.textures().stats();
        assert_eq!(stats.built(TextureKind::Color), 2);
        assert_eq!(stats.live(TextureKind::Color), 1);
        assert_eq!(stats.live(TextureKind::Displacement), 1);
    }

    #[test]
    fn artwork_change_replaces_everything() {
        let mut s = surface();
        s.apply_to_surface(ArtworkId::new("a"), &source(0), HeightmapParams::default(), 0.5)
            .unwrap();
        s.apply_to_surface(ArtworkId::new("b"), &source(90), HeightmapParams::default(), 0.5)
            .unwrap();
        let stats = s.textures().stats();
        assert_eq!(stats.built(TextureKind::Color), 2);
        assert_eq!(stats.live(TextureKind::Color), 1);
        assert_eq!(stats.live(TextureKind::Displacement), 1);
        assert_eq!(s.artwork(), Some(&ArtworkId::new("b")));
    }

    #[test]
    fn results_for_previous_artwork_are_dropped() {
        let mut s = surface();
        let src = source(0);
        s.set_artwork(ArtworkId::new("a"), src.clone()).unwrap();
        let raster = pipeline::generate_heightmap_blocking(&src, HeightmapParams::default()).unwrap();
        let seq = s.issue_sequence();
        s.set_artwork(ArtworkId::new("b"), source(1)).unwrap();
        let outcome = s.accept(HeightmapResult {
            sequence: seq,
            artwork: ArtworkId::new("a"),
            params: HeightmapParams::default(),
            raster: Ok(raster),
        });
        assert!(matches!(outcome, AcceptOutcome::WrongArtwork { .. }));
        assert!(s.material().displacement_map().is_none());
        assert_eq!(s.textures().stats().built(TextureKind::Displacement), 0);
    }

    #[test]
    fn failed_run_keeps_last_good_heightmap() {
        let mut s = surface();
        let src = source(0);
        s.apply_to_surface(ArtworkId::new("a"), &src, HeightmapParams::default(), 0.5)
            .unwrap();
        let seq = s.issue_sequence();
        let outcome = s.accept(HeightmapResult {
            sequence: seq,
            artwork: ArtworkId::new("a"),
            params: HeightmapParams::default(),
            raster: Err(HeightmapError::encode("boom")),
        });
        assert!(matches!(outcome, AcceptOutcome::Failed { .. }));
        assert_eq!(s.material().displacement_map().unwrap().sequence(), 1);
    }

    #[test]
    fn displaced_positions_use_the_current_scale() {
        let mut s = surface();
        let white = SourceImage::from_rgba(RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255])));
        s.apply_to_surface(ArtworkId::new("w"), &white, HeightmapParams::default(), 1.0)
            .unwrap();
        assert!(s.displaced_positions().iter().all(|p| (p[2] - 1.0).abs() < 1e-6));
        s.set_displacement_scale(-2.0);
        assert!(s.displaced_positions().iter().all(|p| (p[2] + 2.0).abs() < 1e-6));
    }

    #[test]
    fn drop_releases_all_textures() {
        let mgr = TextureManager::headless();
        {
            let mut s = TerrainSurface::with_geometry(mgr.clone(), PlaneGeometry::new(1.0, 2));
            s.apply_to_surface(ArtworkId::new("a"), &source(0), HeightmapParams::default(), 0.5)
                .unwrap();
        }
        assert_eq!(mgr.stats().live(TextureKind::Color), 0);
        assert_eq!(mgr.stats().live(TextureKind::Displacement), 0);
    }
}
