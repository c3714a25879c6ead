// ============================================================================
// SETTINGS — persisted defaults for the heightmap controls and services
// ============================================================================

use std::path::{Path, PathBuf};

use crate::catalog::{DEFAULT_API_BASE, DEFAULT_IIIF_BASE, DEFAULT_IMAGE_WIDTH};
use crate::pipeline::HeightmapParams;
use crate::terrain::{DEFAULT_DISPLACEMENT_SCALE, DEFAULT_PLANE_SIZE, DEFAULT_SEGMENTS, DISPLACEMENT_SCALE_MAX, DISPLACEMENT_SCALE_MIN};

/// Settings that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    pub smoothing_radius: f32,
    pub contrast: f32,
    pub invert: bool,
    /// Vertex displacement multiplier (negative pushes bright areas away).
    pub displacement_scale: f32,
    pub metalness: f32,
    pub roughness: f32,
    /// Quads per side of the terrain plane.
    pub grid_segments: u32,
    pub plane_size: f32,
    pub iiif_base: String,
    pub api_base: String,
    /// Width requested from the image service.
    pub image_width: u32,
    /// Enable the wgpu texture backend.
    pub gpu_acceleration: bool,
    /// "Auto", "high performance" or "low power".
    pub preferred_gpu: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            smoothing_radius: 0.0,
            contrast: 0.0,
            invert: false,
            displacement_scale: DEFAULT_DISPLACEMENT_SCALE,
            metalness: 0.0,
            roughness: 1.0,
            grid_segments: DEFAULT_SEGMENTS,
            plane_size: DEFAULT_PLANE_SIZE,
            iiif_base: DEFAULT_IIIF_BASE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            image_width: DEFAULT_IMAGE_WIDTH,
            gpu_acceleration: true,
            preferred_gpu: "Auto".to_string(),
        }
    }
}

impl AppSettings {
    /// `<config dir>/artrelief/artrelief_settings.cfg`, falling back to the
    /// executable's directory.
    pub fn settings_path() -> Option<PathBuf> {
        if let Some(dir) = dirs::config_dir() {
            return Some(dir.join("artrelief").join("artrelief_settings.cfg"));
        }
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.join("artrelief_settings.cfg")))
    }

    /// The heightmap part as an immutable snapshot.
    pub fn heightmap_params(&self) -> HeightmapParams {
        HeightmapParams::new(self.smoothing_radius, self.contrast, self.invert)
    }

    /// Load from the default location (defaults if missing or corrupt).
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Save to the default location. Failures are logged, not fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log::warn!("could not save settings to {}: {}", path.display(), e);
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::parse(&content)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "smoothing_radius={}\n\
             contrast={}\n\
             invert={}\n\
             displacement_scale={}\n\
             metalness={}\n\
             roughness={}\n\
             grid_segments={}\n\
             plane_size={}\n\
             iiif_base={}\n\
             api_base={}\n\
             image_width={}\n\
             gpu_acceleration={}\n\
             preferred_gpu={}\n",
            self.smoothing_radius,
            self.contrast,
            self.invert,
            self.displacement_scale,
            self.metalness,
            self.roughness,
            self.grid_segments,
            self.plane_size,
            self.iiif_base,
            self.api_base,
            self.image_width,
            self.gpu_acceleration,
            self.preferred_gpu,
        )
    }

    /// `key=value` lines; unknown keys and unparsable values are skipped.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "smoothing_radius" => set_parsed(&mut s.smoothing_radius, val),
                "contrast" => set_parsed(&mut s.contrast, val),
                "invert" => set_parsed(&mut s.invert, val),
                "displacement_scale" => set_parsed(&mut s.displacement_scale, val),
                "metalness" => set_parsed(&mut s.metalness, val),
                "roughness" => set_parsed(&mut s.roughness, val),
                "grid_segments" => set_parsed(&mut s.grid_segments, val),
                "plane_size" => set_parsed(&mut s.plane_size, val),
                "iiif_base" if !val.is_empty() => s.iiif_base = val.to_string(),
                "api_base" if !val.is_empty() => s.api_base = val.to_string(),
                "image_width" => set_parsed(&mut s.image_width, val),
                "gpu_acceleration" => set_parsed(&mut s.gpu_acceleration, val),
                "preferred_gpu" => s.preferred_gpu = val.to_string(),
                _ => {}
            }
        }
        s.sanitize();
        s
    }

    /// Pull every value back into its valid range.
    pub fn sanitize(&mut self) {
        let params = self.heightmap_params();
        self.smoothing_radius = params.smoothing_radius;
        self.contrast = params.contrast;
        self.displacement_scale = finite_or(self.displacement_scale, DEFAULT_DISPLACEMENT_SCALE)
            .clamp(DISPLACEMENT_SCALE_MIN, DISPLACEMENT_SCALE_MAX);
        self.metalness = finite_or(self.metalness, 0.0).clamp(0.0, 1.0);
        self.roughness = finite_or(self.roughness, 1.0).clamp(0.0, 1.0);
        self.grid_segments = self.grid_segments.clamp(1, 1024);
        self.plane_size = finite_or(self.plane_size, DEFAULT_PLANE_SIZE).max(0.01);
        self.image_width = self.image_width.clamp(1, 4096);
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, val: &str) {
    if let Ok(v) = val.parse() {
        *slot = v;
    }
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() { v } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.cfg");
        let mut s = AppSettings::default();
        s.contrast = 42.5;
        s.invert = true;
        s.grid_segments = 64;
        s.iiif_base = "http://localhost:9000/iiif".into();
        s.save_to(&path).unwrap();
        assert_eq!(AppSettings::load_from(&path), s);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(AppSettings::load_from(&dir.path().join("nope.cfg")), AppSettings::default());
    }

    #[test]
    fn garbage_and_out_of_range_values() {
        let s = AppSettings::parse(
            "# comment\ncontrast=9999\nroughness=abc\nmetalness=-3\nunknown=1\nno equals sign\ndisplacement_scale=NaN\n",
        );
        assert_eq!(s.contrast, 200.0);
        assert_eq!(s.roughness, 1.0);
        assert_eq!(s.metalness, 0.0);
        assert_eq!(s.displacement_scale, DEFAULT_DISPLACEMENT_SCALE);
    }

    #[test]
    fn params_snapshot_matches_fields() {
        let s = AppSettings::parse("smoothing_radius=3\ncontrast=-20\ninvert=true\n");
        assert_eq!(s.heightmap_params(), HeightmapParams::new(3.0, -20.0, true));
    }
}
