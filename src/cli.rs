// ============================================================================
// ArtRelief CLI — headless heightmap generation
// ============================================================================
//
// Usage examples:
//   artrelief -i monet.jpg -o monet_height.png
//   artrelief -i art/*.jpg --output-dir heights/ --contrast 40 --invert
//   artrelief -i scan.png --smoothing 3 --obj --scale -0.75
//   artrelief --query lilies --images-dir library/ --output-dir heights/
//
// Every input goes through the same TerrainSurface, so switching inputs
// exercises the same texture replacement path as an interactive viewer.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::Parser;

use crate::catalog::{self, ArtworkId, DirectoryCatalog, DirectoryFetcher};
use crate::geometry::PlaneGeometry;
use crate::gpu::{GpuContext, TextureKind, TextureManager};
use crate::io::{SourceImage, decode_source, load_source};
use crate::pipeline::{HeightmapParams, generate_heightmap_blocking};
use crate::settings::AppSettings;
use crate::terrain::TerrainSurface;

/// ArtRelief headless heightmap generator.
///
/// Converts artwork images into grayscale heightmaps (and optionally a
/// displaced terrain mesh) using the same pipeline as the viewer.
#[derive(Parser, Debug)]
#[command(name = "artrelief", about = "Turn artwork images into terrain heightmaps")]
pub struct CliArgs {
    /// Input image(s). Glob patterns accepted (e.g. "art/*.jpg").
    #[arg(short, long, num_args = 1.., required_unless_present = "query", conflicts_with = "query")]
    pub input: Vec<String>,

    /// Pick a random artwork whose name matches this text from --images-dir.
    #[arg(short, long, requires = "images_dir")]
    pub query: Option<String>,

    /// Local image library searched by --query.
    #[arg(long, value_name = "DIR")]
    pub images_dir: Option<PathBuf>,

    /// Output PNG path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Blur radius in pixels applied last (0 = off).
    #[arg(long, value_name = "PX")]
    pub smoothing: Option<f32>,

    /// Contrast, -200..200 (0 = off).
    #[arg(long, allow_hyphen_values = true)]
    pub contrast: Option<f32>,

    /// Invert heights (bright becomes low).
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub invert: Option<bool>,

    /// Displacement scale used for the mesh export, -2..2.
    #[arg(long, allow_hyphen_values = true)]
    pub scale: Option<f32>,

    /// Quads per side of the exported mesh.
    #[arg(long)]
    pub segments: Option<u32>,

    /// Also write the displaced mesh as Wavefront OBJ next to the PNG.
    #[arg(long)]
    pub obj: bool,

    /// Print the heightmap as a data URI.
    #[arg(long)]
    pub data_uri: bool,

    /// Upload textures through wgpu instead of host memory.
    #[arg(long)]
    pub gpu: bool,

    /// Store the given heightmap options as the new defaults.
    #[arg(long)]
    pub save_settings: bool,

    /// Per-file timing and log echo on stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Heightmap and mesh options after merging flags over settings.
#[derive(Clone, Debug)]
struct RunOptions {
    params: HeightmapParams,
    scale: f32,
    obj: bool,
    data_uri: bool,
}

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    if let Err(e) = validate(&args) {
        eprintln!("error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let mut settings = AppSettings::load();
    apply_overrides(&mut settings, &args);
    if args.save_settings {
        settings.save();
    }

    if let Some(query) = &args.query {
        let dir = args.images_dir.as_deref().unwrap_or(Path::new("."));
        return match run_query(&args, &settings, query, dir) {
            Ok(output) => {
                println!("{}", output.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("query '{}': {:#}", query, e);
                eprintln!("error: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }
    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let textures = build_textures(&args, &settings);
    let mut surface = build_surface(&textures, &settings);
    let opts = RunOptions::new(&settings, &args);
    log::info!("processing {} input(s) with {:?}", inputs.len(), opts.params);

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(&mut surface, input_path, &output_path, &opts) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log::error!("{}: {:#}", input_path.display(), e);
                eprintln!("  error: {:#}", e);
                any_failure = true;
            }
        }
    }

    drop(surface);
    log_texture_stats(&textures);

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

impl RunOptions {
    fn new(settings: &AppSettings, args: &CliArgs) -> Self {
        Self {
            params: settings.heightmap_params(),
            scale: settings.displacement_scale,
            obj: args.obj,
            data_uri: args.data_uri,
        }
    }
}

fn build_textures(args: &CliArgs, settings: &AppSettings) -> TextureManager {
    let gpu = if args.gpu && settings.gpu_acceleration {
        GpuContext::new(&settings.preferred_gpu)
    } else {
        None
    };
    TextureManager::for_context(gpu.as_ref())
}

fn build_surface(textures: &TextureManager, settings: &AppSettings) -> TerrainSurface {
    let mut surface = TerrainSurface::with_geometry(
        textures.clone(),
        PlaneGeometry::new(settings.plane_size, settings.grid_segments),
    );
    surface.set_metalness(settings.metalness);
    surface.set_roughness(settings.roughness);
    surface
}

fn log_texture_stats(textures: &TextureManager) {
    let stats = textures.stats();
    for kind in TextureKind::ALL {
        log::info!(
            "{} textures built: {}, released: {}, still live: {}",
            kind.label(),
            stats.built(kind),
            stats.released(kind),
            stats.live(kind)
        );
    }
}

fn apply_overrides(settings: &mut AppSettings, args: &CliArgs) {
    if let Some(r) = args.smoothing {
        settings.smoothing_radius = r;
    }
    if let Some(c) = args.contrast {
        settings.contrast = c;
    }
    if let Some(inv) = args.invert {
        settings.invert = inv;
    }
    if let Some(s) = args.scale {
        settings.displacement_scale = s;
    }
    if let Some(n) = args.segments {
        settings.grid_segments = n;
    }
    settings.sanitize();
}

// ============================================================================
// Per-file processing
// ============================================================================

fn run_one(surface: &mut TerrainSurface, input: &Path, output: &Path, opts: &RunOptions) -> anyhow::Result<()> {
    let source = load_source(input).context("load failed")?;
    let artwork = ArtworkId::new(input.to_string_lossy());
    render(surface, artwork, source, output, opts)
}

/// Search the local library, then render the picked artwork. Returns the
/// heightmap path.
fn run_query(args: &CliArgs, settings: &AppSettings, query: &str, dir: &Path) -> anyhow::Result<PathBuf> {
    log::info!("remote equivalent: {}", catalog::search_url(&settings.api_base, query));
    let fetched = catalog::fetch_for_query(
        &DirectoryCatalog::new(dir),
        &DirectoryFetcher::new(dir),
        query,
        settings.image_width,
        &mut rand::thread_rng(),
    )
    .with_context(|| format!("no artwork for '{}' in '{}'", query, dir.display()))?;
    log::info!(
        "artwork {} ({}), image {}",
        fetched.artwork,
        catalog::artwork_url(&settings.api_base, &fetched.artwork),
        catalog::iiif_image_url(&settings.iiif_base, &fetched.image, settings.image_width)
    );
    let source = decode_source(&fetched.bytes)
        .context("decode failed")?
        .limit_width(settings.image_width);

    let output = build_output_path(
        Path::new(&format!("{}.png", fetched.image)),
        args.output.as_deref(),
        Some(args.output_dir.as_deref().unwrap_or(Path::new("."))),
    )
    .context("cannot determine output path")?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("could not create '{}'", parent.display()))?;
    }

    let textures = build_textures(args, settings);
    let mut surface = build_surface(&textures, settings);
    render(&mut surface, fetched.artwork, source, &output, &RunOptions::new(settings, args))?;
    drop(surface);
    log_texture_stats(&textures);
    Ok(output)
}

/// Bind `source` as the surface artwork, then generate, write and bind its
/// heightmap (plus the optional data URI and OBJ).
fn render(
    surface: &mut TerrainSurface,
    artwork: ArtworkId,
    source: SourceImage,
    output: &Path,
    opts: &RunOptions,
) -> anyhow::Result<()> {
    surface
        .set_artwork(artwork, source.clone())
        .context("color texture upload failed")?;

    let raster = generate_heightmap_blocking(&source, opts.params).context("heightmap generation failed")?;
    raster
        .write_to(output)
        .with_context(|| format!("could not write '{}'", output.display()))?;
    if opts.data_uri {
        println!("{}", raster.to_data_uri());
    }

    surface.apply_raster(&raster).context("displacement texture upload failed")?;
    surface.set_displacement_scale(opts.scale);

    if opts.obj {
        let obj_path = output.with_extension("obj");
        let file = File::create(&obj_path).with_context(|| format!("could not create '{}'", obj_path.display()))?;
        let mut writer = BufWriter::new(file);
        surface
            .geometry()
            .write_obj(&surface.displaced_positions(), &mut writer)
            .with_context(|| format!("could not write '{}'", obj_path.display()))?;
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);
        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Output path for one input.
///
/// 1. `--output` when given
/// 2. `--output-dir/<stem>_height.png`
/// 3. `<input dir>/<stem>_height.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }
    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let name = format!("{}_height.png", stem);
    match output_dir {
        Some(dir) => Some(dir.join(name)),
        None => Some(input.parent().unwrap_or(Path::new(".")).join(name)),
    }
}

/// Sanity checks that need both the args and the filesystem.
pub fn validate(args: &CliArgs) -> anyhow::Result<()> {
    if let Some(out) = &args.output
        && !out
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"))
    {
        bail!("--output must be a .png file, got '{}'", out.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_priorities() {
        let input = Path::new("/art/monet.jpg");
        assert_eq!(
            build_output_path(input, Some(Path::new("x.png")), None),
            Some(PathBuf::from("x.png"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("/out"))),
            Some(PathBuf::from("/out/monet_height.png"))
        );
        assert_eq!(
            build_output_path(input, None, None),
            Some(PathBuf::from("/art/monet_height.png"))
        );
    }

    #[test]
    fn flags_override_settings() {
        let args = CliArgs::parse_from(["artrelief", "-i", "a.jpg", "--contrast", "-50", "--invert", "--scale", "7"]);
        let mut settings = AppSettings::default();
        apply_overrides(&mut settings, &args);
        assert_eq!(settings.contrast, -50.0);
        assert!(settings.invert);
        assert_eq!(settings.displacement_scale, 2.0);
    }

    #[test]
    fn non_png_output_is_rejected() {
        let args = CliArgs::parse_from(["artrelief", "-i", "a.jpg", "-o", "a.jpg"]);
        assert!(validate(&args).is_err());
        let args = CliArgs::parse_from(["artrelief", "-i", "a.jpg", "-o", "a.PNG"]);
        assert!(validate(&args).is_ok());
    }

    #[test]
    fn query_needs_a_library_and_excludes_inputs() {
        assert!(CliArgs::try_parse_from(["artrelief", "--query", "lilies"]).is_err());
        assert!(CliArgs::try_parse_from(["artrelief", "-i", "a.jpg", "--query", "x", "--images-dir", "d"]).is_err());
        assert!(CliArgs::try_parse_from(["artrelief"]).is_err());
        let args = CliArgs::parse_from(["artrelief", "--query", "lilies", "--images-dir", "lib"]);
        assert!(args.input.is_empty());
    }

    #[test]
    fn query_renders_matching_library_image() {
        let dir = tempfile::tempdir().unwrap();
        let library = dir.path().join("library");
        std::fs::create_dir_all(&library).unwrap();
        image::RgbaImage::from_fn(40, 20, |x, _| image::Rgba([(x * 6) as u8, 10, 10, 255]))
            .save(library.join("water_lilies.png"))
            .unwrap();
        std::fs::write(library.join("haystacks.png"), b"not reached").unwrap();
        let out_dir = dir.path().join("out");

        let lib = library.to_string_lossy().into_owned();
        let out = out_dir.to_string_lossy().into_owned();
        let args = CliArgs::parse_from([
            "artrelief",
            "--query",
            "LILIES",
            "--images-dir",
            lib.as_str(),
            "--output-dir",
            out.as_str(),
        ]);
        let settings = AppSettings {
            image_width: 16,
            ..AppSettings::default()
        };
        let output = run_query(&args, &settings, "LILIES", &library).unwrap();

        assert_eq!(output, out_dir.join("water_lilies_height.png"));
        let height = image::open(&output).unwrap().to_rgba8();
        assert_eq!(height.dimensions(), (16, 8));

        assert!(run_query(&args, &settings, "cathedral", &library).is_err());
    }

    #[test]
    fn end_to_end_writes_png_and_obj() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("art.png");
        image::RgbaImage::from_fn(12, 8, |x, _| image::Rgba([(x * 20) as u8, 0, 0, 255]))
            .save(&input)
            .unwrap();
        let output = dir.path().join("art_height.png");

        let mut surface = TerrainSurface::with_geometry(TextureManager::headless(), PlaneGeometry::new(1.0, 4));
        let opts = RunOptions {
            params: HeightmapParams::new(1.0, 30.0, false),
            scale: 1.0,
            obj: true,
            data_uri: false,
        };
        run_one(&mut surface, &input, &output, &opts).unwrap();

        let height = image::open(&output).unwrap().to_rgba8();
        assert_eq!(height.dimensions(), (12, 8));
        assert!(height.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));
        let obj = std::fs::read_to_string(output.with_extension("obj")).unwrap();
        assert_eq!(obj.lines().filter(|l| l.starts_with("v ")).count(), 25);
    }
}
