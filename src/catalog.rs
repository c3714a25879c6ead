// ============================================================================
// ARTWORK CATALOG — collaborator contracts, URL building, response parsing
// ============================================================================
//
// The HTTP client itself lives outside this crate. What lives here is the
// shape of the conversation: which URLs get requested and how the JSON that
// comes back is read.
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::error::{HeightmapError, Result};

/// Default IIIF image service.
pub const DEFAULT_IIIF_BASE: &str = "https://www.artic.edu/iiif/2";
/// Default metadata/search API root.
pub const DEFAULT_API_BASE: &str = "https://api.artic.edu/api/v1";
/// Width requested from the image service.
pub const DEFAULT_IMAGE_WIDTH: u32 = 843;

/// Catalog identifier of an artwork.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtworkId(String);

impl ArtworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier understood by the image service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Metadata/search service.
pub trait ArtworkCatalog {
    /// Candidate public-domain artworks for a free-text query.
    fn search(&self, query: &str) -> Result<Vec<ArtworkId>>;

    /// Image identifier for an artwork.
    fn image_id(&self, artwork: &ArtworkId) -> Result<ImageId>;
}

/// Raw source-image bytes by image id.
pub trait ImageFetcher {
    fn fetch(&self, image: &ImageId, width: u32) -> Result<Vec<u8>>;
}

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

fn image_stem(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

/// Offline catalog over a folder of images. Each file stem is both the
/// artwork id and the image id; a search matches stems containing the
/// query, ignoring case. An empty query matches everything.
pub struct DirectoryCatalog {
    dir: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtworkCatalog for DirectoryCatalog {
    fn search(&self, query: &str) -> Result<Vec<ArtworkId>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| HeightmapError::catalog(format!("{}: {}", self.dir.display(), e)))?;
        let needle = query.trim().to_lowercase();
        let mut hits: Vec<ArtworkId> = entries
            .flatten()
            .filter_map(|entry| image_stem(&entry.path()))
            .filter(|stem| stem.to_lowercase().contains(&needle))
            .map(ArtworkId)
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        hits.dedup();
        Ok(hits)
    }

    fn image_id(&self, artwork: &ArtworkId) -> Result<ImageId> {
        Ok(ImageId(artwork.0.clone()))
    }
}

/// Offline fetcher: `{dir}/{image_id}.jpg` or `.png`.
pub struct DirectoryFetcher {
    dir: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ImageFetcher for DirectoryFetcher {
    fn fetch(&self, image: &ImageId, _width: u32) -> Result<Vec<u8>> {
        for ext in IMAGE_EXTENSIONS {
            let path = self.dir.join(format!("{}.{}", image.as_str(), ext));
            if path.is_file() {
                return std::fs::read(&path)
                    .map_err(|e| HeightmapError::catalog(format!("{}: {}", path.display(), e)));
            }
        }
        Err(HeightmapError::catalog(format!(
            "no image named '{}' in {}",
            image,
            self.dir.display()
        )))
    }
}

// ============================================================================
// URLS
// ============================================================================

/// `{base}/{imageId}/full/{width},/0/default.jpg`
pub fn iiif_image_url(base: &str, image: &ImageId, width: u32) -> String {
    format!("{}/{}/full/{},/0/default.jpg", base.trim_end_matches('/'), image, width)
}

/// Single-artwork metadata URL.
pub fn artwork_url(api_base: &str, artwork: &ArtworkId) -> String {
    format!("{}/artworks/{}", api_base.trim_end_matches('/'), artwork)
}

/// Search URL restricted to public-domain works.
pub fn search_url(api_base: &str, query: &str) -> String {
    let params = serde_json::json!({
        "q": query,
        "query": { "term": { "is_public_domain": true } },
    });
    format!(
        "{}/artworks/search?params={}",
        api_base.trim_end_matches('/'),
        percent_encode(&params.to_string())
    )
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl From<RawId> for ArtworkId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => ArtworkId(n.to_string()),
            RawId::Text(s) => ArtworkId(s),
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: RawId,
}

#[derive(Deserialize)]
struct ArtworkResponse {
    data: ArtworkData,
}

#[derive(Deserialize)]
struct ArtworkData {
    image_id: Option<String>,
}

/// Artwork ids from a search response body.
pub fn parse_search_response(body: &str) -> Result<Vec<ArtworkId>> {
    let resp: SearchResponse =
        serde_json::from_str(body).map_err(|e| HeightmapError::catalog(format!("search response: {}", e)))?;
    Ok(resp.data.into_iter().map(|hit| hit.id.into()).collect())
}

/// Image id from a single-artwork response body. Artworks without an image
/// are reported as errors.
pub fn parse_artwork_response(body: &str) -> Result<ImageId> {
    let resp: ArtworkResponse =
        serde_json::from_str(body).map_err(|e| HeightmapError::catalog(format!("artwork response: {}", e)))?;
    match resp.data.image_id {
        Some(id) if !id.is_empty() => Ok(ImageId(id)),
        _ => Err(HeightmapError::catalog("artwork has no image")),
    }
}

/// Pick one search hit at random.
pub fn pick_artwork<'a, R: Rng + ?Sized>(hits: &'a [ArtworkId], rng: &mut R) -> Option<&'a ArtworkId> {
    hits.choose(rng)
}

/// Source bytes of one artwork picked for a query.
#[derive(Debug)]
pub struct FetchedArtwork {
    pub artwork: ArtworkId,
    pub image: ImageId,
    pub bytes: Vec<u8>,
}

/// Query → random hit → image id → bytes.
pub fn fetch_for_query<R: Rng + ?Sized>(
    catalog: &dyn ArtworkCatalog,
    fetcher: &dyn ImageFetcher,
    query: &str,
    width: u32,
    rng: &mut R,
) -> Result<FetchedArtwork> {
    let hits = catalog.search(query)?;
    let artwork = pick_artwork(&hits, rng)
        .cloned()
        .ok_or_else(|| HeightmapError::catalog(format!("no public-domain results for '{}'", query)))?;
    let image = catalog.image_id(&artwork)?;
    log::info!("query '{}' -> artwork {} (image {})", query, artwork, image);
    let bytes = fetcher.fetch(&image, width)?;
    Ok(FetchedArtwork { artwork, image, bytes })
}
