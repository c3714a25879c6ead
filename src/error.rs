// ============================================================================
// ERRORS — failure taxonomy for the heightmap pipeline and texture lifecycle
// ============================================================================

/// Everything the pipeline or the surface integration can fail with.
///
/// None of these are swallowed inside a transform stage; they travel back to
/// whoever started the run.
#[derive(Debug, thiserror::Error)]
pub enum HeightmapError {
    /// Source image unreadable, zero-sized, or blocked by the fetcher.
    #[error("decode error: {0}")]
    Decode(String),

    /// The processed buffer could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// GPU texture allocation failed or exceeded device limits.
    #[error("resource error: {0}")]
    Resource(String),

    /// An external collaborator (catalog, fetcher) reported a failure.
    #[error("catalog error: {0}")]
    Catalog(String),
}

impl HeightmapError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, HeightmapError>;
