//! Errors surfaced by render requests

use thiserror::Error;

use crate::tokenizer::DecodeError;

/// Error returned by a render request.
///
/// Errors are `Clone` because one failed computation is delivered to every
/// caller that was waiting on the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RenderError {
    /// A leaf's encoded data failed to decode
    #[error("Sprite '{sprite}': {source}")]
    Decode {
        sprite: String,
        #[source]
        source: DecodeError,
    },
    /// The requested sprite is not in the catalog
    #[error("Sprite '{0}' not found")]
    UnknownSprite(String),
    /// A composite part names a sprite that is not in the catalog
    #[error("Composite '{parent}' references unknown sprite '{child}'")]
    UnknownChild { parent: String, child: String },
    /// Resolving a sprite re-entered its own resolution
    #[error("Circular reference detected: {}", path.join(" -> "))]
    CyclicReference {
        /// The names forming the cycle, e.g. `["a", "b", "a"]`
        path: Vec<String>,
    },
    /// Composite nesting went deeper than the configured limit
    #[error("Composite nesting exceeds depth limit {limit} at sprite '{sprite}'")]
    DepthExceeded { sprite: String, limit: usize },
    /// The rendered sprite uses an index its palette does not have
    #[error("Sprite '{sprite}' uses index {index}, outside its palette of {palette_len} colors")]
    IndexOutOfPalette { sprite: String, index: u8, palette_len: usize },
    /// An explicit palette generation was requested that is no longer retained
    #[error("Palette generation {0} is not available")]
    UnknownGeneration(u64),
    /// The render was cancelled or abandoned before completing
    #[error("Render of sprite '{0}' was cancelled")]
    Cancelled(String),
}

impl RenderError {
    /// Short machine-friendly name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::Decode { source, .. } => match source {
                DecodeError::MalformedEncoding { .. } => "malformed_encoding",
                DecodeError::DimensionMismatch { .. } => "dimension_mismatch",
                DecodeError::TooLarge { .. } => "too_large",
            },
            RenderError::UnknownSprite(_) => "unknown_sprite",
            RenderError::UnknownChild { .. } => "unknown_child",
            RenderError::CyclicReference { .. } => "cyclic_reference",
            RenderError::DepthExceeded { .. } => "depth_exceeded",
            RenderError::IndexOutOfPalette { .. } => "index_out_of_palette",
            RenderError::UnknownGeneration(_) => "unknown_generation",
            RenderError::Cancelled(_) => "cancelled",
        }
    }
}
