//! Error types for the prerender coordinator

use prerender_render::RenderError;

/// Errors reported by the prerender coordinator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PrerenderError {
    #[error("no document is open")]
    NoDocument,

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("invalid scale factor: {0}")]
    InvalidScale(f64),

    #[error("invalid rotation: {0} degrees (expected 0, 90, 180 or 270)")]
    InvalidRotation(i32),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),
}

/// Result type for prerender operations
pub type PrerenderResult<T> = Result<T, PrerenderError>;
