//! External rendering collaborators
//!
//! The rasterizer and the document model live outside this workspace. This
//! module defines the traits they are consumed through and a helper that
//! wraps one backend call with the checks every caller needs.

use crate::key::{PageKey, Rotation};
use image::imageops;

/// Base resolution of a page at scale 1.0
pub const BASE_DPI: f64 = 72.0;

/// Decoded page bitmap (32-bit RGBA)
pub type PageBitmap = image::RgbaImage;

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while rendering a page
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("backend returned an empty bitmap for page {page}")]
    EmptyBitmap { page: usize },
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error("document is closed or invalid")]
    DocumentUnavailable,
}

/// An open document as seen by the prerenderer
///
/// Implementations must be shareable across worker threads.
pub trait Document: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Returns false once the document has been closed
    fn is_valid(&self) -> bool {
        true
    }
}

/// Page rasterizer
///
/// `render` may be called from several worker threads at once against the
/// same document unless [`RenderBackend::is_thread_safe`] returns false, in
/// which case callers serialize access.
pub trait RenderBackend: Send + Sync {
    /// Render one page at the given resolution
    fn render(
        &self,
        document: &dyn Document,
        page: usize,
        dpi_x: f64,
        dpi_y: f64,
    ) -> RenderResult<PageBitmap>;

    /// Whether concurrent `render` calls are allowed
    fn is_thread_safe(&self) -> bool {
        true
    }
}

/// Resolution for a scale factor on a display with the given pixel ratio
pub fn optimal_dpi(scale: f64, device_pixel_ratio: f64) -> f64 {
    BASE_DPI * scale * device_pixel_ratio
}

/// Render the page identified by `key` and apply its rotation.
///
/// Checks that the document is still valid and the page in range before
/// calling the backend, and turns an empty bitmap into an error.
pub fn render_page(
    backend: &dyn RenderBackend,
    document: &dyn Document,
    key: &PageKey,
    device_pixel_ratio: f64,
) -> RenderResult<PageBitmap> {
    if !document.is_valid() {
        return Err(RenderError::DocumentUnavailable);
    }

    let page_count = document.page_count();
    if key.page >= page_count {
        return Err(RenderError::PageOutOfRange {
            page: key.page,
            page_count,
        });
    }

    let dpi = optimal_dpi(key.scale(), device_pixel_ratio);
    let bitmap = backend.render(document, key.page, dpi, dpi)?;

    if bitmap.width() == 0 || bitmap.height() == 0 {
        return Err(RenderError::EmptyBitmap { page: key.page });
    }

    Ok(rotate(bitmap, key.rotation))
}

fn rotate(bitmap: PageBitmap, rotation: Rotation) -> PageBitmap {
    match rotation {
        Rotation::Deg0 => bitmap,
        Rotation::Deg90 => imageops::rotate90(&bitmap),
        Rotation::Deg180 => imageops::rotate180(&bitmap),
        Rotation::Deg270 => imageops::rotate270(&bitmap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDocument {
        pages: usize,
        valid: bool,
    }

    impl Document for FixedDocument {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn is_valid(&self) -> bool {
            self.valid
        }
    }

    /// Renders a bitmap whose size follows the requested dpi
    struct LetterBackend;

    impl RenderBackend for LetterBackend {
        fn render(
            &self,
            _document: &dyn Document,
            _page: usize,
            dpi_x: f64,
            dpi_y: f64,
        ) -> RenderResult<PageBitmap> {
            let width = (8.5 * dpi_x) as u32;
            let height = (11.0 * dpi_y) as u32;
            Ok(PageBitmap::new(width, height))
        }
    }

    struct EmptyBackend;

    impl RenderBackend for EmptyBackend {
        fn render(
            &self,
            _document: &dyn Document,
            _page: usize,
            _dpi_x: f64,
            _dpi_y: f64,
        ) -> RenderResult<PageBitmap> {
            Ok(PageBitmap::new(0, 0))
        }
    }

    fn document(pages: usize) -> FixedDocument {
        FixedDocument { pages, valid: true }
    }

    #[test]
    fn test_optimal_dpi() {
        assert_eq!(optimal_dpi(1.0, 1.0), 72.0);
        assert_eq!(optimal_dpi(2.0, 1.0), 144.0);
        assert_eq!(optimal_dpi(1.0, 2.0), 144.0);
    }

    #[test]
    fn test_render_page_dimensions() {
        let key = PageKey::new(0, 1.0, Rotation::Deg0);
        let bitmap = render_page(&LetterBackend, &document(3), &key, 1.0).unwrap();
        assert_eq!(bitmap.dimensions(), (612, 792));
    }

    #[test]
    fn test_render_page_applies_rotation() {
        let key = PageKey::new(0, 1.0, Rotation::Deg90);
        let bitmap = render_page(&LetterBackend, &document(3), &key, 1.0).unwrap();
        assert_eq!(bitmap.dimensions(), (792, 612));

        let key = PageKey::new(0, 1.0, Rotation::Deg180);
        let bitmap = render_page(&LetterBackend, &document(3), &key, 1.0).unwrap();
        assert_eq!(bitmap.dimensions(), (612, 792));
    }

    #[test]
    fn test_render_page_out_of_range() {
        let key = PageKey::new(3, 1.0, Rotation::Deg0);
        let result = render_page(&LetterBackend, &document(3), &key, 1.0);
        assert_eq!(
            result.unwrap_err(),
            RenderError::PageOutOfRange {
                page: 3,
                page_count: 3
            }
        );
    }

    #[test]
    fn test_render_page_invalid_document() {
        let closed = FixedDocument {
            pages: 3,
            valid: false,
        };
        let key = PageKey::new(0, 1.0, Rotation::Deg0);
        let result = render_page(&LetterBackend, &closed, &key, 1.0);
        assert_eq!(result.unwrap_err(), RenderError::DocumentUnavailable);
    }

    #[test]
    fn test_render_page_empty_bitmap() {
        let key = PageKey::new(1, 1.0, Rotation::Deg0);
        let result = render_page(&EmptyBackend, &document(3), &key, 1.0);
        assert_eq!(result.unwrap_err(), RenderError::EmptyBitmap { page: 1 });
    }

    #[test]
    fn test_default_thread_safety() {
        assert!(LetterBackend.is_thread_safe());
    }
}
