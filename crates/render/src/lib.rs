//! Prerender Render Library
//!
//! Page identity types and the seams to the external rasterizer: the
//! [`Document`] collaborator and the [`RenderBackend`] that turns a page
//! into a bitmap.

pub mod backend;
pub mod key;

pub use backend::{
    optimal_dpi, render_page, Document, PageBitmap, RenderBackend, RenderError, RenderResult,
    BASE_DPI,
};
pub use key::{is_valid_scale, PageKey, Rotation, SCALE_QUANTUM};
