//! Prerender Core Library
//!
//! Predictive page prerendering for a paginated document viewer.
//!
//! The [`Prerenderer`] watches which pages the reader looks at, asks the
//! [`Predictor`] which pages come next, renders them on a worker pool and
//! keeps the results in a memory-bounded LRU cache. The viewer's own page
//! access goes through [`Prerenderer::render_page_now`], which serves cache
//! hits immediately and renders directly on a miss.

pub mod config;
pub mod error;
pub mod events;
pub mod predictor;
pub mod prerenderer;
pub mod stats;

pub use config::{ConfigError, PrerenderConfig};
pub use error::{PrerenderError, PrerenderResult};
pub use events::PrerenderEvent;
pub use predictor::{
    AccessHistory, NavigationPatterns, PageViewTimes, Predictor, PrerenderStrategy,
    ScrollDirection,
};
pub use prerenderer::{Prerenderer, RequestOutcome};
pub use stats::PrerenderStats;

pub use prerender_scheduler::ShutdownReport;
