//! Notifications emitted by the prerender coordinator

use prerender_render::Rotation;

/// Something the viewer may want to react to
///
/// Delivered through the receivers returned by
/// [`Prerenderer::subscribe`](crate::Prerenderer::subscribe).
#[derive(Debug, Clone, PartialEq)]
pub enum PrerenderEvent {
    /// The worker pool started
    Started,

    /// The worker pool stopped
    Stopped,

    /// A page finished rendering and is now cached
    PagePrerendered {
        page: usize,
        scale: f64,
        rotation: Rotation,
    },

    /// A page could not be rendered or cached
    PageFailed { page: usize, reason: String },

    /// The number of cached pages changed
    CacheUpdated { items: usize },

    /// The memory held by the cache changed
    MemoryUsageChanged { bytes: usize },

    /// The adaptive analysis changed the lookahead radius
    LookaheadRadiusChanged { radius: usize },
}
