//! Render requests
//!
//! A request asks for one page at one scale and rotation. Its identity is
//! the [`PageKey`]; priority and timestamp do not take part in equality.

use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use prerender_render::{PageKey, Rotation};

/// A request to prerender one page
///
/// Lower `priority` values are more urgent.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    /// Identity of the requested page
    pub key: PageKey,

    /// Urgency (lower is more urgent)
    pub priority: i32,

    /// Submission time in milliseconds since the Unix epoch
    pub enqueued_at_millis: u64,

    /// Queue epoch the request was dispatched in
    pub(crate) epoch: u64,
}

impl RenderRequest {
    /// Create a new request stamped with the current time
    pub fn new(page: usize, scale: f64, rotation: Rotation, priority: i32) -> Self {
        Self::for_key(PageKey::new(page, scale, rotation), priority)
    }

    /// Create a new request for an existing key
    pub fn for_key(key: PageKey, priority: i32) -> Self {
        Self {
            key,
            priority,
            enqueued_at_millis: now_millis(),
            epoch: 0,
        }
    }

    /// Page index (0-based)
    pub fn page(&self) -> usize {
        self.key.page
    }

    /// Scale factor
    pub fn scale(&self) -> f64 {
        self.key.scale()
    }

    /// Rotation
    pub fn rotation(&self) -> Rotation {
        self.key.rotation
    }
}

impl PartialEq for RenderRequest {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RenderRequest {}

impl Hash for RenderRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
