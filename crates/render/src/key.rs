//! Page identity for caching and request deduplication
//!
//! A rendered page is identified by its page index, scale factor and
//! rotation. Scale factors are quantised to three decimals so that values
//! differing only by floating point noise share one identity.

use std::fmt;

/// Number of scale steps per 1.0 (three decimal places)
pub const SCALE_QUANTUM: f64 = 1000.0;

/// Page rotation in 90 degree steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parse a rotation from degrees.
    ///
    /// Only 0, 90, 180 and 270 are accepted.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Rotation in degrees
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Returns true if width and height swap under this rotation
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl TryFrom<i32> for Rotation {
    type Error = i32;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        Self::from_degrees(degrees).ok_or(degrees)
    }
}

/// Returns true if `scale` can be used as a render scale factor.
///
/// The scale must be finite, positive, and not vanish after quantisation.
pub fn is_valid_scale(scale: f64) -> bool {
    scale.is_finite() && scale > 0.0 && quantize_scale(scale) > 0
}

fn quantize_scale(scale: f64) -> u32 {
    (scale * SCALE_QUANTUM).round().clamp(0.0, u32::MAX as f64) as u32
}

/// Identity of a rendered page
///
/// Used both as the cache key and as the request identity in the render
/// queue. Two requests with the same key are the same work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    /// Page index (0-based)
    pub page: usize,

    /// Scale factor in thousandths
    scale_milli: u32,

    /// Page rotation
    pub rotation: Rotation,
}

impl PageKey {
    /// Create a new page key
    pub fn new(page: usize, scale: f64, rotation: Rotation) -> Self {
        Self {
            page,
            scale_milli: quantize_scale(scale),
            rotation,
        }
    }

    /// Scale factor after quantisation
    pub fn scale(&self) -> f64 {
        self.scale_milli as f64 / SCALE_QUANTUM
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{:.3}_{}",
            self.page,
            self.scale(),
            self.rotation.degrees()
        )
    }
}
