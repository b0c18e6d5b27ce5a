//! Page prediction
//!
//! Decides which pages around the current one are worth prerendering and how
//! urgent each one is. The prediction blends three signals: the configured
//! [`PrerenderStrategy`], the current [`ScrollDirection`], and a table of
//! learned page-to-page navigation frequencies.
//!
//! The predictor is plain bookkeeping with no threads or locks. The
//! coordinator owns it and calls into it from its own thread.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Initial lookahead radius
pub const DEFAULT_LOOKAHEAD_RADIUS: usize = 3;

/// Smallest radius the adaptive analysis narrows to
pub const MIN_LOOKAHEAD_RADIUS: usize = 2;

/// Largest radius the adaptive analysis widens to
pub const MAX_LOOKAHEAD_RADIUS: usize = 10;

/// View duration samples kept per page
pub const MAX_VIEW_SAMPLES: usize = 20;

/// Accesses kept for adaptive analysis
pub const MAX_ACCESS_HISTORY: usize = 1024;

/// Accesses needed before adaptive analysis runs (exclusive)
const MIN_HISTORY_FOR_ANALYSIS: usize = 10;

/// Mean jump above which the radius widens
const WIDEN_JUMP: usize = 5;

/// Mean jump below which the radius narrows
const NARROW_JUMP: usize = 2;

/// Pattern destinations blended into a balanced prediction
const PATTERN_CANDIDATES: usize = 3;

/// How wide and how direction-biased predictions are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrerenderStrategy {
    /// Only the immediate neighbours
    Conservative,

    /// Two pages each way plus learned navigation targets
    #[default]
    Balanced,

    /// A wide window biased toward the scroll direction
    Aggressive,
}

impl PrerenderStrategy {
    /// All strategies, narrowest first
    pub const ALL: [PrerenderStrategy; 3] = [
        PrerenderStrategy::Conservative,
        PrerenderStrategy::Balanced,
        PrerenderStrategy::Aggressive,
    ];

    /// Lowercase name, as used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            PrerenderStrategy::Conservative => "conservative",
            PrerenderStrategy::Balanced => "balanced",
            PrerenderStrategy::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for PrerenderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrerenderStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrerenderStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown prerender strategy '{}'", s))
    }
}

/// Direction the reader is moving through the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScrollDirection {
    /// Toward lower page numbers
    Backward,

    /// No clear direction
    #[default]
    None,

    /// Toward higher page numbers
    Forward,
}

impl ScrollDirection {
    /// Direction from a signed delta; only the sign matters
    pub fn from_delta(delta: i32) -> Self {
        match delta.signum() {
            1 => ScrollDirection::Forward,
            -1 => ScrollDirection::Backward,
            _ => ScrollDirection::None,
        }
    }

    /// -1, 0 or 1
    pub fn as_delta(self) -> i32 {
        match self {
            ScrollDirection::Backward => -1,
            ScrollDirection::None => 0,
            ScrollDirection::Forward => 1,
        }
    }

    /// Direction in which `page` lies as seen from `current`
    ///
    /// The current page itself counts as backward.
    fn toward(page: usize, current: usize) -> Self {
        if page > current {
            ScrollDirection::Forward
        } else {
            ScrollDirection::Backward
        }
    }
}

impl From<i32> for ScrollDirection {
    fn from(delta: i32) -> Self {
        Self::from_delta(delta)
    }
}

/// Learned "after page X the reader went to page Y" counts
///
/// Counts only grow; there is no decay.
#[derive(Debug, Clone, Default)]
pub struct NavigationPatterns {
    table: HashMap<usize, HashMap<usize, u32>>,
}

impl NavigationPatterns {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one navigation from `from` to `to`
    pub fn record(&mut self, from: usize, to: usize) {
        let count = self.table.entry(from).or_default().entry(to).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Number of recorded navigations from `from` to `to`
    pub fn frequency(&self, from: usize, to: usize) -> u32 {
        self.table
            .get(&from)
            .and_then(|destinations| destinations.get(&to))
            .copied()
            .unwrap_or(0)
    }

    /// Destinations from `from`, most frequent first (ties by page number)
    pub fn most_frequent(&self, from: usize, limit: usize) -> Vec<usize> {
        let Some(destinations) = self.table.get(&from) else {
            return Vec::new();
        };

        let mut ranked: Vec<(usize, u32)> = destinations
            .iter()
            .map(|(page, count)| (*page, *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.into_iter().take(limit).map(|(page, _)| page).collect()
    }

    /// Number of source pages with recorded navigations
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.table.clear();
    }
}

/// Recent view durations per page
#[derive(Debug, Clone, Default)]
pub struct PageViewTimes {
    samples: HashMap<usize, VecDeque<u64>>,
}

impl PageViewTimes {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one view; keeps the [`MAX_VIEW_SAMPLES`] most recent per page
    pub fn record(&mut self, page: usize, duration_millis: u64) {
        let samples = self.samples.entry(page).or_default();
        samples.push_back(duration_millis);
        while samples.len() > MAX_VIEW_SAMPLES {
            samples.pop_front();
        }
    }

    /// Samples for a page, oldest first
    pub fn samples(&self, page: usize) -> Vec<u64> {
        self.samples
            .get(&page)
            .map(|samples| samples.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Mean view duration for a page
    pub fn average(&self, page: usize) -> Option<u64> {
        let samples = self.samples.get(&page)?;
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<u64>() / samples.len() as u64)
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Visited pages, most recent last
#[derive(Debug, Clone, Default)]
pub struct AccessHistory {
    pages: VecDeque<usize>,
}

impl AccessHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a visit
    pub fn push(&mut self, page: usize) {
        self.pages.push_back(page);
        while self.pages.len() > MAX_ACCESS_HISTORY {
            self.pages.pop_front();
        }
    }

    /// Most recent visit
    pub fn last(&self) -> Option<usize> {
        self.pages.back().copied()
    }

    /// Number of recorded visits
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns true if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Integer mean of the nonzero jumps between consecutive visits
    pub fn mean_jump(&self) -> Option<usize> {
        let (total, count) = self
            .pages
            .iter()
            .zip(self.pages.iter().skip(1))
            .map(|(a, b)| a.abs_diff(*b))
            .filter(|jump| *jump > 0)
            .fold((0usize, 0usize), |(total, count), jump| {
                (total + jump, count + 1)
            });

        (count > 0).then(|| total / count)
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

/// Page predictor
///
/// # Example
///
/// ```
/// use prerender_core::{Predictor, PrerenderStrategy, ScrollDirection};
///
/// let mut predictor = Predictor::new(PrerenderStrategy::Conservative);
/// predictor.set_scroll_direction(ScrollDirection::Forward);
///
/// // Next page first, then the previous one
/// assert_eq!(predictor.predict_next_pages(10, 100), vec![11, 9]);
/// ```
#[derive(Debug, Clone)]
pub struct Predictor {
    strategy: PrerenderStrategy,
    direction: ScrollDirection,
    lookahead_radius: usize,
    current_page: Option<usize>,
    patterns: NavigationPatterns,
    view_times: PageViewTimes,
    history: AccessHistory,
}

impl Predictor {
    /// Create a predictor with the default lookahead radius
    pub fn new(strategy: PrerenderStrategy) -> Self {
        Self {
            strategy,
            direction: ScrollDirection::None,
            lookahead_radius: DEFAULT_LOOKAHEAD_RADIUS,
            current_page: None,
            patterns: NavigationPatterns::new(),
            view_times: PageViewTimes::new(),
            history: AccessHistory::new(),
        }
    }

    /// Set the initial lookahead radius (clamped to the adaptive range)
    pub fn with_lookahead_radius(mut self, radius: usize) -> Self {
        self.lookahead_radius = radius.clamp(MIN_LOOKAHEAD_RADIUS, MAX_LOOKAHEAD_RADIUS);
        self
    }

    pub fn strategy(&self) -> PrerenderStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: PrerenderStrategy) {
        self.strategy = strategy;
    }

    pub fn scroll_direction(&self) -> ScrollDirection {
        self.direction
    }

    pub fn set_scroll_direction(&mut self, direction: ScrollDirection) {
        self.direction = direction;
    }

    pub fn lookahead_radius(&self) -> usize {
        self.lookahead_radius
    }

    /// Last page reported through `on_page_viewed` or `on_navigation`
    pub fn current_page(&self) -> Option<usize> {
        self.current_page.or_else(|| self.history.last())
    }

    pub fn navigation_patterns(&self) -> &NavigationPatterns {
        &self.patterns
    }

    pub fn view_times(&self) -> &PageViewTimes {
        &self.view_times
    }

    pub fn access_history(&self) -> &AccessHistory {
        &self.history
    }

    /// Record that `page` was on screen for `duration_millis`
    pub fn on_page_viewed(&mut self, page: usize, duration_millis: u64) {
        self.view_times.record(page, duration_millis);
        if self.history.last() != Some(page) {
            self.history.push(page);
        }
        self.current_page = Some(page);
    }

    /// Record a navigation from one page to another
    pub fn on_navigation(&mut self, from: usize, to: usize) {
        if from != to {
            self.patterns.record(from, to);
        }
        self.history.push(to);
        self.current_page = Some(to);
    }

    /// Forget navigation patterns, view times and access history
    pub fn reset_learning(&mut self) {
        self.patterns.clear();
        self.view_times.clear();
        self.history.clear();
        self.current_page = None;
        self.lookahead_radius = DEFAULT_LOOKAHEAD_RADIUS;
    }

    /// Pages worth prerendering around `current`, most likely first
    ///
    /// Never includes `current` itself or pages outside `0..page_count`.
    pub fn predict_next_pages(&self, current: usize, page_count: usize) -> Vec<usize> {
        if page_count == 0 {
            return Vec::new();
        }

        let (ahead, behind) = match self.strategy {
            PrerenderStrategy::Conservative => (1, 1),
            PrerenderStrategy::Balanced => (2, 2),
            PrerenderStrategy::Aggressive => (self.lookahead_radius + 2, self.lookahead_radius),
        };

        let mut pages = window(current, page_count, self.direction, ahead, behind);

        if self.strategy == PrerenderStrategy::Balanced {
            for page in self.patterns.most_frequent(current, PATTERN_CANDIDATES) {
                if page != current && page < page_count && !pages.contains(&page) {
                    pages.push(page);
                }
            }
        }

        pages
    }

    /// Urgency of prerendering `page` while `current` is on screen
    ///
    /// Lower is more urgent; the result is always at least 1.
    pub fn calculate_priority(&self, page: usize, current: usize) -> i32 {
        let distance = i32::try_from(page.abs_diff(current)).unwrap_or(i32::MAX);
        let mut priority = distance;

        if self.direction != ScrollDirection::None {
            if ScrollDirection::toward(page, current) == self.direction {
                priority = (priority - 2).max(1);
            } else {
                priority = priority.saturating_add(1);
            }
        }

        let frequency = i32::try_from(self.patterns.frequency(current, page)).unwrap_or(i32::MAX);
        priority.saturating_sub(frequency).max(1)
    }

    /// Adjust the lookahead radius from the access history
    ///
    /// Jumpy reading widens the radius, steady page-by-page reading narrows
    /// it. Returns the new radius if it changed.
    pub fn analyze_reading_patterns(&mut self) -> Option<usize> {
        if self.history.len() <= MIN_HISTORY_FOR_ANALYSIS {
            return None;
        }

        let mean_jump = self.history.mean_jump()?;
        let radius = if mean_jump > WIDEN_JUMP {
            (self.lookahead_radius + 1).min(MAX_LOOKAHEAD_RADIUS)
        } else if mean_jump < NARROW_JUMP {
            self.lookahead_radius
                .saturating_sub(1)
                .max(MIN_LOOKAHEAD_RADIUS)
        } else {
            self.lookahead_radius
        };

        debug!(
            "Reading analysis: mean jump {} over {} accesses",
            mean_jump,
            self.history.len()
        );

        if radius == self.lookahead_radius {
            return None;
        }

        info!("Lookahead radius {} -> {}", self.lookahead_radius, radius);
        self.lookahead_radius = radius;
        Some(radius)
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(PrerenderStrategy::default())
    }
}

/// Neighbours of `current`, the scroll direction's side first
fn window(
    current: usize,
    page_count: usize,
    direction: ScrollDirection,
    ahead: usize,
    behind: usize,
) -> Vec<usize> {
    let forward = |count: usize| {
        (1..=count)
            .filter_map(move |offset| current.checked_add(offset))
            .filter(move |page| *page < page_count)
    };
    let backward = |count: usize| (1..=count).filter_map(move |offset| current.checked_sub(offset));

    match direction {
        ScrollDirection::Forward => forward(ahead).chain(backward(behind)).collect(),
        ScrollDirection::Backward => backward(ahead).chain(forward(behind)).collect(),
        ScrollDirection::None => {
            let mut pages: Vec<usize> = backward(ahead).collect();
            pages.reverse();
            pages.extend(forward(ahead));
            pages
        }
    }
}
