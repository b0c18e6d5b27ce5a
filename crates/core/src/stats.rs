//! Coordinator statistics

use serde::Serialize;

use crate::predictor::PrerenderStrategy;

/// Snapshot of the coordinator's counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrerenderStats {
    /// Pages currently cached
    pub cache_items: usize,

    /// Bytes held by the cache
    pub memory_used: usize,

    /// Cache memory budget in bytes
    pub memory_limit: usize,

    /// Cache item budget
    pub max_items: usize,

    /// Cache lookups that found a page
    pub hits: u64,

    /// Cache lookups that found nothing
    pub misses: u64,

    /// hits / (hits + misses), 0.0 before any lookup
    pub hit_ratio: f64,

    /// Entries evicted to stay within budget
    pub evictions: u64,

    /// Requests accepted into the queue
    pub queued: u64,

    /// Requests waiting for a worker
    pub pending: usize,

    /// Requests being rendered right now
    pub in_flight: usize,

    /// Pages rendered and cached by workers
    pub rendered: u64,

    /// Renders that failed or could not be cached
    pub failed: u64,

    /// Results dropped because the document changed meanwhile
    pub discarded: u64,

    /// Current predictor lookahead radius
    pub lookahead_radius: usize,

    /// Current prediction strategy
    pub strategy: PrerenderStrategy,

    /// Configured worker thread count
    pub workers: usize,

    /// Worker threads still alive, including detached ones
    pub live_workers: usize,

    /// Whether the worker pool is running
    pub running: bool,

    /// Whether dispatch is paused
    pub paused: bool,
}
