//! Prerender Cache Library
//!
//! Bounded in-memory store of rendered pages with least-recently-accessed
//! eviction under a byte budget and an item-count budget.

pub mod ram;

pub use ram::{CacheEntry, CacheStats, PageCache, PutOutcome};
