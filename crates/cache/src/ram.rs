//! RAM page cache with LRU eviction
//!
//! Provides in-memory caching of rendered pages with automatic eviction of
//! the least recently accessed page when the memory budget or the item
//! budget is exceeded.
//!
//! Recency is tracked by wall-clock access time. Accesses within the same
//! millisecond are ordered by a per-cache sequence number, so eviction order
//! is deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use prerender_render::{PageBitmap, PageKey};

/// Bytes per pixel of a cached bitmap (32-bit color)
const BYTES_PER_PIXEL: usize = 4;

/// Default item budget
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Default memory budget (512 MB)
pub const DEFAULT_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

/// Memory footprint of a bitmap in bytes
pub fn bitmap_memory_size(bitmap: &PageBitmap) -> usize {
    bitmap.width() as usize * bitmap.height() as usize * BYTES_PER_PIXEL
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// A cached page
///
/// The bitmap is shared, so cloning an entry is cheap.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Identity of the cached page
    pub key: PageKey,

    /// Rendered bitmap
    pub bitmap: Arc<PageBitmap>,

    /// Memory used by the bitmap (width * height * 4)
    pub memory_bytes: usize,

    /// Wall-clock time of the last read or insertion (ms since epoch)
    pub last_access_millis: u64,

    /// Number of reads served from this entry
    pub access_count: u64,

    /// Tie-breaker for accesses within the same millisecond
    access_seq: u64,
}

impl CacheEntry {
    fn recency(&self) -> (u64, u64) {
        (self.last_access_millis, self.access_seq)
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Number of pages currently in cache
    pub item_count: usize,

    /// Total memory used by cached pages (bytes)
    pub memory_used: usize,

    /// Maximum memory allowed (bytes)
    pub memory_limit: usize,

    /// Maximum number of pages allowed
    pub max_items: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of pages evicted by either budget
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_limit as f64
        }
    }
}

/// Result of a [`PageCache::put`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The page was stored; `evicted` lists pages removed to make room
    Inserted { evicted: Vec<PageKey> },

    /// The bitmap alone exceeds the memory budget and was not stored
    TooLarge { memory_bytes: usize },
}

impl PutOutcome {
    /// Returns true if the page is now cached
    pub fn is_inserted(&self) -> bool {
        matches!(self, PutOutcome::Inserted { .. })
    }
}

/// Internal cache state
struct CacheState {
    entries: HashMap<PageKey, CacheEntry>,

    /// Current memory usage in bytes
    memory_used: usize,

    /// Maximum memory allowed in bytes
    memory_limit: usize,

    /// Maximum number of entries
    max_items: usize,

    /// Next access sequence number
    next_seq: u64,

    evictions: u64,
}

impl CacheState {
    fn new(memory_limit: usize, max_items: usize) -> Self {
        Self {
            entries: HashMap::new(),
            memory_used: 0,
            memory_limit,
            max_items: max_items.max(1),
            next_seq: 0,
            evictions: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn remove_entry(&mut self, key: &PageKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.memory_used = self.memory_used.saturating_sub(entry.memory_bytes);
        Some(entry)
    }

    /// Evict the least recently accessed page
    fn evict_lru(&mut self) -> Option<PageKey> {
        let key = self
            .entries
            .values()
            .min_by_key(|entry| entry.recency())
            .map(|entry| entry.key)?;

        self.remove_entry(&key)?;
        self.evictions += 1;
        debug!("Evicted page {} from cache", key);
        Some(key)
    }

    /// Evict pages until `required_size` more bytes fit in the budget
    fn evict_to_fit(&mut self, required_size: usize, evicted: &mut Vec<PageKey>) {
        while self.memory_used + required_size > self.memory_limit && !self.entries.is_empty() {
            match self.evict_lru() {
                Some(key) => evicted.push(key),
                None => break,
            }
        }
    }

    /// Evict pages until the item budget holds
    fn evict_to_count(&mut self, evicted: &mut Vec<PageKey>) {
        while self.entries.len() > self.max_items {
            match self.evict_lru() {
                Some(key) => evicted.push(key),
                None => break,
            }
        }
    }
}

/// RAM page cache with LRU eviction
///
/// Thread-safe in-memory cache for rendered pages. All mutations happen
/// under one lock; the hit and miss counters are atomics.
///
/// # Example
///
/// ```
/// use prerender_cache::PageCache;
/// use prerender_render::{PageBitmap, PageKey, Rotation};
///
/// // 10MB budget, at most 20 pages
/// let cache = PageCache::new(10 * 1024 * 1024, 20);
///
/// let key = PageKey::new(5, 1.0, Rotation::Deg0);
/// cache.put(key, PageBitmap::new(612, 792));
///
/// if let Some(entry) = cache.get(&key) {
///     println!("Cache hit! {}x{}", entry.bitmap.width(), entry.bitmap.height());
/// }
///
/// println!("Hit ratio: {:.2}", cache.hit_ratio());
/// ```
pub struct PageCache {
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PageCache {
    /// Create a new cache with a memory limit in bytes and an item limit
    ///
    /// The item limit is clamped to at least 1.
    pub fn new(memory_limit: usize, max_items: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::new(memory_limit, max_items)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a new cache with a memory limit in megabytes
    pub fn with_mb_limit(megabytes: usize, max_items: usize) -> Self {
        Self::new(megabytes * 1024 * 1024, max_items)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a page in the cache
    ///
    /// If storing this page would exceed the memory limit, least recently
    /// accessed pages are evicted until it fits. A page that is larger than
    /// the whole budget is not stored and nothing is evicted for it.
    pub fn put(&self, key: PageKey, bitmap: impl Into<Arc<PageBitmap>>) -> PutOutcome {
        let bitmap = bitmap.into();
        let memory_bytes = bitmap_memory_size(&bitmap);
        let mut state = self.lock();

        if memory_bytes > state.memory_limit {
            debug!(
                "Page {} needs {} bytes, over the {} byte budget; not cached",
                key, memory_bytes, state.memory_limit
            );
            return PutOutcome::TooLarge { memory_bytes };
        }

        // Replacing an existing page frees its memory first
        state.remove_entry(&key);

        let mut evicted = Vec::new();
        state.evict_to_fit(memory_bytes, &mut evicted);

        let access_seq = state.next_seq();
        state.memory_used += memory_bytes;
        state.entries.insert(
            key,
            CacheEntry {
                key,
                bitmap,
                memory_bytes,
                last_access_millis: now_millis(),
                access_count: 0,
                access_seq,
            },
        );

        state.evict_to_count(&mut evicted);

        PutOutcome::Inserted { evicted }
    }

    /// Retrieve a page from the cache
    ///
    /// On a hit, refreshes the page's access time and bumps its access count.
    /// Updates hit/miss statistics either way.
    pub fn get(&self, key: &PageKey) -> Option<CacheEntry> {
        let mut state = self.lock();
        let access_seq = state.next_seq();

        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access_millis = now_millis();
                entry.access_seq = access_seq;
                entry.access_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Count a lookup that could not name a cacheable page
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Check if a page is in the cache without touching recency or stats
    pub fn contains(&self, key: &PageKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Remove a page from the cache
    ///
    /// Returns the removed entry, or `None` if it wasn't cached.
    pub fn remove(&self, key: &PageKey) -> Option<CacheEntry> {
        self.lock().remove_entry(key)
    }

    /// Remove every cached rendition of a page
    ///
    /// Returns the number of entries removed.
    pub fn remove_page(&self, page: usize) -> usize {
        let mut state = self.lock();
        let keys: Vec<PageKey> = state
            .entries
            .keys()
            .filter(|key| key.page == page)
            .copied()
            .collect();

        for key in &keys {
            state.remove_entry(key);
        }

        keys.len()
    }

    /// Clear all pages from the cache
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.memory_used = 0;
    }

    /// Update the item limit (clamped to at least 1)
    ///
    /// Evicts least recently accessed pages immediately if the cache holds
    /// more than the new limit. Returns the evicted keys.
    pub fn set_max_items(&self, max_items: usize) -> Vec<PageKey> {
        let mut state = self.lock();
        state.max_items = max_items.max(1);

        let mut evicted = Vec::new();
        state.evict_to_count(&mut evicted);
        evicted
    }

    /// Update the memory limit in bytes
    ///
    /// Evicts least recently accessed pages immediately if current usage is
    /// over the new limit. Returns the evicted keys.
    pub fn set_memory_limit(&self, memory_limit: usize) -> Vec<PageKey> {
        let mut state = self.lock();
        state.memory_limit = memory_limit;

        let mut evicted = Vec::new();
        state.evict_to_fit(0, &mut evicted);
        evicted
    }

    /// Ratio of hits to lookups, 0.0 before any lookup
    pub fn hit_ratio(&self) -> f64 {
        self.stats().hit_ratio()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            item_count: state.entries.len(),
            memory_used: state.memory_used,
            memory_limit: state.memory_limit,
            max_items: state.max_items,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: state.evictions,
        }
    }

    /// Keys of all cached pages, in arbitrary order
    pub fn keys(&self) -> Vec<PageKey> {
        self.lock().entries.keys().copied().collect()
    }

    /// Get the current memory limit in bytes
    pub fn memory_limit(&self) -> usize {
        self.lock().memory_limit
    }

    /// Get the current item limit
    pub fn max_items(&self) -> usize {
        self.lock().max_items
    }

    /// Get the current memory usage in bytes
    pub fn memory_used(&self) -> usize {
        self.lock().memory_used
    }

    /// Get the number of pages currently in the cache
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl Default for PageCache {
    /// Create a cache with a 512MB, 100 page budget
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT, DEFAULT_MAX_ITEMS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use prerender_render::Rotation;

    /// 256x256 page, 256KB
    const PAGE_BYTES: usize = 256 * 256 * 4;

    fn key(page: usize) -> PageKey {
        PageKey::new(page, 1.0, Rotation::Deg0)
    }

    fn page_bitmap() -> PageBitmap {
        PageBitmap::new(256, 256)
    }

    #[test]
    fn test_basic_put_get() {
        let cache = PageCache::new(1024 * 1024, 10);

        let outcome = cache.put(key(1), page_bitmap());
        assert_eq!(outcome, PutOutcome::Inserted { evicted: vec![] });

        let entry = cache.get(&key(1)).expect("Page should be in cache");
        assert_eq!(entry.key, key(1));
        assert_eq!(entry.bitmap.dimensions(), (256, 256));
        assert_eq!(entry.memory_bytes, PAGE_BYTES);
        assert_eq!(entry.access_count, 1);
    }

    #[test]
    fn test_cache_miss() {
        let cache = PageCache::new(1024 * 1024, 10);

        assert!(cache.get(&key(999)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_access_count_increments() {
        let cache = PageCache::new(1024 * 1024, 10);
        cache.put(key(1), page_bitmap());

        cache.get(&key(1));
        cache.get(&key(1));
        let entry = cache.get(&key(1)).unwrap();
        assert_eq!(entry.access_count, 3);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = PageCache::new(2 * PAGE_BYTES, 10);

        cache.put(key(1), page_bitmap());
        cache.put(key(2), page_bitmap());
        let outcome = cache.put(key(3), page_bitmap()); // Should evict page 1

        assert_eq!(outcome, PutOutcome::Inserted { evicted: vec![key(1)] });
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_ordering() {
        let cache = PageCache::new(2 * PAGE_BYTES, 10);

        cache.put(key(1), page_bitmap());
        cache.put(key(2), page_bitmap());

        // Read page 1 so it becomes most recently used
        assert!(cache.get(&key(1)).is_some());

        // Page 2 is now the least recently used
        cache.put(key(3), page_bitmap());

        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
    }

    #[test]
    fn test_contains_has_no_side_effects() {
        let cache = PageCache::new(2 * PAGE_BYTES, 10);

        cache.put(key(1), page_bitmap());
        cache.put(key(2), page_bitmap());

        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(999)));

        // contains() must not refresh page 1, so it is still evicted first
        cache.put(key(3), page_bitmap());
        assert!(!cache.contains(&key(1)));

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_remove() {
        let cache = PageCache::new(1024 * 1024, 10);

        cache.put(key(1), page_bitmap());
        assert!(cache.remove(&key(1)).is_some());
        assert!(!cache.contains(&key(1)));
        assert_eq!(cache.memory_used(), 0);

        // Removing again should return None
        assert!(cache.remove(&key(1)).is_none());
    }

    #[test]
    fn test_remove_page_drops_all_renditions() {
        let cache = PageCache::new(4 * PAGE_BYTES, 10);

        cache.put(PageKey::new(1, 1.0, Rotation::Deg0), page_bitmap());
        cache.put(PageKey::new(1, 2.0, Rotation::Deg0), page_bitmap());
        cache.put(PageKey::new(1, 1.0, Rotation::Deg90), page_bitmap());
        cache.put(key(2), page_bitmap());

        assert_eq!(cache.remove_page(1), 3);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_used(), PAGE_BYTES);
    }

    #[test]
    fn test_clear() {
        let cache = PageCache::new(1024 * 1024, 10);

        cache.put(key(1), page_bitmap());
        cache.put(key(2), page_bitmap());
        cache.put(key(3), page_bitmap());
        assert_eq!(cache.len(), 3);

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.memory_used(), 0);
        assert!(!cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert!(!cache.contains(&key(3)));
    }

    #[test]
    fn test_stats() {
        let cache = PageCache::new(1024 * 1024, 10);

        cache.put(key(1), page_bitmap());

        // One hit
        let _ = cache.get(&key(1));
        // Two misses
        let _ = cache.get(&key(2));
        let _ = cache.get(&key(3));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.memory_used, PAGE_BYTES);

        // Hit ratio should be 1/3
        assert!((stats.hit_ratio() - 0.333).abs() < 0.01);
    }

    #[test]
    fn test_hit_ratio_without_lookups() {
        let cache = PageCache::default();
        assert_eq!(cache.hit_ratio(), 0.0);
    }

    #[test]
    fn test_memory_tracking() {
        let cache = PageCache::new(1024 * 1024, 10);

        cache.put(key(1), page_bitmap());
        assert_eq!(cache.memory_used(), PAGE_BYTES);

        cache.put(key(2), PageBitmap::new(100, 50));
        assert_eq!(cache.memory_used(), PAGE_BYTES + 100 * 50 * 4);

        cache.remove(&key(1));
        assert_eq!(cache.memory_used(), 100 * 50 * 4);
    }

    #[test]
    fn test_set_memory_limit() {
        let cache = PageCache::new(1024 * 1024, 10);

        cache.put(key(1), page_bitmap());
        cache.put(key(2), page_bitmap());
        cache.put(key(3), page_bitmap());

        let evicted = cache.set_memory_limit(2 * PAGE_BYTES);

        assert_eq!(evicted, vec![key(1)]);
        assert_eq!(cache.len(), 2);
        assert!(cache.memory_used() <= 2 * PAGE_BYTES);
    }

    #[test]
    fn test_set_max_items_evicts_immediately() {
        let cache = PageCache::new(1024 * 1024 * 1024, 10);

        for page in 0..5 {
            cache.put(key(page), page_bitmap());
        }
        cache.get(&key(0));

        let evicted = cache.set_max_items(2);

        // Page 0 was read last, so it survives along with page 4
        assert_eq!(evicted, vec![key(1), key(2), key(3)]);
        assert!(cache.contains(&key(0)));
        assert!(cache.contains(&key(4)));
        assert_eq!(cache.max_items(), 2);
    }

    #[test]
    fn test_item_budget_on_put() {
        let cache = PageCache::new(1024 * 1024 * 1024, 2);

        cache.put(key(1), page_bitmap());
        cache.put(key(2), page_bitmap());
        let outcome = cache.put(key(3), page_bitmap());

        assert_eq!(outcome, PutOutcome::Inserted { evicted: vec![key(1)] });
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_max_items_clamped() {
        let cache = PageCache::new(1024 * 1024, 0);
        assert_eq!(cache.max_items(), 1);

        cache.set_max_items(0);
        assert_eq!(cache.max_items(), 1);
    }

    #[test]
    fn test_update_existing_page() {
        let cache = PageCache::new(1024 * 1024, 10);

        cache.put(key(1), page_bitmap());
        cache.put(key(1), PageBitmap::new(128, 128)); // Same key

        // Should only have one entry, sized by the new bitmap
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_used(), 128 * 128 * 4);
        assert_eq!(cache.get(&key(1)).unwrap().bitmap.dimensions(), (128, 128));
    }

    #[test]
    fn test_oversized_page_not_cached() {
        let cache = PageCache::new(PAGE_BYTES, 10);

        cache.put(key(1), PageBitmap::new(16, 16));
        let outcome = cache.put(key(2), PageBitmap::new(512, 512));

        assert_eq!(
            outcome,
            PutOutcome::TooLarge {
                memory_bytes: 512 * 512 * 4
            }
        );
        assert!(!cache.contains(&key(2)));
        // The existing page is left alone
        assert!(cache.contains(&key(1)));
    }

    #[test]
    fn test_default_cache() {
        let cache = PageCache::default();
        assert_eq!(cache.memory_limit(), 512 * 1024 * 1024);
        assert_eq!(cache.max_items(), 100);
    }

    #[test]
    fn test_with_mb_limit() {
        let cache = PageCache::with_mb_limit(100, 10);
        assert_eq!(cache.memory_limit(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_concurrent_access() {
        use rand::Rng;
        use std::thread;

        let cache = Arc::new(PageCache::new(8 * PAGE_BYTES, 100));
        let mut handles = vec![];

        for _ in 0..4 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..200 {
                    let page = rng.gen_range(0..32);
                    if rng.gen_bool(0.5) {
                        cache.put(key(page), page_bitmap());
                    } else {
                        cache.get(&key(page));
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.memory_used() <= 8 * PAGE_BYTES);
        assert_eq!(cache.memory_used(), cache.len() * PAGE_BYTES);
    }

    proptest! {
        #[test]
        fn prop_memory_budget_holds_after_every_put(
            budget in 1usize..2_000_000,
            sizes in prop::collection::vec((1u32..400, 1u32..400), 1..60),
        ) {
            let cache = PageCache::new(budget, 1000);

            for (page, (width, height)) in sizes.into_iter().enumerate() {
                cache.put(key(page % 20), PageBitmap::new(width, height));
                prop_assert!(cache.memory_used() <= budget);

                let mut accounted = 0;
                for k in cache.keys() {
                    let entry = cache.get(&k).unwrap();
                    prop_assert_eq!(entry.memory_bytes, bitmap_memory_size(&entry.bitmap));
                    accounted += entry.memory_bytes;
                }
                prop_assert_eq!(accounted, cache.memory_used());
            }
        }

        #[test]
        fn prop_recently_read_page_survives_eviction(
            capacity in 2usize..10,
            read_index in 0usize..10,
        ) {
            let read_index = read_index % capacity;
            let cache = PageCache::new(capacity * PAGE_BYTES, 1000);

            for page in 0..capacity {
                cache.put(key(page), page_bitmap());
            }
            cache.get(&key(read_index));

            let outcome = cache.put(key(capacity), page_bitmap());

            prop_assert!(cache.contains(&key(read_index)));
            match outcome {
                PutOutcome::Inserted { evicted } => {
                    prop_assert_eq!(evicted.len(), 1);
                    prop_assert!(evicted[0] != key(read_index));
                }
                PutOutcome::TooLarge { .. } => prop_assert!(false, "page fits the budget"),
            }
        }

        #[test]
        fn prop_hit_ratio_in_unit_range(lookups in prop::collection::vec(0usize..8, 0..50)) {
            let cache = PageCache::new(8 * PAGE_BYTES, 100);
            cache.put(key(0), page_bitmap());
            cache.put(key(1), page_bitmap());

            for page in lookups {
                cache.get(&key(page));
                let ratio = cache.hit_ratio();
                prop_assert!((0.0..=1.0).contains(&ratio));
            }
        }

        #[test]
        fn prop_only_misses_drive_hit_ratio_to_zero(
            pages in prop::collection::vec(2usize..50, 1..50),
        ) {
            let cache = PageCache::new(8 * PAGE_BYTES, 100);
            cache.put(key(0), page_bitmap());
            cache.put(key(1), page_bitmap());

            for page in pages {
                prop_assert!(cache.get(&key(page)).is_none());
                prop_assert_eq!(cache.hit_ratio(), 0.0);
            }
        }

        #[test]
        fn prop_only_hits_drive_hit_ratio_to_one(
            pages in prop::collection::vec(0usize..2, 1..50),
        ) {
            let cache = PageCache::new(8 * PAGE_BYTES, 100);
            cache.put(key(0), page_bitmap());
            cache.put(key(1), page_bitmap());

            for page in pages {
                prop_assert!(cache.get(&key(page)).is_some());
                prop_assert_eq!(cache.hit_ratio(), 1.0);
            }
        }

        #[test]
        fn prop_hit_ratio_tracks_hit_share(
            hits in 0usize..30,
            misses in 0usize..30,
        ) {
            let cache = PageCache::new(8 * PAGE_BYTES, 100);
            cache.put(key(0), page_bitmap());

            for _ in 0..hits {
                cache.get(&key(0));
            }
            for _ in 0..misses {
                cache.get(&key(1));
            }

            let expected = if hits + misses == 0 {
                0.0
            } else {
                hits as f64 / (hits + misses) as f64
            };
            prop_assert!((cache.hit_ratio() - expected).abs() < 1e-9);
        }
    }
}
