//! Prerender coordinator
//!
//! [`Prerenderer`] ties the predictor, the shared render queue, the worker
//! pool and the page cache together. It is owned by one thread (usually the
//! UI thread); workers never touch its state directly. They send finished
//! renders back over a channel, and the owning thread folds them into the
//! cache when it calls [`Prerenderer::poll`].
//!
//! Every document change bumps a generation counter. Results rendered
//! against an older generation are discarded instead of cached.

use std::io;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use prerender_cache::PageCache;
use prerender_render::{
    is_valid_scale, render_page, Document, PageBitmap, PageKey, RenderBackend, RenderError,
    RenderResult, Rotation,
};
use prerender_scheduler::{
    CancellationToken, Liveness, RenderExecutor, RenderQueue, RenderRequest, ShutdownReport,
    SubmitOutcome, WorkerPool, WorkerPoolConfig,
};

use crate::config::{clamp_worker_threads, PrerenderConfig};
use crate::error::{PrerenderError, PrerenderResult};
use crate::events::PrerenderEvent;
use crate::predictor::{Predictor, PrerenderStrategy, ScrollDirection};
use crate::stats::PrerenderStats;

/// How often `wait_for_completions` rechecks whether work remains
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Result of [`Prerenderer::request_prerender`]
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The request was added to the render queue
    Queued,

    /// The page is already cached at this scale and rotation
    AlreadyCached,

    /// An equal request is already queued or being rendered
    AlreadyQueued,

    /// The request was invalid and never entered the queue
    Rejected(PrerenderError),
}

impl RequestOutcome {
    /// Returns true if the request was queued
    pub fn is_queued(&self) -> bool {
        matches!(self, RequestOutcome::Queued)
    }
}

/// Document shared with the workers, tagged with its generation
struct DocumentSlot {
    document: Option<Arc<dyn Document>>,
    generation: u64,
}

/// A finished render on its way back to the coordinator
struct RenderOutcome {
    key: PageKey,
    generation: u64,
    result: RenderResult<PageBitmap>,
}

/// State the worker threads share with the coordinator
struct WorkerContext {
    backend: Arc<dyn RenderBackend>,
    document: RwLock<DocumentSlot>,

    /// Held around backend calls when the backend is not thread-safe
    serial: Mutex<()>,

    device_pixel_ratio: f64,
    results: flume::Sender<RenderOutcome>,
}

impl WorkerContext {
    fn snapshot(&self) -> (Option<Arc<dyn Document>>, u64) {
        let slot = self.document.read().unwrap_or_else(PoisonError::into_inner);
        (slot.document.clone(), slot.generation)
    }

    fn render(&self, document: &dyn Document, key: &PageKey) -> RenderResult<PageBitmap> {
        if self.backend.is_thread_safe() {
            render_page(self.backend.as_ref(), document, key, self.device_pixel_ratio)
        } else {
            let _serial = self.serial.lock().unwrap_or_else(PoisonError::into_inner);
            render_page(self.backend.as_ref(), document, key, self.device_pixel_ratio)
        }
    }

    fn execute(&self, request: &RenderRequest, token: &CancellationToken) {
        let (document, generation) = self.snapshot();
        let result = match document {
            Some(document) => self.render(document.as_ref(), &request.key),
            None => Err(RenderError::DocumentUnavailable),
        };

        if token.is_cancelled() {
            debug!("Dropping render of {} after shutdown", request.key);
            return;
        }

        // The receiver only goes away with the coordinator
        let _ = self.results.send(RenderOutcome {
            key: request.key,
            generation,
            result,
        });
    }
}

#[derive(Debug, Default)]
struct Counters {
    queued: u64,
    rendered: u64,
    failed: u64,
    discarded: u64,
}

/// Predictive page prerenderer
///
/// # Example
///
/// ```
/// use prerender_core::{Prerenderer, PrerenderConfig, PrerenderEvent};
/// use prerender_render::{Document, PageBitmap, RenderBackend, RenderResult};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct Pages(usize);
///
/// impl Document for Pages {
///     fn page_count(&self) -> usize {
///         self.0
///     }
/// }
///
/// struct Blank;
///
/// impl RenderBackend for Blank {
///     fn render(&self, _: &dyn Document, _: usize, dpi_x: f64, dpi_y: f64) -> RenderResult<PageBitmap> {
///         Ok(PageBitmap::new(dpi_x as u32, dpi_y as u32))
///     }
/// }
///
/// let mut prerenderer = Prerenderer::new(Arc::new(Blank), PrerenderConfig::default());
/// let events = prerenderer.subscribe();
///
/// prerenderer.set_document(Some(Arc::new(Pages(20))));
/// prerenderer.start().unwrap();
///
/// assert!(prerenderer.request_prerender(5, 1.0, 0, 1).is_queued());
/// prerenderer.wait_for_completions(Duration::from_secs(5));
///
/// assert!(prerenderer.has_prerendered_page(5, 1.0, 0));
/// assert!(events.try_iter().any(|event| matches!(event, PrerenderEvent::PagePrerendered { page: 5, .. })));
///
/// prerenderer.stop();
/// ```
pub struct Prerenderer {
    config: PrerenderConfig,
    context: Arc<WorkerContext>,
    results: flume::Receiver<RenderOutcome>,

    document: Option<Arc<dyn Document>>,
    generation: u64,

    cache: PageCache,
    queue: Arc<RenderQueue>,
    pool: Option<WorkerPool>,
    worker_threads: usize,

    /// Workers a forced shutdown left running
    detached: Vec<Liveness>,

    predictor: Predictor,
    view_scale: f64,
    view_rotation: Rotation,
    paused: bool,

    /// When the debounced post-scroll prediction is due
    rescan_at: Option<Instant>,
    last_analysis: Instant,

    subscribers: Vec<flume::Sender<PrerenderEvent>>,
    counters: Counters,
}

impl Prerenderer {
    /// Create a stopped prerenderer with no document.
    pub fn new(backend: Arc<dyn RenderBackend>, mut config: PrerenderConfig) -> Self {
        if !(config.device_pixel_ratio.is_finite() && config.device_pixel_ratio > 0.0) {
            warn!(
                "Ignoring invalid device pixel ratio {}",
                config.device_pixel_ratio
            );
            config.device_pixel_ratio = 1.0;
        }

        let (sender, results) = flume::unbounded();
        let context = Arc::new(WorkerContext {
            backend,
            document: RwLock::new(DocumentSlot {
                document: None,
                generation: 0,
            }),
            serial: Mutex::new(()),
            device_pixel_ratio: config.device_pixel_ratio,
            results: sender,
        });

        let predictor = Predictor::new(config.strategy)
            .with_lookahead_radius(config.effective_lookahead_radius());

        Self {
            cache: PageCache::new(config.max_memory_bytes, config.max_cache_items),
            queue: Arc::new(RenderQueue::new()),
            pool: None,
            worker_threads: config.effective_worker_threads(),
            detached: Vec::new(),
            context,
            results,
            document: None,
            generation: 0,
            predictor,
            view_scale: 1.0,
            view_rotation: Rotation::Deg0,
            paused: false,
            rescan_at: None,
            last_analysis: Instant::now(),
            subscribers: Vec::new(),
            counters: Counters::default(),
            config,
        }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&mut self) -> flume::Receiver<PrerenderEvent> {
        let (sender, receiver) = flume::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    fn emit(&mut self, event: PrerenderEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn emit_cache_changed(&mut self) {
        let items = self.cache.len();
        let bytes = self.cache.memory_used();
        self.emit(PrerenderEvent::CacheUpdated { items });
        self.emit(PrerenderEvent::MemoryUsageChanged { bytes });
    }

    // ---- document ----

    /// Switch to another document, or to none.
    ///
    /// Workers see the new document before the cache and queue are cleared.
    /// Setting the current document again does nothing. Learned navigation
    /// state is kept.
    pub fn set_document(&mut self, document: Option<Arc<dyn Document>>) {
        let same = match (&self.document, &document) {
            (Some(current), Some(new)) => Arc::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if same {
            return;
        }

        self.generation += 1;
        {
            let mut slot = self
                .context
                .document
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            slot.document = document.clone();
            slot.generation = self.generation;
        }
        self.document = document;

        let dropped = self.queue.clear();
        let stale = self.queue.release_in_flight();
        if stale > 0 {
            debug!("{} renders of the previous document still running", stale);
        }
        self.cache.clear();
        self.rescan_at = None;
        self.drain_completions();

        match &self.document {
            Some(document) if document.is_valid() => info!(
                "Prerendering document with {} pages ({} pending requests dropped)",
                document.page_count(),
                dropped
            ),
            Some(_) => warn!("Document is not valid; prerendering disabled"),
            None => info!("Document closed; prerendering disabled"),
        }

        self.emit_cache_changed();
    }

    /// The current document
    pub fn document(&self) -> Option<&Arc<dyn Document>> {
        self.document.as_ref()
    }

    /// Page count of the current document if it can be rendered
    fn usable_page_count(&self) -> Option<usize> {
        self.document
            .as_ref()
            .filter(|document| document.is_valid())
            .map(|document| document.page_count())
    }

    fn validate(&self, page: usize, scale: f64, rotation: i32) -> PrerenderResult<PageKey> {
        let page_count = self.usable_page_count().ok_or(PrerenderError::NoDocument)?;
        if page >= page_count {
            return Err(PrerenderError::PageOutOfRange { page, page_count });
        }
        if !is_valid_scale(scale) {
            return Err(PrerenderError::InvalidScale(scale));
        }
        let rotation =
            Rotation::from_degrees(rotation).ok_or(PrerenderError::InvalidRotation(rotation))?;
        Ok(PageKey::new(page, scale, rotation))
    }

    // ---- requests and cache access ----

    /// Queue one page for background rendering.
    ///
    /// Never blocks. Pages that are out of range, already cached, or
    /// already queued are not queued again.
    pub fn request_prerender(
        &mut self,
        page: usize,
        scale: f64,
        rotation: i32,
        priority: i32,
    ) -> RequestOutcome {
        self.drain_completions();

        let key = match self.validate(page, scale, rotation) {
            Ok(key) => key,
            Err(error) => {
                debug!("Rejected prerender of page {}: {}", page, error);
                return RequestOutcome::Rejected(error);
            }
        };

        if self.cache.contains(&key) {
            debug!("Page {} already cached", key);
            return RequestOutcome::AlreadyCached;
        }

        match self.queue.submit(RenderRequest::for_key(key, priority)) {
            SubmitOutcome::Queued => {
                self.counters.queued += 1;
                RequestOutcome::Queued
            }
            SubmitOutcome::AlreadyQueued | SubmitOutcome::InFlight => {
                RequestOutcome::AlreadyQueued
            }
        }
    }

    /// Cached bitmap for a page, counted as a cache hit or miss
    ///
    /// An invalid scale or rotation can never be cached and counts as a miss.
    pub fn get_cached_page(
        &self,
        page: usize,
        scale: f64,
        rotation: i32,
    ) -> Option<Arc<PageBitmap>> {
        match Rotation::from_degrees(rotation) {
            Some(rotation) if is_valid_scale(scale) => self
                .cache
                .get(&PageKey::new(page, scale, rotation))
                .map(|entry| entry.bitmap),
            _ => {
                self.cache.record_miss();
                None
            }
        }
    }

    /// Whether a page is cached, without touching its recency or the hit ratio
    pub fn has_prerendered_page(&self, page: usize, scale: f64, rotation: i32) -> bool {
        match Rotation::from_degrees(rotation) {
            Some(rotation) if is_valid_scale(scale) => {
                self.cache.contains(&PageKey::new(page, scale, rotation))
            }
            _ => false,
        }
    }

    /// Interactive path: return the cached page or render it right now.
    ///
    /// A miss renders on the calling thread and caches the result. A queued
    /// request for the same page is cancelled.
    ///
    /// # Errors
    /// Returns an error if no document is open, the request is invalid, or
    /// the backend fails.
    pub fn render_page_now(
        &mut self,
        page: usize,
        scale: f64,
        rotation: i32,
    ) -> PrerenderResult<Arc<PageBitmap>> {
        let key = self.validate(page, scale, rotation)?;

        if let Some(entry) = self.cache.get(&key) {
            return Ok(entry.bitmap);
        }

        self.queue.cancel(&key);

        let document = self.document.clone().ok_or(PrerenderError::NoDocument)?;
        let bitmap = Arc::new(self.context.render(document.as_ref(), &key)?);
        self.store(key, bitmap.clone());
        Ok(bitmap)
    }

    /// Drop queued requests for a page; renders already running finish
    pub fn cancel(&mut self, page: usize) -> usize {
        let cancelled = self.queue.cancel_page(page);
        if cancelled > 0 {
            debug!("Cancelled {} requests for page {}", cancelled, page);
        }
        cancelled
    }

    /// Put a bitmap in the cache and report the change
    fn store(&mut self, key: PageKey, bitmap: Arc<PageBitmap>) -> bool {
        match self.cache.put(key, bitmap) {
            prerender_cache::PutOutcome::Inserted { evicted } => {
                if !evicted.is_empty() {
                    debug!("Evicted {} pages to cache {}", evicted.len(), key);
                }
                self.emit_cache_changed();
                true
            }
            prerender_cache::PutOutcome::TooLarge { memory_bytes } => {
                warn!(
                    "Page {} needs {} bytes, more than the {} byte cache budget",
                    key,
                    memory_bytes,
                    self.cache.memory_limit()
                );
                false
            }
        }
    }

    fn handle_outcome(&mut self, outcome: RenderOutcome) {
        let RenderOutcome {
            key,
            generation,
            result,
        } = outcome;

        if generation != self.generation {
            self.counters.discarded += 1;
            debug!("Discarding {} rendered for a previous document", key);
            return;
        }

        match result {
            Ok(bitmap) => {
                let memory_bytes = prerender_cache::ram::bitmap_memory_size(&bitmap);
                if self.store(key, Arc::new(bitmap)) {
                    self.counters.rendered += 1;
                    self.emit(PrerenderEvent::PagePrerendered {
                        page: key.page,
                        scale: key.scale(),
                        rotation: key.rotation,
                    });
                } else {
                    self.counters.failed += 1;
                    self.emit(PrerenderEvent::PageFailed {
                        page: key.page,
                        reason: format!(
                            "bitmap of {} bytes exceeds the cache budget",
                            memory_bytes
                        ),
                    });
                }
            }
            Err(error) => {
                self.counters.failed += 1;
                warn!("Prerender of page {} failed: {}", key, error);
                self.emit(PrerenderEvent::PageFailed {
                    page: key.page,
                    reason: error.to_string(),
                });
            }
        }
    }

    fn drain_completions(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(outcome) = self.results.try_recv() {
            self.handle_outcome(outcome);
            processed += 1;
        }
        processed
    }

    // ---- event loop ----

    /// Fold finished renders into the cache and run due timers.
    ///
    /// Call this regularly from the owning thread. Returns the number of
    /// render results processed.
    pub fn poll(&mut self) -> usize {
        let processed = self.drain_completions();
        let now = Instant::now();

        if self.rescan_at.is_some_and(|due| now >= due) {
            self.rescan_at = None;
            if let Some(page) = self.predictor.current_page() {
                self.schedule_prerendering(page);
            }
        }

        if self.is_running()
            && !self.paused
            && now.duration_since(self.last_analysis) >= self.config.adaptive_interval()
        {
            self.last_analysis = now;
            if let Some(radius) = self.predictor.analyze_reading_patterns() {
                self.emit(PrerenderEvent::LookaheadRadiusChanged { radius });
            }
        }

        self.detached.retain(|liveness| liveness.count() > 0);
        processed
    }

    /// Poll until no request is pending or rendering, or `timeout` passes.
    ///
    /// Returns immediately when stopped or paused, since queued work cannot
    /// progress then. Returns the number of render results processed.
    pub fn wait_for_completions(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut processed = self.poll();

        loop {
            if self.queue.is_empty() && self.queue.in_flight() == 0 {
                return processed + self.drain_completions();
            }
            if !self.is_running() || self.paused {
                return processed;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return processed;
            }

            match self.results.recv_timeout(remaining.min(WAIT_SLICE)) {
                Ok(outcome) => {
                    self.handle_outcome(outcome);
                    processed += 1;
                }
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => return processed,
            }
        }
    }

    // ---- lifecycle ----

    /// Start the worker pool and the adaptive analysis timer.
    ///
    /// # Errors
    /// Returns an error if a worker thread cannot be spawned.
    pub fn start(&mut self) -> io::Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        self.spawn_pool()?;
        self.last_analysis = Instant::now();
        info!(
            "Prerendering started with {} workers ({} strategy)",
            self.worker_threads,
            self.predictor.strategy()
        );
        self.emit(PrerenderEvent::Started);
        Ok(())
    }

    fn spawn_pool(&mut self) -> io::Result<()> {
        let context = self.context.clone();
        let executor: RenderExecutor =
            Arc::new(move |request: &RenderRequest, token: &CancellationToken| {
                context.execute(request, token)
            });

        let pool = WorkerPool::new(
            self.queue.clone(),
            executor,
            WorkerPoolConfig::new(self.worker_threads),
        )?;
        self.pool = Some(pool);
        Ok(())
    }

    fn shutdown_pool(&mut self) -> ShutdownReport {
        let Some(pool) = self.pool.take() else {
            return ShutdownReport::default();
        };

        let liveness = pool.liveness();
        let report = pool.shutdown(self.config.shutdown_timeout());
        if !report.is_clean() {
            // Detached workers must not keep their pages from being requested again
            self.queue.release_in_flight();
            self.detached.push(liveness);
        }
        report
    }

    /// Stop the workers and drop pending requests.
    ///
    /// Blocks for at most the configured shutdown timeout. Workers still
    /// rendering after that are detached; their results are dropped.
    pub fn stop(&mut self) -> ShutdownReport {
        if self.pool.is_none() {
            return ShutdownReport::default();
        }

        let dropped = self.queue.clear();
        let report = self.shutdown_pool();
        self.rescan_at = None;
        self.drain_completions();

        info!(
            "Prerendering stopped ({} pending requests dropped, {} workers detached)",
            dropped, report.forced
        );
        self.emit(PrerenderEvent::Stopped);
        report
    }

    /// Stop handing new requests to workers; running renders complete
    pub fn pause(&mut self) {
        self.queue.pause();
        self.paused = true;
        debug!("Prerendering paused");
    }

    /// Resume dispatching queued requests
    pub fn resume(&mut self) {
        self.queue.resume();
        self.paused = false;
        debug!("Prerendering resumed");
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Worker threads still alive, including ones a forced stop detached
    pub fn live_workers(&self) -> usize {
        let pooled = self.pool.as_ref().map_or(0, WorkerPool::live_workers);
        pooled
            + self
                .detached
                .iter()
                .map(Liveness::count)
                .sum::<usize>()
    }

    // ---- configuration ----

    pub fn config(&self) -> &PrerenderConfig {
        &self.config
    }

    pub fn strategy(&self) -> PrerenderStrategy {
        self.predictor.strategy()
    }

    pub fn set_strategy(&mut self, strategy: PrerenderStrategy) {
        self.config.strategy = strategy;
        self.predictor.set_strategy(strategy);
    }

    pub fn max_worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Change the worker count, clamped to `[1, ideal_parallelism()]`.
    ///
    /// A running pool is restarted with the new size; pending requests are
    /// kept.
    pub fn set_max_worker_threads(&mut self, threads: usize) {
        let threads = clamp_worker_threads(threads);
        self.config.max_worker_threads = threads;
        if threads == self.worker_threads {
            return;
        }
        self.worker_threads = threads;

        if self.pool.is_some() {
            self.shutdown_pool();
            if let Err(error) = self.spawn_pool() {
                warn!("Failed to restart prerender workers: {}", error);
                self.emit(PrerenderEvent::Stopped);
                return;
            }
            info!("Prerender workers resized to {}", threads);
        }
    }

    /// Change the cache item budget, evicting at once if needed
    pub fn set_max_cache_size(&mut self, items: usize) {
        self.config.max_cache_items = items;
        let evicted = self.cache.set_max_items(items);
        if !evicted.is_empty() {
            debug!("Evicted {} pages after shrinking the item budget", evicted.len());
            self.emit_cache_changed();
        }
    }

    /// Change the cache memory budget, evicting at once if needed
    pub fn set_max_memory_budget(&mut self, bytes: usize) {
        self.config.max_memory_bytes = bytes;
        let evicted = self.cache.set_memory_limit(bytes);
        if !evicted.is_empty() {
            debug!("Evicted {} pages after shrinking the memory budget", evicted.len());
            self.emit_cache_changed();
        }
    }

    /// Scale and rotation used by `schedule_prerendering`
    ///
    /// Returns false and keeps the old values if `scale` is invalid.
    pub fn set_view_parameters(&mut self, scale: f64, rotation: Rotation) -> bool {
        if !is_valid_scale(scale) {
            warn!("Ignoring invalid view scale {}", scale);
            return false;
        }
        self.view_scale = scale;
        self.view_rotation = rotation;
        true
    }

    pub fn view_parameters(&self) -> (f64, Rotation) {
        (self.view_scale, self.view_rotation)
    }

    // ---- prediction ----

    /// Predict pages around `current_page` and queue them.
    ///
    /// Returns the number of requests queued.
    pub fn schedule_prerendering(&mut self, current_page: usize) -> usize {
        let Some(page_count) = self.usable_page_count() else {
            return 0;
        };

        let pages = self.predictor.predict_next_pages(current_page, page_count);
        let scale = self.view_scale;
        let rotation = self.view_rotation.degrees();

        let mut queued = 0;
        for page in pages {
            let priority = self.predictor.calculate_priority(page, current_page);
            if self
                .request_prerender(page, scale, rotation, priority)
                .is_queued()
            {
                queued += 1;
            }
        }

        debug!(
            "Scheduled {} pages around page {} ({})",
            queued,
            current_page,
            self.predictor.strategy()
        );
        queued
    }

    /// Record that `page` was on screen for `duration_millis`
    pub fn on_page_viewed(&mut self, page: usize, duration_millis: u64) {
        self.predictor.on_page_viewed(page, duration_millis);
    }

    /// Record a navigation between pages
    pub fn on_navigation(&mut self, from: usize, to: usize) {
        self.predictor.on_navigation(from, to);
    }

    /// Update the scroll direction.
    ///
    /// A nonzero direction schedules a prediction for the current page once
    /// the debounce delay has passed; see [`Prerenderer::poll`].
    pub fn on_scroll_direction_changed(&mut self, direction: impl Into<ScrollDirection>) {
        let direction = direction.into();
        self.predictor.set_scroll_direction(direction);

        if direction != ScrollDirection::None {
            self.rescan_at = Some(Instant::now() + self.config.scroll_debounce());
        }
    }

    pub fn lookahead_radius(&self) -> usize {
        self.predictor.lookahead_radius()
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Forget navigation patterns and access history
    pub fn reset_learning(&mut self) {
        self.predictor.reset_learning();
        info!("Prerender learning state reset");
    }

    // ---- statistics ----

    pub fn hit_ratio(&self) -> f64 {
        self.cache.hit_ratio()
    }

    pub fn stats(&self) -> PrerenderStats {
        let cache = self.cache.stats();
        let queue = self.queue.stats();

        PrerenderStats {
            cache_items: cache.item_count,
            memory_used: cache.memory_used,
            memory_limit: cache.memory_limit,
            max_items: cache.max_items,
            hits: cache.hits,
            misses: cache.misses,
            hit_ratio: cache.hit_ratio(),
            evictions: cache.evictions,
            queued: self.counters.queued,
            pending: queue.pending,
            in_flight: queue.in_flight,
            rendered: self.counters.rendered,
            failed: self.counters.failed,
            discarded: self.counters.discarded,
            lookahead_radius: self.predictor.lookahead_radius(),
            strategy: self.predictor.strategy(),
            workers: self.worker_threads,
            live_workers: self.live_workers(),
            running: self.is_running(),
            paused: self.paused,
        }
    }
}

impl Drop for Prerenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Pages(usize);

    impl Document for Pages {
        fn page_count(&self) -> usize {
            self.0
        }
    }

    struct Closed;

    impl Document for Closed {
        fn page_count(&self) -> usize {
            10
        }

        fn is_valid(&self) -> bool {
            false
        }
    }

    /// Renders a page as a dpi-sized square and counts calls
    #[derive(Default)]
    struct SquareBackend {
        calls: AtomicUsize,
    }

    impl RenderBackend for SquareBackend {
        fn render(
            &self,
            _document: &dyn Document,
            _page: usize,
            dpi_x: f64,
            dpi_y: f64,
        ) -> RenderResult<PageBitmap> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PageBitmap::new(dpi_x as u32, dpi_y as u32))
        }
    }

    fn test_config() -> PrerenderConfig {
        PrerenderConfig::default()
            .with_max_worker_threads(2)
            .with_scroll_debounce(Duration::ZERO)
    }

    fn prerenderer_with_pages(pages: usize) -> (Prerenderer, Arc<SquareBackend>) {
        let backend = Arc::new(SquareBackend::default());
        let mut prerenderer = Prerenderer::new(backend.clone(), test_config());
        prerenderer.set_document(Some(Arc::new(Pages(pages))));
        (prerenderer, backend)
    }

    #[test]
    fn test_request_without_document_is_rejected() {
        let mut prerenderer = Prerenderer::new(Arc::new(SquareBackend::default()), test_config());
        assert_eq!(
            prerenderer.request_prerender(0, 1.0, 0, 1),
            RequestOutcome::Rejected(PrerenderError::NoDocument)
        );
    }

    #[test]
    fn test_request_validation() {
        let (mut prerenderer, _) = prerenderer_with_pages(10);

        assert_eq!(
            prerenderer.request_prerender(10, 1.0, 0, 1),
            RequestOutcome::Rejected(PrerenderError::PageOutOfRange {
                page: 10,
                page_count: 10
            })
        );
        assert_eq!(
            prerenderer.request_prerender(1, 0.0, 0, 1),
            RequestOutcome::Rejected(PrerenderError::InvalidScale(0.0))
        );
        assert_eq!(
            prerenderer.request_prerender(1, 1.0, 45, 1),
            RequestOutcome::Rejected(PrerenderError::InvalidRotation(45))
        );
        assert_eq!(prerenderer.stats().pending, 0);
    }

    #[test]
    fn test_duplicate_requests_queue_once() {
        let (mut prerenderer, _) = prerenderer_with_pages(10);

        assert_eq!(prerenderer.request_prerender(3, 1.0, 0, 2), RequestOutcome::Queued);
        assert_eq!(
            prerenderer.request_prerender(3, 1.0, 0, 1),
            RequestOutcome::AlreadyQueued
        );
        // Scale noise below a thousandth is the same request
        assert_eq!(
            prerenderer.request_prerender(3, 1.0004, 0, 1),
            RequestOutcome::AlreadyQueued
        );
        assert_eq!(prerenderer.stats().pending, 1);
    }

    #[test]
    fn test_invalid_document_disables_prerendering() {
        let mut prerenderer = Prerenderer::new(Arc::new(SquareBackend::default()), test_config());
        prerenderer.set_document(Some(Arc::new(Closed)));

        assert_eq!(
            prerenderer.request_prerender(1, 1.0, 0, 1),
            RequestOutcome::Rejected(PrerenderError::NoDocument)
        );
        assert_eq!(prerenderer.schedule_prerendering(1), 0);
    }

    #[test]
    fn test_get_cached_page_counts_every_lookup() {
        let (mut prerenderer, _) = prerenderer_with_pages(10);
        prerenderer.render_page_now(1, 1.0, 0).unwrap();

        assert!(prerenderer.get_cached_page(1, 1.0, 0).is_some());
        assert!(prerenderer.get_cached_page(2, 1.0, 0).is_none());
        assert!(prerenderer.get_cached_page(1, 1.0, 45).is_none());
        assert!(prerenderer.get_cached_page(1, -1.0, 0).is_none());

        let stats = prerenderer.stats();
        assert_eq!((stats.hits, stats.misses), (1, 4));
    }

    #[test]
    fn test_render_page_now_fills_cache() {
        let (mut prerenderer, backend) = prerenderer_with_pages(10);

        let bitmap = prerenderer.render_page_now(4, 2.0, 90).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (144, 144));
        assert!(prerenderer.has_prerendered_page(4, 2.0, 90));

        // Served from cache the second time
        prerenderer.render_page_now(4, 2.0, 90).unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(prerenderer.stats().hits, 1);
    }

    #[test]
    fn test_render_page_now_cancels_queued_request() {
        let (mut prerenderer, _) = prerenderer_with_pages(10);

        prerenderer.request_prerender(2, 1.0, 0, 1);
        prerenderer.render_page_now(2, 1.0, 0).unwrap();
        assert_eq!(prerenderer.stats().pending, 0);
        assert_eq!(
            prerenderer.request_prerender(2, 1.0, 0, 1),
            RequestOutcome::AlreadyCached
        );
    }

    #[test]
    fn test_render_page_now_errors() {
        let (mut prerenderer, _) = prerenderer_with_pages(3);
        assert!(matches!(
            prerenderer.render_page_now(3, 1.0, 0),
            Err(PrerenderError::PageOutOfRange { .. })
        ));

        prerenderer.set_document(None);
        assert!(matches!(
            prerenderer.render_page_now(0, 1.0, 0),
            Err(PrerenderError::NoDocument)
        ));
    }

    #[test]
    fn test_device_pixel_ratio_scales_dpi() {
        let backend = Arc::new(SquareBackend::default());
        let config = test_config().with_device_pixel_ratio(2.0);
        let mut prerenderer = Prerenderer::new(backend, config);
        prerenderer.set_document(Some(Arc::new(Pages(2))));

        let bitmap = prerenderer.render_page_now(0, 1.5, 0).unwrap();
        assert_eq!(bitmap.width(), 216);
    }

    #[test]
    fn test_cancel_queued_page() {
        let (mut prerenderer, _) = prerenderer_with_pages(10);

        prerenderer.request_prerender(5, 1.0, 0, 1);
        prerenderer.request_prerender(5, 2.0, 0, 1);
        prerenderer.request_prerender(6, 1.0, 0, 1);

        assert_eq!(prerenderer.cancel(5), 2);
        assert_eq!(prerenderer.stats().pending, 1);
    }

    #[test]
    fn test_set_document_same_is_noop() {
        let backend = Arc::new(SquareBackend::default());
        let mut prerenderer = Prerenderer::new(backend, test_config());
        let document: Arc<dyn Document> = Arc::new(Pages(5));

        prerenderer.set_document(Some(document.clone()));
        prerenderer.render_page_now(1, 1.0, 0).unwrap();

        prerenderer.set_document(Some(document));
        assert!(prerenderer.has_prerendered_page(1, 1.0, 0));
    }

    #[test]
    fn test_schedule_uses_view_parameters() {
        let (mut prerenderer, _) = prerenderer_with_pages(50);
        prerenderer.set_strategy(PrerenderStrategy::Conservative);
        assert!(prerenderer.set_view_parameters(1.5, Rotation::Deg180));
        assert!(!prerenderer.set_view_parameters(-1.0, Rotation::Deg0));

        assert_eq!(prerenderer.schedule_prerendering(10), 2);
        assert_eq!(
            prerenderer.request_prerender(11, 1.5, 180, 1),
            RequestOutcome::AlreadyQueued
        );
        assert_eq!(
            prerenderer.request_prerender(9, 1.5, 180, 1),
            RequestOutcome::AlreadyQueued
        );
    }

    #[test]
    fn test_scroll_direction_schedules_after_debounce() {
        let (mut prerenderer, _) = prerenderer_with_pages(50);
        prerenderer.set_strategy(PrerenderStrategy::Conservative);

        prerenderer.on_navigation(9, 10);
        prerenderer.on_scroll_direction_changed(1);
        assert_eq!(prerenderer.stats().pending, 0);

        prerenderer.poll();
        assert_eq!(prerenderer.stats().pending, 2);
    }

    #[test]
    fn test_scroll_direction_none_does_not_schedule() {
        let (mut prerenderer, _) = prerenderer_with_pages(50);

        prerenderer.on_navigation(9, 10);
        prerenderer.on_scroll_direction_changed(0);
        prerenderer.poll();
        assert_eq!(prerenderer.stats().pending, 0);
    }

    #[test]
    fn test_cache_budget_setters_evict() {
        let (mut prerenderer, _) = prerenderer_with_pages(10);
        let events = prerenderer.subscribe();

        for page in 0..4 {
            prerenderer.render_page_now(page, 1.0, 0).unwrap();
        }
        assert_eq!(prerenderer.stats().cache_items, 4);

        prerenderer.set_max_cache_size(2);
        assert_eq!(prerenderer.stats().cache_items, 2);
        assert!(prerenderer.has_prerendered_page(3, 1.0, 0));
        assert!(!prerenderer.has_prerendered_page(0, 1.0, 0));

        // 72x72 RGBA per page
        prerenderer.set_max_memory_budget(72 * 72 * 4);
        assert_eq!(prerenderer.stats().cache_items, 1);

        let last_items = events
            .try_iter()
            .filter_map(|event| match event {
                PrerenderEvent::CacheUpdated { items } => Some(items),
                _ => None,
            })
            .last();
        assert_eq!(last_items, Some(1));
    }

    #[test]
    fn test_set_max_worker_threads_clamps() {
        let (mut prerenderer, _) = prerenderer_with_pages(10);

        prerenderer.set_max_worker_threads(0);
        assert_eq!(prerenderer.max_worker_threads(), 1);

        prerenderer.set_max_worker_threads(usize::MAX);
        assert_eq!(
            prerenderer.max_worker_threads(),
            prerender_scheduler::ideal_parallelism()
        );
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let (mut prerenderer, _) = prerenderer_with_pages(10);
        let kept = prerenderer.subscribe();
        drop(prerenderer.subscribe());

        prerenderer.render_page_now(0, 1.0, 0).unwrap();
        assert_eq!(prerenderer.subscribers.len(), 1);
        assert!(kept.try_iter().count() > 0);
    }
}
