//! Shared render queue
//!
//! One priority queue consumed by every worker. Requests are ordered by
//! priority (lower value first), then by submission time, then by
//! submission order. Workers block on a condition variable while the queue
//! is empty or paused.
//!
//! A request identity is rejected at submission while an equal request is
//! pending or being rendered. [`RenderQueue::release_in_flight`] starts a new
//! epoch: renders dispatched before it no longer block resubmission, and
//! their late `finish` calls are ignored.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;
use prerender_render::PageKey;

use crate::request::RenderRequest;

/// Result of [`RenderQueue::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The request was added to the queue
    Queued,

    /// An equal request is already waiting in the queue
    AlreadyQueued,

    /// An equal request is currently being rendered
    InFlight,
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Requests accepted by `submit`
    pub submitted: u64,

    /// Requests rejected as duplicates
    pub duplicates: u64,

    /// Requests handed to workers
    pub dispatched: u64,

    /// Requests removed before a worker picked them up
    pub cancelled: u64,

    /// Requests currently waiting
    pub pending: usize,

    /// Requests currently being rendered
    pub in_flight: usize,
}

/// A queued request with its submission order
#[derive(Debug, Clone)]
struct QueuedRequest {
    request: RenderRequest,
    sequence: u64,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap, so every comparison is reversed:
        // lower priority value, earlier timestamp, earlier sequence wins.
        other
            .request
            .priority
            .cmp(&self.request.priority)
            .then_with(|| {
                other
                    .request
                    .enqueued_at_millis
                    .cmp(&self.request.enqueued_at_millis)
            })
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct QueueState {
    heap: BinaryHeap<QueuedRequest>,

    /// Identities waiting in `heap`
    pending: HashSet<PageKey>,

    /// Identities handed to a worker and not yet finished, with their epoch
    in_flight: HashMap<PageKey, u64>,

    epoch: u64,
    next_sequence: u64,
    paused: bool,
    shutdown: bool,
    stats: QueueStats,
}

impl QueueState {
    fn pop(&mut self) -> Option<RenderRequest> {
        let mut request = self.heap.pop()?.request;
        request.epoch = self.epoch;
        self.pending.remove(&request.key);
        self.in_flight.insert(request.key, self.epoch);
        self.stats.dispatched += 1;
        Some(request)
    }

    fn remove_if<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&RenderRequest) -> bool,
    {
        let original_len = self.heap.len();
        let pending = &mut self.pending;
        self.heap.retain(|queued| {
            if predicate(&queued.request) {
                pending.remove(&queued.request.key);
                false
            } else {
                true
            }
        });

        let removed = original_len - self.heap.len();
        self.stats.cancelled += removed as u64;
        removed
    }
}

/// Thread-safe priority queue of render requests
///
/// # Example
///
/// ```
/// use prerender_render::Rotation;
/// use prerender_scheduler::{RenderQueue, RenderRequest, SubmitOutcome};
///
/// let queue = RenderQueue::new();
///
/// queue.submit(RenderRequest::new(9, 1.0, Rotation::Deg0, 3));
/// queue.submit(RenderRequest::new(4, 1.0, Rotation::Deg0, 1));
///
/// // Duplicate identities are rejected
/// let outcome = queue.submit(RenderRequest::new(4, 1.0, Rotation::Deg0, 2));
/// assert_eq!(outcome, SubmitOutcome::AlreadyQueued);
///
/// // Most urgent first
/// assert_eq!(queue.try_next().unwrap().page(), 4);
/// ```
pub struct RenderQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl RenderQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                pending: HashSet::new(),
                in_flight: HashMap::new(),
                epoch: 0,
                next_sequence: 0,
                paused: false,
                shutdown: false,
                stats: QueueStats::default(),
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a request
    ///
    /// Never blocks beyond acquiring the lock. Wakes one idle worker if the
    /// request was queued.
    pub fn submit(&self, request: RenderRequest) -> SubmitOutcome {
        let mut state = self.lock();

        if state.pending.contains(&request.key) {
            state.stats.duplicates += 1;
            debug!("Page {} already queued", request.key);
            return SubmitOutcome::AlreadyQueued;
        }
        if state.in_flight.contains_key(&request.key) {
            state.stats.duplicates += 1;
            debug!("Page {} already rendering", request.key);
            return SubmitOutcome::InFlight;
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.pending.insert(request.key);
        state.heap.push(QueuedRequest { request, sequence });
        state.stats.submitted += 1;
        drop(state);

        self.available.notify_one();
        SubmitOutcome::Queued
    }

    /// Wait for the next request
    ///
    /// Blocks while the queue is empty or paused. Returns `None` once the
    /// queue has been shut down. The returned request counts as in flight
    /// until [`RenderQueue::finish`] is called with it.
    pub fn next_blocking(&self) -> Option<RenderRequest> {
        let mut state = self.lock();

        loop {
            if state.shutdown {
                return None;
            }
            if !state.paused {
                if let Some(request) = state.pop() {
                    return Some(request);
                }
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take the next request without blocking
    ///
    /// Ignores the paused flag. Returns `None` if the queue is empty or
    /// shut down.
    pub fn try_next(&self) -> Option<RenderRequest> {
        let mut state = self.lock();
        if state.shutdown {
            return None;
        }
        state.pop()
    }

    /// Mark an in-flight request as done
    ///
    /// Ignored for requests dispatched before the last
    /// [`RenderQueue::release_in_flight`].
    pub fn finish(&self, request: &RenderRequest) {
        let mut state = self.lock();
        if state.in_flight.get(&request.key) == Some(&request.epoch) {
            state.in_flight.remove(&request.key);
        }
    }

    /// Stop tracking every in-flight request
    ///
    /// Renders already running carry on, but equal requests can be queued
    /// again right away. Returns the number of requests released.
    pub fn release_in_flight(&self) -> usize {
        let mut state = self.lock();
        state.epoch += 1;
        let released = state.in_flight.len();
        state.in_flight.clear();
        released
    }

    /// Remove a pending request
    ///
    /// Has no effect on a request that a worker already took.
    pub fn cancel(&self, key: &PageKey) -> bool {
        self.lock().remove_if(|request| request.key == *key) > 0
    }

    /// Remove every pending request for a page
    ///
    /// Returns the number of requests removed.
    pub fn cancel_page(&self, page: usize) -> usize {
        self.lock().remove_if(|request| request.page() == page)
    }

    /// Remove all pending requests matching a predicate
    pub fn cancel_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RenderRequest) -> bool,
    {
        self.lock().remove_if(predicate)
    }

    /// Remove all pending requests
    pub fn clear(&self) -> usize {
        self.lock().remove_if(|_| true)
    }

    /// Remove and return all pending requests in dequeue order
    pub fn drain(&self) -> Vec<RenderRequest> {
        let mut state = self.lock();
        let heap = std::mem::take(&mut state.heap);
        state.pending.clear();
        heap.into_sorted_vec()
            .into_iter()
            .rev()
            .map(|queued| queued.request)
            .collect()
    }

    /// Returns true if an equal request is pending or in flight
    pub fn contains(&self, key: &PageKey) -> bool {
        let state = self.lock();
        state.pending.contains(key) || state.in_flight.contains_key(key)
    }

    /// Returns true if an equal request is waiting in the queue
    pub fn is_pending(&self, key: &PageKey) -> bool {
        self.lock().pending.contains(key)
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Returns true if no requests are pending
    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Number of requests currently being rendered
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Pending requests, in arbitrary order
    pub fn pending_requests(&self) -> Vec<RenderRequest> {
        self.lock().heap.iter().map(|queued| queued.request).collect()
    }

    /// Stop handing out requests; in-flight renders are unaffected
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    /// Resume handing out requests and wake all idle workers
    pub fn resume(&self) {
        self.lock().paused = false;
        self.available.notify_all();
    }

    /// Returns true while paused
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Make every waiting and future `next_blocking` call return `None`
    ///
    /// Pending requests stay in the queue.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.available.notify_all();
    }

    /// Accept workers again after a shutdown
    pub fn reopen(&self) {
        self.lock().shutdown = false;
        self.available.notify_all();
    }

    /// Returns true after `shutdown` and before `reopen`
    pub fn is_shut_down(&self) -> bool {
        self.lock().shutdown
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        let mut stats = state.stats;
        stats.pending = state.heap.len();
        stats.in_flight = state.in_flight.len();
        stats
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}
