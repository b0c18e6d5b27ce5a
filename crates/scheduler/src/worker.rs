//! Render worker pool for parallel page rendering.
//!
//! Workers block on the shared [`RenderQueue`], run each request through the
//! executor callback and mark it finished. Shutdown waits a bounded time for
//! workers to exit; workers still busy after that are signalled through the
//! pool's cancellation token and detached.

use crate::{CancellationToken, RenderQueue, RenderRequest};
use log::{debug, warn};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback function for request execution.
///
/// Workers invoke this callback for each request they pull from the queue.
/// The token is cancelled when the pool gives up waiting on shutdown; long
/// renders should check it and return early.
pub type RenderExecutor = Arc<dyn Fn(&RenderRequest, &CancellationToken) + Send + Sync>;

/// Configuration for the render worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: number of logical CPU cores.
    pub num_workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: ideal_parallelism(),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a new worker pool configuration. At least one worker is spawned.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
        }
    }
}

/// Outcome of [`WorkerPool::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited and were joined
    pub joined: usize,

    /// Workers still running when the timeout expired
    pub forced: usize,
}

impl ShutdownReport {
    /// Returns true if every worker exited within the timeout
    pub fn is_clean(&self) -> bool {
        self.forced == 0
    }
}

/// Count of worker threads that have not exited yet
///
/// Cloned handles observe the same count, so callers can keep watching
/// workers that a forced shutdown detached.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    inner: Arc<(Mutex<usize>, Condvar)>,
}

impl Liveness {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live worker threads
    pub fn count(&self) -> usize {
        *self.lock()
    }

    /// Wait until every worker has exited
    ///
    /// Returns false if workers are still alive after `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut live = self.lock();

        while *live > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = self
                .inner
                .1
                .wait_timeout(live, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            live = guard;
        }
        true
    }

    fn enter(&self) -> LiveGuard {
        *self.lock() += 1;
        LiveGuard {
            liveness: self.clone(),
        }
    }
}

/// Decrements the live count when the worker thread ends, panicking or not
struct LiveGuard {
    liveness: Liveness,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut live = self.liveness.lock();
        *live = live.saturating_sub(1);
        self.liveness.inner.1.notify_all();
    }
}

/// Render worker pool for parallel request execution.
///
/// Every worker pulls from the same queue, so the most urgent request is
/// always picked next regardless of which worker is idle.
pub struct WorkerPool {
    queue: Arc<RenderQueue>,
    workers: Vec<JoinHandle<()>>,
    token: CancellationToken,
    liveness: Liveness,
}

impl WorkerPool {
    /// Create and start a new worker pool.
    ///
    /// The queue is reopened if a previous pool shut it down.
    pub fn new(
        queue: Arc<RenderQueue>,
        executor: RenderExecutor,
        config: WorkerPoolConfig,
    ) -> io::Result<Self> {
        queue.reopen();

        let token = CancellationToken::new();
        let liveness = Liveness::default();
        let mut pool = Self {
            queue,
            workers: Vec::with_capacity(config.num_workers),
            token,
            liveness,
        };

        for id in 0..config.num_workers {
            let guard = pool.liveness.enter();
            let queue = pool.queue.clone();
            let executor = executor.clone();
            let token = pool.token.clone();

            let handle = thread::Builder::new()
                .name(format!("prerender-worker-{}", id))
                .spawn(move || {
                    let _guard = guard;
                    run(id, &queue, &executor, &token);
                });

            match handle {
                Ok(handle) => pool.workers.push(handle),
                Err(error) => {
                    pool.queue.shutdown();
                    return Err(error);
                }
            }
        }

        debug!("Started {} prerender workers", pool.workers.len());
        Ok(pool)
    }

    /// Get the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Number of worker threads that have not exited
    pub fn live_workers(&self) -> usize {
        self.liveness.count()
    }

    /// Handle for observing worker liveness after the pool is gone
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Check if the worker pool is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shut_down()
    }

    /// Stop the workers, waiting at most `timeout`.
    ///
    /// Workers finish the request they are running and exit. Pending
    /// requests stay in the queue. Workers still alive when the timeout
    /// expires have their token cancelled and are detached.
    pub fn shutdown(mut self, timeout: Duration) -> ShutdownReport {
        self.queue.shutdown();
        let workers = std::mem::take(&mut self.workers);

        if self.liveness.wait_idle(timeout) {
            let joined = workers.len();
            for handle in workers {
                if handle.join().is_err() {
                    warn!("Prerender worker exited with a panic");
                }
            }
            debug!("Stopped {} prerender workers", joined);
            return ShutdownReport { joined, forced: 0 };
        }

        self.token.cancel();

        let total = workers.len();
        let mut joined = 0;
        for handle in workers {
            if handle.is_finished() {
                let _ = handle.join();
                joined += 1;
            }
        }

        let forced = total - joined;
        warn!(
            "{} prerender workers did not stop within {:?}; detaching",
            forced, timeout
        );
        ShutdownReport { joined, forced }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.queue.shutdown();
            self.token.cancel();
        }
    }
}

/// Main worker loop.
///
/// A detached worker exits after its current request instead of joining
/// the next pool that reopens the queue.
fn run(id: usize, queue: &RenderQueue, executor: &RenderExecutor, token: &CancellationToken) {
    while !token.is_cancelled() {
        let Some(request) = queue.next_blocking() else {
            break;
        };
        if !token.is_cancelled() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| executor(&request, token)));
            if result.is_err() {
                warn!("Prerender worker {} panicked on page {}", id, request.key);
            }
        }
        queue.finish(&request);
    }
}

/// Get the number of logical CPU cores.
///
/// This is used as the default number of worker threads.
pub fn ideal_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
