//! Prerender Scheduler Library
//!
//! Shared render queue and worker pool for off-thread page rendering.
//!
//! All workers pull from one [`RenderQueue`]. Requests are served in priority
//! order (lower value first, FIFO among equals), and a request identity is
//! never queued twice at the same time.
//!
//! # Example
//!
//! ```
//! use prerender_render::Rotation;
//! use prerender_scheduler::{
//!     CancellationToken, RenderExecutor, RenderQueue, RenderRequest, WorkerPool,
//!     WorkerPoolConfig,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let queue = Arc::new(RenderQueue::new());
//!
//! let executor: RenderExecutor = Arc::new(|request: &RenderRequest, token: &CancellationToken| {
//!     if token.is_cancelled() {
//!         return;
//!     }
//!     println!("Rendering page {}", request.page());
//! });
//!
//! let pool = WorkerPool::new(queue.clone(), executor, WorkerPoolConfig::new(2)).unwrap();
//!
//! queue.submit(RenderRequest::new(5, 1.0, Rotation::Deg0, 1));
//!
//! // Blocks for at most one second
//! let report = pool.shutdown(Duration::from_secs(1));
//! assert_eq!(report.forced, 0);
//! ```

mod cancel;
mod queue;
mod request;
mod worker;

// Re-export public API
pub use cancel::CancellationToken;
pub use queue::{QueueStats, RenderQueue, SubmitOutcome};
pub use request::RenderRequest;
pub use worker::{
    ideal_parallelism, Liveness, RenderExecutor, ShutdownReport, WorkerPool, WorkerPoolConfig,
};
