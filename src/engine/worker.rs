//! Worker pool for asynchronous work groups.
//!
//! ## Purpose
//! Async work groups are dispatched to a bounded pool of worker threads; the
//! driver keeps a [`JobHandle`] per dispatch and joins them in dispatch
//! order at the end of the tick.
//!
//! ## Behavior
//! - `submit` never blocks: it hands the job to the pool and returns a
//!   handle backed by a single-slot channel.
//! - Submitting after [`WorkerPool::close`], or with an already-cancelled
//!   deadline, completes the handle immediately with the corresponding
//!   error; the job never runs.
//! - A worker that observes a cancelled deadline before starting its job
//!   reports cancellation without running it.
//!
//! ## Invariants
//! - Every returned handle eventually yields exactly one outcome.
//! - Outcomes carry the group summary even on failure, so observers see
//!   failed groups too.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{bounded, Receiver};

use crate::engine::commands::Command;
use crate::engine::error::{EngineError, WorkerPoolError};
use crate::engine::scheduler::WorkGroupSummary;
use crate::engine::types::DeadlineToken;

/// Result of one async work-group job.
pub(crate) struct JobOutcome {
    /// Summary to publish after the join, when the group actually ran.
    pub summary: Option<WorkGroupSummary>,
    /// Commands to apply on success; empty on failure.
    pub commands: Vec<Command>,
    /// Terminal error of the group, if any.
    pub error: Option<EngineError>,
}

impl JobOutcome {
    pub(crate) fn failed(error: EngineError) -> Self {
        Self { summary: None, commands: Vec::new(), error: Some(error) }
    }
}

/// Handle to a dispatched async job.
pub(crate) struct JobHandle {
    result: Receiver<JobOutcome>,
}

impl JobHandle {
    /// Wraps an already-completed outcome.
    pub(crate) fn ready(outcome: JobOutcome) -> Self {
        let (sender, result) = bounded(1);
        let _ = sender.send(outcome);
        Self { result }
    }

    /// Blocks until the job's outcome is available.
    ///
    /// A worker that terminated without reporting (e.g. a panicking system
    /// tore down the job) surfaces as a closed pool.
    pub(crate) fn wait(self) -> JobOutcome {
        self.result
            .recv()
            .unwrap_or_else(|_| JobOutcome::failed(WorkerPoolError::Closed.into()))
    }
}

/// Fixed-size pool of worker threads executing async work-group jobs.
pub(crate) struct WorkerPool {
    threads: rayon::ThreadPool,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Spawns `size` worker threads.
    pub(crate) fn new(size: usize) -> Result<Self, WorkerPoolError> {
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(size.max(1))
            .thread_name(|index| format!("simtick-worker-{index}"))
            .panic_handler(|_| {
                tracing::error!(target: "simtick", "async work group job panicked");
            })
            .build()
            .map_err(|e| WorkerPoolError::Spawn(e.to_string()))?;
        Ok(Self { threads, closed: AtomicBool::new(false) })
    }

    /// Number of worker threads.
    pub(crate) fn size(&self) -> usize {
        self.threads.current_num_threads()
    }

    /// Submits a job, returning a handle the driver joins later.
    pub(crate) fn submit(
        &self,
        deadline: &DeadlineToken,
        job: impl FnOnce() -> JobOutcome + Send + 'static,
    ) -> JobHandle {
        if self.closed.load(Ordering::Acquire) {
            return JobHandle::ready(JobOutcome::failed(WorkerPoolError::Closed.into()));
        }
        if deadline.is_cancelled() {
            return JobHandle::ready(JobOutcome::failed(EngineError::Cancelled));
        }
        let (sender, result) = bounded(1);
        let deadline = deadline.clone();
        self.threads.spawn(move || {
            let outcome = if deadline.is_cancelled() {
                JobOutcome::failed(EngineError::Cancelled)
            } else {
                job()
            };
            let _ = sender.send(outcome);
        });
        JobHandle { result }
    }

    /// Rejects further submissions; jobs already on the pool still finish.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
