use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use tracing::{debug, warn};

/// Hardware concurrency of this machine, at least 1.
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

pub fn clamp_workers(requested: usize, available: usize) -> usize {
    requested.min(available).max(1)
}

/// The value produced by one task, tagged with the task's submission index.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<R> {
    pub index: usize,
    pub value: R,
}

/// A bounded pool of worker threads that runs independent tasks and reports each
/// completion as it happens.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// A pool of `min(requested, hardware concurrency)` workers.
    pub fn new(requested: usize) -> Result<Self, EngineError> {
        Self::with_limit(requested, available_workers())
    }

    pub fn with_limit(requested: usize, available: usize) -> Result<Self, EngineError> {
        let workers = clamp_workers(requested, available);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("compass-worker-{i}"))
            .build()
            .map_err(|e| EngineError::Initialization(format!("worker pool: {e}")))?;
        debug!(requested, workers, "Created worker pool.");
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `worker_fn` on every task and returns the results in completion order.
    /// `label` names the batch in progress reports.
    ///
    /// Tasks start in submission order. The first failing task, including one that
    /// panics, stops tasks that have not started yet; its error is returned once the
    /// tasks already running have finished. `TaskIncrement` is reported once per
    /// successful task.
    pub fn run<T, R, F>(
        &self,
        label: &'static str,
        tasks: Vec<T>,
        worker_fn: F,
        reporter: &ProgressReporter,
    ) -> Result<Vec<Completion<R>>, EngineError>
    where
        T: Send,
        R: Send,
        F: Fn(usize, T) -> Result<R, EngineError> + Sync,
    {
        let total = tasks.len();
        reporter.report(Progress::TaskStart {
            label,
            total_steps: total as u64,
        });

        let abort = AtomicBool::new(false);
        let worker_fn = &worker_fn;
        let abort_flag = &abort;
        let (sender, receiver) = mpsc::channel::<(usize, Result<R, EngineError>)>();

        let mut completions = Vec::with_capacity(total);
        let mut first_error = None;

        self.pool.in_place_scope_fifo(|scope| {
            for (index, task) in tasks.into_iter().enumerate() {
                let sender = sender.clone();
                scope.spawn_fifo(move |_| {
                    if abort_flag.load(Ordering::Acquire) {
                        return;
                    }
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker_fn(index, task)))
                        .unwrap_or_else(|payload| {
                            Err(EngineError::WorkerPanicked(panic_message(payload.as_ref())))
                        });
                    if outcome.is_err() {
                        abort_flag.store(true, Ordering::Release);
                    }
                    // The receiver outlives every task of the scope.
                    let _ = sender.send((index, outcome));
                });
            }
            drop(sender);

            for (index, outcome) in receiver.iter() {
                match outcome {
                    Ok(value) => {
                        completions.push(Completion { index, value });
                        reporter.report(Progress::TaskIncrement);
                    }
                    Err(e) => {
                        if first_error.is_none() {
                            warn!(task = index, error = %e, "Task failed, skipping remaining tasks.");
                            first_error = Some(e);
                        } else {
                            debug!(task = index, error = %e, "Additional task failure.");
                        }
                    }
                }
            }
        });

        reporter.report(Progress::TaskFinish);
        match first_error {
            Some(e) => Err(e),
            None => Ok(completions),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
