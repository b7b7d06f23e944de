//! Execution backends for worker tasks.
//!
//! ```text
//!            dispatch (try_send)            run_task
//!  main ───> bounded request channel ───> worker thread 0..N
//!   ^                                          │
//!   └──── poll (try_iter) <── result channel <─┘
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

use super::protocol::{run_task, WorkerResult, WorkerTask};
use crate::error::WorkerError;

/// Somewhere to run worker tasks.
///
/// `dispatch` must not block. Results are handed back by `poll`, which the
/// dispatcher only calls at frame boundaries.
pub trait WorkerBackend: Send {
    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Queues a task.
    ///
    /// # Errors
    ///
    /// [`WorkerError`] when the task cannot be queued; the dispatcher then
    /// runs it inline.
    fn dispatch(&mut self, task: WorkerTask) -> Result<(), WorkerError>;

    /// Results finished since the last poll.
    fn poll(&mut self) -> Vec<WorkerResult>;

    /// True when tasks run off the main thread.
    fn is_threaded(&self) -> bool;
}

/// Computes on dispatch; the result waits for the next poll.
#[derive(Default)]
pub struct InlineBackend {
    ready: Vec<WorkerResult>,
}

impl InlineBackend {
    /// Creates an inline backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerBackend for InlineBackend {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn dispatch(&mut self, task: WorkerTask) -> Result<(), WorkerError> {
        self.ready.push(run_task(&task));
        Ok(())
    }

    fn poll(&mut self) -> Vec<WorkerResult> {
        std::mem::take(&mut self.ready)
    }

    fn is_threaded(&self) -> bool {
        false
    }
}

/// Fixed set of `std::thread` workers fed through crossbeam channels.
pub struct ThreadPoolBackend {
    requests: Option<Sender<WorkerTask>>,
    results: Receiver<WorkerResult>,
    handles: Vec<JoinHandle<()>>,
}

impl ThreadPoolBackend {
    /// Starts `threads` workers sharing a request queue of `queue_capacity`.
    ///
    /// # Errors
    ///
    /// [`WorkerError::SpawnFailed`] if any thread fails to start. Threads
    /// already started are shut down.
    pub fn spawn(threads: usize, queue_capacity: usize) -> Result<Self, WorkerError> {
        if threads == 0 {
            return Err(WorkerError::SpawnFailed("zero worker threads requested".into()));
        }
        let (request_tx, request_rx) = bounded::<WorkerTask>(queue_capacity.max(1));
        let (result_tx, result_rx) = unbounded::<WorkerResult>();

        let mut backend = Self {
            requests: Some(request_tx),
            results: result_rx,
            handles: Vec::with_capacity(threads),
        };

        for index in 0..threads {
            let requests = request_rx.clone();
            let results = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("strata-worker-{index}"))
                .spawn(move || worker_loop(&requests, &results))
                .map_err(|err| WorkerError::SpawnFailed(err.to_string()))?;
            backend.handles.push(handle);
        }

        tracing::info!(threads, queue_capacity, "worker threads started");
        Ok(backend)
    }

    /// Number of running worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }
}

fn worker_loop(requests: &Receiver<WorkerTask>, results: &Sender<WorkerResult>) {
    for task in requests.iter() {
        // A panicking task loses its answer but not the thread. The
        // dispatcher re-runs the request inline once it times out.
        let Ok(result) = panic::catch_unwind(AssertUnwindSafe(|| run_task(&task))) else {
            tracing::error!(task = %task.task_type(), request = %task.request_id, "worker task panicked");
            continue;
        };
        if results.send(result).is_err() {
            break;
        }
    }
}

impl WorkerBackend for ThreadPoolBackend {
    fn name(&self) -> &'static str {
        "threads"
    }

    fn dispatch(&mut self, task: WorkerTask) -> Result<(), WorkerError> {
        let task_type = task.task_type();
        let Some(requests) = &self.requests else {
            return Err(WorkerError::Disconnected(task_type));
        };
        requests.try_send(task).map_err(|err| match err {
            TrySendError::Full(_) => WorkerError::QueueFull(task_type),
            TrySendError::Disconnected(_) => WorkerError::Disconnected(task_type),
        })
    }

    fn poll(&mut self) -> Vec<WorkerResult> {
        self.results.try_iter().collect()
    }

    fn is_threaded(&self) -> bool {
        true
    }
}

impl Drop for ThreadPoolBackend {
    fn drop(&mut self) {
        // Closing the request channel ends every worker loop.
        self.requests.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
