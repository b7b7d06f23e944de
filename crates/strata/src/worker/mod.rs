//! # Worker Offload
//!
//! Expensive work (world generation, mesh batches, mob AI) leaves the main
//! loop as owned payloads and comes back as results. The dispatcher keeps
//! one "latest request" per task type:
//!
//! ```text
//!  submit(ai-step)  -> #1   latest[ai-step] = #1
//!  submit(ai-step)  -> #2   latest[ai-step] = #2   (#1 superseded)
//!  result #2 arrives        accepted, applied
//!  result #1 arrives        stale, discarded
//! ```
//!
//! Results are only looked at in [`WorkerDispatcher::collect_accepted`],
//! called once per frame. A request is accepted at most once.
//!
//! When the threaded backend cannot take a task (spawn failure, full queue,
//! disconnected workers) the task runs inline and a `worker-unavailable`
//! diagnostic is recorded. Callers always get a [`RequestId`] back.
//!
//! A request the backend accepted but never answers (a worker that panicked,
//! a wedged thread) is re-run inline once it has waited
//! `result_timeout_frames` collects, so no lane stays pending forever.

mod backend;
pub mod protocol;

pub use backend::{InlineBackend, ThreadPoolBackend, WorkerBackend};
pub use protocol::{execute, run_task, RequestId, TaskPayload, TaskResult, TaskType, WorkerResult, WorkerTask};

use serde::Serialize;

use crate::config::{WorkerConfig, WorkerMode};
use crate::diagnostics::{DiagnosticRecorder, FailureKind};
use crate::error::WorkerError;

const SOURCE: &str = "worker";

/// Collects a dispatched request may wait before it is re-run inline.
pub const DEFAULT_RESULT_TIMEOUT_FRAMES: u32 = 300;

/// Counters for one task type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Requests submitted.
    pub submitted: u64,
    /// Results accepted.
    pub accepted: u64,
    /// Results discarded as stale.
    pub stale_discarded: u64,
    /// Requests that ran inline because the backend refused them or never
    /// answered.
    pub inline_fallbacks: u64,
    /// Requests the backend never answered in time.
    pub timed_out: u64,
}

#[derive(Default)]
struct Lane {
    next_id: u64,
    latest: Option<RequestId>,
    pending: bool,
    /// Latest task while the threaded backend owns it.
    in_flight: Option<WorkerTask>,
    waited: u32,
    stats: WorkerStats,
}

/// Request bookkeeping in front of a [`WorkerBackend`].
pub struct WorkerDispatcher {
    backend: Box<dyn WorkerBackend>,
    fallback: InlineBackend,
    degraded: bool,
    timeout_frames: u32,
    lanes: [Lane; TaskType::ALL.len()],
}

impl WorkerDispatcher {
    /// Builds the backend the config asks for.
    ///
    /// A thread pool that fails to start degrades to inline execution and
    /// records a diagnostic.
    #[must_use]
    pub fn from_config(config: &WorkerConfig, recorder: &mut DiagnosticRecorder) -> Self {
        let dispatcher = match config.mode {
            WorkerMode::Inline => Self::with_backend(Box::new(InlineBackend::new())),
            WorkerMode::Threads => match ThreadPoolBackend::spawn(config.threads, config.queue_capacity) {
                Ok(pool) => Self::with_backend(Box::new(pool)),
                Err(err) => {
                    recorder.record(
                        FailureKind::WorkerUnavailable,
                        SOURCE,
                        format!("{err}; running every task inline"),
                    );
                    let mut dispatcher = Self::with_backend(Box::new(InlineBackend::new()));
                    dispatcher.degraded = true;
                    dispatcher
                }
            },
        };
        dispatcher.with_result_timeout(config.result_timeout_frames)
    }

    /// Uses `backend` for every task.
    #[must_use]
    pub fn with_backend(backend: Box<dyn WorkerBackend>) -> Self {
        Self {
            backend,
            fallback: InlineBackend::new(),
            degraded: false,
            timeout_frames: DEFAULT_RESULT_TIMEOUT_FRAMES,
            lanes: std::array::from_fn(|_| Lane::default()),
        }
    }

    /// Re-runs unanswered requests inline after `frames` collects.
    #[must_use]
    pub fn with_result_timeout(mut self, frames: u32) -> Self {
        self.timeout_frames = frames.max(1);
        self
    }

    fn issue(&mut self, task_type: TaskType) -> RequestId {
        let lane = &mut self.lanes[task_type.index()];
        lane.next_id += 1;
        let id = RequestId(lane.next_id);
        lane.latest = Some(id);
        id
    }

    /// Sends a task, superseding any outstanding request of the same type.
    pub fn submit(&mut self, payload: TaskPayload, recorder: &mut DiagnosticRecorder) -> RequestId {
        let task_type = payload.task_type();
        let request_id = self.issue(task_type);
        {
            let lane = &mut self.lanes[task_type.index()];
            lane.pending = true;
            lane.in_flight = None;
            lane.waited = 0;
            lane.stats.submitted += 1;
        }
        let task = WorkerTask { request_id, payload };

        if self.degraded {
            // Inline dispatch only computes and queues.
            let _ = self.fallback.dispatch(task);
            return request_id;
        }

        match self.backend.dispatch(task.clone()) {
            Ok(()) if self.backend.is_threaded() => self.lanes[task_type.index()].in_flight = Some(task),
            Ok(()) => {}
            Err(err) => self.fall_back(&err, task, recorder),
        }
        request_id
    }

    fn fall_back(&mut self, err: &WorkerError, task: WorkerTask, recorder: &mut DiagnosticRecorder) {
        let task_type = task.task_type();
        if matches!(err, WorkerError::Disconnected(_)) {
            self.degraded = true;
        }
        recorder.record(
            FailureKind::WorkerUnavailable,
            SOURCE,
            format!("{err}; running {task_type} {} inline", task.request_id),
        );
        self.lanes[task_type.index()].stats.inline_fallbacks += 1;
        let _ = self.fallback.dispatch(task);
    }

    /// Computes `payload` right now on the calling thread.
    ///
    /// Bypasses request bookkeeping; the result has the same shape a worker
    /// would send.
    #[must_use]
    pub fn run_inline(&self, payload: &TaskPayload) -> TaskResult {
        execute(payload)
    }

    /// Drains finished results and keeps only the ones still wanted.
    ///
    /// Call once per frame, before anything reads worker output.
    pub fn collect_accepted(&mut self, recorder: &mut DiagnosticRecorder) -> Vec<WorkerResult> {
        self.expire_unanswered(recorder);

        let mut incoming = self.backend.poll();
        incoming.extend(self.fallback.poll());

        let mut accepted = Vec::with_capacity(incoming.len());
        for result in incoming {
            let lane = &mut self.lanes[result.task_type.index()];
            if lane.pending && lane.latest == Some(result.request_id) {
                lane.pending = false;
                lane.in_flight = None;
                lane.stats.accepted += 1;
                accepted.push(result);
            } else {
                lane.stats.stale_discarded += 1;
                let latest = lane.latest.unwrap_or_default();
                recorder.record(
                    FailureKind::StaleWorkerResult,
                    SOURCE,
                    format!("discarded {} {} (latest {latest})", result.task_type, result.request_id),
                );
            }
        }
        accepted
    }

    fn expire_unanswered(&mut self, recorder: &mut DiagnosticRecorder) {
        let limit = self.timeout_frames;
        let mut expired = Vec::new();
        for lane in &mut self.lanes {
            if lane.in_flight.is_none() {
                continue;
            }
            lane.waited += 1;
            if lane.waited > limit {
                lane.waited = 0;
                lane.stats.timed_out += 1;
                expired.extend(lane.in_flight.take());
            }
        }
        for task in expired {
            let err = WorkerError::TimedOut {
                task_type: task.task_type(),
                frames: limit,
            };
            self.fall_back(&err, task, recorder);
        }
    }

    /// Makes every outstanding request of `task_type` stale without sending
    /// anything new.
    pub fn invalidate(&mut self, task_type: TaskType) {
        let was_pending = self.lanes[task_type.index()].pending;
        self.issue(task_type);
        self.lanes[task_type.index()].pending = false;
        self.lanes[task_type.index()].in_flight = None;
        if was_pending {
            tracing::debug!(task = %task_type, "outstanding request invalidated");
        }
    }

    /// True while the latest request of `task_type` has no accepted result.
    #[must_use]
    pub fn is_pending(&self, task_type: TaskType) -> bool {
        self.lanes[task_type.index()].pending
    }

    /// Latest request id of `task_type`.
    #[must_use]
    pub fn latest(&self, task_type: TaskType) -> Option<RequestId> {
        self.lanes[task_type.index()].latest
    }

    /// Counters of `task_type`.
    #[must_use]
    pub fn stats(&self, task_type: TaskType) -> WorkerStats {
        self.lanes[task_type.index()].stats
    }

    /// True when tasks currently run off the main thread.
    #[must_use]
    pub fn is_threaded(&self) -> bool {
        !self.degraded && self.backend.is_threaded()
    }

    /// Name of the active backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        if self.degraded {
            "inline (degraded)"
        } else {
            self.backend.name()
        }
    }
}
