//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use strata::worker::{run_task, WorkerResult, WorkerTask};
use strata::{EngineConfig, RequestId, TaskType, WorkerBackend, WorkerError};

/// Threaded-looking backend whose tasks finish only when the test says so.
#[derive(Clone, Default)]
pub struct ManualBackend {
    inbox: Arc<Mutex<Vec<WorkerTask>>>,
    outbox: Arc<Mutex<Vec<WorkerResult>>>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the queued task `id` of `task_type`; its result shows up at the
    /// next frame boundary.
    pub fn complete(&self, task_type: TaskType, id: RequestId) -> bool {
        let task = {
            let mut inbox = self.inbox.lock();
            inbox
                .iter()
                .position(|t| t.task_type() == task_type && t.request_id == id)
                .map(|i| inbox.remove(i))
        };
        match task {
            Some(task) => {
                self.outbox.lock().push(run_task(&task));
                true
            }
            None => false,
        }
    }

    /// Queued request ids of `task_type`, oldest first.
    pub fn queued(&self, task_type: TaskType) -> Vec<RequestId> {
        self.inbox
            .lock()
            .iter()
            .filter(|t| t.task_type() == task_type)
            .map(|t| t.request_id)
            .collect()
    }
}

impl WorkerBackend for ManualBackend {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn dispatch(&mut self, task: WorkerTask) -> Result<(), WorkerError> {
        self.inbox.lock().push(task);
        Ok(())
    }

    fn poll(&mut self) -> Vec<WorkerResult> {
        std::mem::take(&mut *self.outbox.lock())
    }

    fn is_threaded(&self) -> bool {
        true
    }
}

/// Backend whose threads are gone.
pub struct DeadBackend;

impl WorkerBackend for DeadBackend {
    fn name(&self) -> &'static str {
        "dead"
    }

    fn dispatch(&mut self, task: WorkerTask) -> Result<(), WorkerError> {
        Err(WorkerError::Disconnected(task.task_type()))
    }

    fn poll(&mut self) -> Vec<WorkerResult> {
        Vec::new()
    }

    fn is_threaded(&self) -> bool {
        true
    }
}

/// Small inline world.
pub fn small_config() -> EngineConfig {
    EngineConfig {
        grid_size: 32,
        ..EngineConfig::default()
    }
    .inline()
}
