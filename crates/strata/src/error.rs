//! # Simulation Error Types
//!
//! Errors of the simulation crate, one enum per concern.
//!
//! Only [`ConfigError`] (and the [`ProfileError`] it wraps) is meant to reach
//! the host as a hard failure. Everything else is either returned to a caller
//! that can act on it, or turned into a diagnostic at the frame boundary.

use strata_worldgen::{ChunkKey, ColumnError, ProfileError};
use thiserror::Error;

use crate::transition::TransitionState;
use crate::worker::TaskType;

/// Malformed engine configuration or dimension content.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// TOML syntax or type error.
    #[error("invalid engine config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field has an unusable value.
    #[error("invalid engine config: {field} {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A dimension profile failed validation.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// The starting dimension is not registered.
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    /// The config file could not be read.
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Worker backend failures. The dispatcher answers all of them by running
/// the task inline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The backend's threads are gone.
    #[error("worker backend disconnected while sending {0}")]
    Disconnected(TaskType),

    /// The request queue is full.
    #[error("worker queue full, cannot accept {0}")]
    QueueFull(TaskType),

    /// Worker threads could not be started.
    #[error("failed to spawn worker thread: {0}")]
    SpawnFailed(String),

    /// A dispatched request got no answer.
    #[error("{task_type} unanswered after {frames} frames")]
    TimedOut {
        /// Task type of the request.
        task_type: TaskType,
        /// Frames waited.
        frames: u32,
    },
}

/// Navigation mesh failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavError {
    /// The chunk has no data in the current world.
    #[error("no chunk data for {0}")]
    MissingChunk(ChunkKey),
}

/// A lifecycle hook reported failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("hook {hook} failed: {reason}")]
pub struct HookError {
    /// Hook name.
    pub hook: String,
    /// Failure description.
    pub reason: String,
}

impl HookError {
    /// Creates a hook error.
    #[must_use]
    pub fn new(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            reason: reason.into(),
        }
    }
}

/// Dimension transition refusals.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Another transition is still running.
    #[error("transition already running (state {0:?})")]
    Busy(TransitionState),

    /// No dimension follows the current one.
    #[error("no dimension registered after {0}")]
    NoNextDimension(String),
}

/// Snapshot publishing failures.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// JSON encoding or decoding failed.
    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The key-value store refused the write.
    #[error("snapshot store rejected write: {0}")]
    Store(String),
}

/// Errors returned by the engine control surface.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transition refused.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Column edit refused.
    #[error(transparent)]
    Column(#[from] ColumnError),

    /// Snapshot could not be written.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The engine must be started first.
    #[error("engine not started")]
    NotStarted,
}

impl From<ProfileError> for EngineError {
    fn from(err: ProfileError) -> Self {
        Self::Config(ConfigError::Profile(err))
    }
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
