//! Worker message schema.
//!
//! Every task type has one payload variant and one result variant. The same
//! [`execute`] body serves worker threads and inline execution, so both
//! produce results of the same shape.

use std::fmt;

use strata_worldgen::{
    generate, prepare_mesh_batch, ChunkMesh, ChunkMeshInput, DimensionProfile, GeneratedWorld, VoxelBudget,
    WorldSeed,
};

use crate::entities::{step_mobs, AiStepRequest, MobStepOutput};

/// Kind of offloaded work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    /// Height grid for a dimension.
    WorldGeneration,
    /// Batched chunk meshes.
    MeshPreparation,
    /// Next mob positions and states.
    AiStep,
}

impl TaskType {
    /// Every task type, in counter order.
    pub const ALL: [Self; 3] = [Self::WorldGeneration, Self::MeshPreparation, Self::AiStep];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorldGeneration => "world-generation",
            Self::MeshPreparation => "mesh-preparation",
            Self::AiStep => "ai-step",
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic id of a submitted request, unique per task type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inputs of a task. Always an owned copy of main-thread state.
#[derive(Clone, Debug)]
pub enum TaskPayload {
    /// Generate a height grid.
    WorldGeneration {
        /// World seed.
        seed: WorldSeed,
        /// Dimension profile.
        profile: DimensionProfile,
        /// Grid side length.
        grid_size: usize,
        /// Voxel budget.
        budget: VoxelBudget,
    },
    /// Prepare meshes for a batch of chunk snapshots.
    MeshPreparation {
        /// Chunk snapshots.
        inputs: Vec<ChunkMeshInput>,
    },
    /// Advance mobs.
    AiStep(AiStepRequest),
}

impl TaskPayload {
    /// Task type of this payload.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        match self {
            Self::WorldGeneration { .. } => TaskType::WorldGeneration,
            Self::MeshPreparation { .. } => TaskType::MeshPreparation,
            Self::AiStep(_) => TaskType::AiStep,
        }
    }
}

/// Output of a task.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskResult {
    /// Generated world.
    WorldGeneration(GeneratedWorld),
    /// Prepared meshes, in input order.
    MeshPreparation(Vec<ChunkMesh>),
    /// Mob updates, in input order.
    AiStep(Vec<MobStepOutput>),
}

impl TaskResult {
    /// Task type of this result.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        match self {
            Self::WorldGeneration(_) => TaskType::WorldGeneration,
            Self::MeshPreparation(_) => TaskType::MeshPreparation,
            Self::AiStep(_) => TaskType::AiStep,
        }
    }
}

/// Request sent to a backend.
#[derive(Clone, Debug)]
pub struct WorkerTask {
    /// Request id.
    pub request_id: RequestId,
    /// Inputs.
    pub payload: TaskPayload,
}

impl WorkerTask {
    /// Task type of the payload.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }
}

/// Reply from a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerResult {
    /// Task type.
    pub task_type: TaskType,
    /// Id of the request this answers.
    pub request_id: RequestId,
    /// Output.
    pub result: TaskResult,
}

/// Runs a payload to completion on the calling thread.
#[must_use]
pub fn execute(payload: &TaskPayload) -> TaskResult {
    match payload {
        TaskPayload::WorldGeneration {
            seed,
            profile,
            grid_size,
            budget,
        } => TaskResult::WorldGeneration(generate(*seed, profile, *grid_size, *budget)),
        TaskPayload::MeshPreparation { inputs } => TaskResult::MeshPreparation(prepare_mesh_batch(inputs)),
        TaskPayload::AiStep(request) => TaskResult::AiStep(step_mobs(request)),
    }
}

/// Runs a task and wraps the output as a reply.
#[must_use]
pub fn run_task(task: &WorkerTask) -> WorkerResult {
    WorkerResult {
        task_type: task.task_type(),
        request_id: task.request_id,
        result: execute(&task.payload),
    }
}
