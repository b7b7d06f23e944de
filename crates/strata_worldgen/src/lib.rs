//! # STRATA World Generation
//!
//! Deterministic terrain and the chunked block world built on top of it.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: same seed and profile, same height matrix, always
//! 2. **Bounded**: every height within the profile range, total voxel count
//!    within budget (or a recorded fallback)
//! 3. **Lazy rebuilds**: edits only mark chunks dirty; meshes are rebuilt
//!    in per-frame batches
//! 4. **Thread-agnostic**: nothing here spawns threads; mesh inputs are
//!    owned copies that any worker can process
//!
//! ## Core Components
//!
//! - [`generate`]: seed + [`DimensionProfile`] -> [`GeneratedWorld`]
//! - [`ChunkManager`]: columns, height map, dirty queue, meshes
//! - [`prepare_chunk_mesh`]: column snapshot -> vertex/index buffers
//!
//! ## Example
//!
//! ```rust
//! use strata_worldgen::{
//!     generate, BlockKind, ChunkManager, ColumnMutation, DimensionProfile, VoxelBudget, WorldSeed,
//! };
//!
//! let profile = DimensionProfile::origin();
//! let world = generate(WorldSeed::new(98_765), &profile, 32, VoxelBudget::Unlimited);
//! let mut chunks = ChunkManager::from_profile(&world.matrix, &profile, 16, 64);
//!
//! let before = chunks.height_at(3, 3).unwrap();
//! if chunks.set_column_block(3, 3, ColumnMutation::Place(BlockKind::Stone)).is_ok() {
//!     assert_eq!(chunks.height_at(3, 3), Some(before + 1));
//! }
//! chunks.rebuild_dirty_chunks(4);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod chunk;
pub mod column;
pub mod generator;
pub mod mesh;
pub mod noise;
pub mod profile;

pub use chunk::{
    Chunk, ChunkKey, ChunkKeyParseError, ChunkManager, MeshApply, MutationOutcome, RebuildReport,
    DEFAULT_CHUNK_SIZE,
};
pub use column::{Block, BlockKind, Cap, Column, ColumnError, ColumnMutation};
pub use generator::{
    generate, FallbackReason, GeneratedWorld, GenerationMeta, GenerationSource, HeightMatrix,
    VoxelBudget,
};
pub use mesh::{prepare_chunk_mesh, prepare_mesh_batch, ChunkMesh, ChunkMeshInput, MeshVertex, SurfaceTag};
pub use noise::{SimplexNoise, WorldSeed};
pub use profile::{builtin_profiles, DimensionProfile, Palette, ProfileError, SpawnRule, MAX_COLUMN_HEIGHT};
