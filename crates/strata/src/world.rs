//! The live world: active profile, chunk set and generation facts.

use std::sync::Arc;

use strata_worldgen::{
    generate, ChunkManager, ChunkMesh, DimensionProfile, GeneratedWorld, GenerationMeta, GenerationSource, MeshApply,
    WorldSeed,
};

use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticRecorder, FailureKind};

/// Profile plus terrain of one dimension.
#[derive(Clone, Debug)]
pub struct World {
    /// Active profile.
    pub profile: Arc<DimensionProfile>,
    /// Chunks and columns.
    pub chunks: ChunkManager,
    /// How the terrain was produced.
    pub meta: GenerationMeta,
}

impl World {
    /// Builds chunks for `generated` and meshes every one of them.
    ///
    /// Used for staged worlds, which are not visible until committed.
    #[must_use]
    pub fn stage(profile: Arc<DimensionProfile>, generated: GeneratedWorld, config: &EngineConfig) -> Self {
        let mut world = Self::unmeshed(profile, generated, config);
        world.chunks.rebuild_dirty_chunks(usize::MAX);
        world
    }

    /// Builds chunks for `generated`, installing `meshes` where they still
    /// match. Chunks without a usable mesh stay dirty.
    #[must_use]
    pub fn with_meshes(
        profile: Arc<DimensionProfile>,
        generated: GeneratedWorld,
        meshes: Vec<ChunkMesh>,
        config: &EngineConfig,
    ) -> Self {
        let mut world = Self::unmeshed(profile, generated, config);
        let mut installed = 0usize;
        for mesh in meshes {
            if matches!(world.chunks.apply_prepared_mesh(mesh), MeshApply::Installed { .. }) {
                installed += 1;
            }
        }
        tracing::debug!(installed, dirty = world.chunks.dirty_count(), "pre-built meshes installed");
        world
    }

    /// No terrain yet; every column at height 0.
    #[must_use]
    pub fn empty(profile: Arc<DimensionProfile>, config: &EngineConfig) -> Self {
        let chunks = ChunkManager::new(
            config.grid_size,
            config.chunk_size,
            config.max_column_height.max(profile.max_height),
            profile.palette.clone(),
        );
        let meta = GenerationMeta {
            seed: config.seed,
            grid_size: config.grid_size,
            voxel_count: 0,
            source: GenerationSource::Generated,
            fallback_reason: None,
            min_height: 0,
            max_height: 0,
        };
        Self { profile, chunks, meta }
    }

    /// Builds chunks for `generated` without meshing them. Every chunk
    /// starts dirty.
    #[must_use]
    pub fn unmeshed(profile: Arc<DimensionProfile>, generated: GeneratedWorld, config: &EngineConfig) -> Self {
        let chunks = ChunkManager::from_profile(
            &generated.matrix,
            &profile,
            config.chunk_size,
            config.max_column_height,
        );
        Self {
            profile,
            chunks,
            meta: generated.meta,
        }
    }

    /// Generates terrain for `profile` on the calling thread.
    #[must_use]
    pub fn generate_inline(profile: &DimensionProfile, config: &EngineConfig) -> GeneratedWorld {
        generate(WorldSeed::new(config.seed), profile, config.grid_size, config.voxel_budget())
    }

    /// Records a fallback diagnostic when the terrain is not the noise
    /// output.
    pub fn note_fallback(meta: &GenerationMeta, dimension: &str, recorder: &mut DiagnosticRecorder) {
        if meta.source == GenerationSource::Fallback {
            let reason = meta
                .fallback_reason
                .map_or_else(|| "unknown".to_string(), |r| r.to_string());
            recorder.record(
                FailureKind::GenerationFallback,
                "generator",
                format!("{dimension}: voxel budget exceeded, used {reason} ({} voxels)", meta.voxel_count),
            );
        }
    }
}
