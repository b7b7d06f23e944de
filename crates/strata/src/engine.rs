//! # Strata Engine
//!
//! Owner of all mutable world state and the host-facing control surface.
//!
//! ```text
//! tick(dt):
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. FRAME BOUNDARY                                                   │
//! │    └─ collect accepted worker results (stale ones dropped)          │
//! │                                                                     │
//! │ 2. APPLY RESULTS                                                    │
//! │    ├─ world-generation  -> staged world of the running transition   │
//! │    ├─ mesh-preparation  -> chunk meshes (outdated ones rejected)    │
//! │    └─ ai-step           -> mob positions, incremental rebind        │
//! │                                                                     │
//! │ 3. TRANSITION POLL                                                  │
//! │ 4. SURVIVAL DECAY  (NaN vitals go to the watchdog)                  │
//! │ 5. CHUNK MESHES    (frame_budget, inline or batched to workers)     │
//! │ 6. NAVIGATION      (evict, queue active chunks, rebuild budget)     │
//! │ 7. AI-STEP SUBMIT  (every ai_step_interval seconds)                 │
//! │ 8. HUD + SNAPSHOT                                                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing fails out of `tick`. Failures become diagnostics.

use std::collections::BTreeMap;

use serde::Serialize;
use strata_core::Handle;
use strata_worldgen::{
    ChunkKey, ChunkMesh, ColumnMutation, GeneratedWorld, GenerationMeta, MeshApply, MutationOutcome, WorldSeed,
};

use crate::anchoring::{dangling_count, rebind_all, rebind_mob, MobAnchor, RebindReport};
use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticRecorder, FailureKind};
use crate::entities::{AiStepRequest, EntityStore, MobStepOutput, Player};
use crate::error::{ConfigError, EngineError, EngineResult, SnapshotError, TransitionError};
use crate::events::{EngineEvent, EventBus, EventReceiver, EventSender};
use crate::hud::{HudContext, HudPublisher, HudState};
use crate::navmesh::NavMesh;
use crate::registry::DimensionRegistry;
use crate::snapshot::{now_millis, KeyValueStore, MemoryStore, SnapshotPublisher, SurvivalSnapshot, SNAPSHOT_KEY};
use crate::transition::{
    AssetResolver, HookContext, HookRegistry, PortalEvent, StaticAssetResolver, TransitionContext, TransitionMachine,
    TransitionReport, TransitionState,
};
use crate::watchdog::{CrashDescriptor, SurvivalContext, SurvivalWatchdog};
use crate::worker::{RequestId, TaskPayload, TaskResult, TaskType, WorkerBackend, WorkerDispatcher, WorkerStats};
use crate::world::World;

// =============================================================================
// Control surface types
// =============================================================================

/// Pre-computed terrain handed to [`Engine::build_terrain`].
#[derive(Clone, Debug)]
pub struct TerrainBundle {
    /// Height grid and generation facts.
    pub world: GeneratedWorld,
    /// Chunk meshes built from it.
    pub meshes: Vec<ChunkMesh>,
}

/// Options of [`Engine::build_terrain`].
#[derive(Clone, Debug, Default)]
pub struct BuildTerrainOptions {
    /// Diagnostic label.
    pub reason: String,
    /// Skip generation and install this instead.
    pub worker_result: Option<TerrainBundle>,
}

impl BuildTerrainOptions {
    /// Local generation labelled `reason`.
    #[must_use]
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            worker_result: None,
        }
    }
}

/// What one [`Engine::tick`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number.
    pub frame: u64,
    /// Worker results applied.
    pub accepted_results: usize,
    /// Chunk meshes installed.
    pub chunks_rebuilt: usize,
    /// Mesh batch sent to workers.
    pub mesh_request: Option<RequestId>,
    /// Nav grids rebuilt.
    pub nav_rebuilt: usize,
    /// Nav grids that failed.
    pub nav_failed: usize,
    /// Ai-step sent to workers.
    pub ai_request: Option<RequestId>,
    /// Transition stage after the poll.
    pub transition: TransitionState,
}

/// Read-only numbers for developer overlays.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperMetrics {
    /// Frames ticked.
    pub frame: u64,
    /// Live dimension id.
    pub dimension: String,
    /// Transition stage.
    pub transition: TransitionState,
    /// Finished transitions.
    pub transitions_completed: u64,
    /// Chunks in the live world.
    pub chunk_count: usize,
    /// Chunks waiting for a mesh.
    pub dirty_chunks: usize,
    /// Chunks hidden for being empty.
    pub hidden_chunks: usize,
    /// Non-empty blocks.
    pub total_blocks: u64,
    /// Generation facts of the live world.
    pub generation: GenerationMeta,
    /// Live mobs.
    pub mob_count: usize,
    /// Live interactive objects.
    pub object_count: usize,
    /// Built nav grids.
    pub nav_grids: usize,
    /// Queued nav rebuilds.
    pub nav_pending: usize,
    /// Worker backend name.
    pub worker_backend: &'static str,
    /// Worker counters per task type.
    pub workers: BTreeMap<&'static str, WorkerStats>,
    /// Diagnostic counts per failure kind.
    pub diagnostics: BTreeMap<&'static str, u64>,
    /// Events lost to a full bus.
    pub events_dropped: u64,
    /// HUD publishes.
    pub hud_publishes: u64,
    /// Snapshot publishes.
    pub snapshot_publishes: u64,
    /// Watchdog resets.
    pub watchdog_resets: u64,
    /// Report of the last finished transition.
    pub last_transition: Option<TransitionReport>,
}

/// Consistent sample of what observers may see.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldView {
    /// Frame number.
    pub frame: u64,
    /// Live dimension id.
    pub dimension: String,
    /// Chunk keys of the live world.
    pub chunk_keys: Vec<ChunkKey>,
    /// Player chunk.
    pub player_chunk: Option<ChunkKey>,
    /// Live mobs.
    pub mob_count: usize,
    /// Entities whose key does not point at a live chunk holding them.
    pub dangling_entities: usize,
    /// Transition stage.
    pub transition: TransitionState,
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles an [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Option<DimensionRegistry>,
    backend: Option<Box<dyn WorkerBackend>>,
    store: Option<Box<dyn KeyValueStore>>,
    assets: Option<Box<dyn AssetResolver>>,
    hooks: Option<HookRegistry>,
}

impl EngineBuilder {
    /// Builder for `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            backend: None,
            store: None,
            assets: None,
            hooks: None,
        }
    }

    /// Uses `registry` instead of the built-in dimensions.
    #[must_use]
    pub fn registry(mut self, registry: DimensionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses `backend` instead of the one the config asks for.
    #[must_use]
    pub fn backend(mut self, backend: Box<dyn WorkerBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Writes snapshots to `store` instead of a private memory store.
    #[must_use]
    pub fn store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Resolves assets with `assets`.
    #[must_use]
    pub fn assets(mut self, assets: Box<dyn AssetResolver>) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Uses `hooks` instead of the built-in hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Validates the config and builds a stopped engine.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for invalid settings or an unknown starting dimension.
    pub fn build(self) -> EngineResult<Engine> {
        let config = self.config;
        config.validate()?;

        let registry = self.registry.unwrap_or_else(DimensionRegistry::with_builtins);
        let profile = registry
            .get(&config.starting_dimension)
            .ok_or_else(|| ConfigError::UnknownDimension(config.starting_dimension.clone()))?;

        let bus = EventBus::new(config.event_capacity);
        let events = bus.sender();
        let mut recorder = DiagnosticRecorder::new(config.diagnostics_capacity).with_events(events.clone());

        let workers = match self.backend {
            Some(backend) => {
                WorkerDispatcher::with_backend(backend).with_result_timeout(config.worker.result_timeout_frames)
            }
            None => WorkerDispatcher::from_config(&config.worker, &mut recorder),
        };
        let assets = self.assets.unwrap_or_else(|| {
            let profiles: Vec<_> = registry
                .ordered_ids()
                .iter()
                .filter_map(|id| registry.get(id))
                .collect();
            Box::new(StaticAssetResolver::from_profiles(profiles.iter().map(|p| &**p)))
        });
        let store = self.store.unwrap_or_else(|| Box::new(MemoryStore::new()));

        tracing::info!(
            seed = config.seed,
            grid_size = config.grid_size,
            dimension = %config.starting_dimension,
            backend = workers.backend_name(),
            "engine built"
        );

        Ok(Engine {
            world: World::empty(profile, &config),
            entities: EntityStore::new(&config),
            navmesh: NavMesh::new(config.navigation.clone()),
            watchdog: SurvivalWatchdog::new(&config.watchdog),
            hud: HudPublisher::new(events.clone()),
            snapshots: SnapshotPublisher::new(store, SNAPSHOT_KEY),
            hooks: self.hooks.unwrap_or_else(HookRegistry::with_builtins),
            transition: TransitionMachine::new(),
            registry,
            assets,
            workers,
            recorder,
            bus,
            events,
            frame: 0,
            started: false,
            ai_timer: 0.0,
            snapshot_timer: 0.0,
            status: None,
            config,
        })
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The simulation core.
pub struct Engine {
    config: EngineConfig,
    registry: DimensionRegistry,
    hooks: HookRegistry,
    assets: Box<dyn AssetResolver>,
    workers: WorkerDispatcher,
    recorder: DiagnosticRecorder,
    bus: EventBus,
    events: EventSender,
    world: World,
    entities: EntityStore,
    navmesh: NavMesh,
    transition: TransitionMachine,
    watchdog: SurvivalWatchdog,
    hud: HudPublisher,
    snapshots: SnapshotPublisher,
    frame: u64,
    started: bool,
    ai_timer: f32,
    snapshot_timer: f32,
    status: Option<String>,
}

impl Engine {
    /// Engine with default collaborators.
    ///
    /// # Errors
    ///
    /// See [`EngineBuilder::build`].
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        EngineBuilder::new(config).build()
    }

    /// Builds the starting world, places the player and runs the starting
    /// dimension's ready hooks. Calling it again does nothing.
    ///
    /// # Errors
    ///
    /// Only configuration problems.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.started {
            tracing::debug!("engine already started");
            return Ok(());
        }
        self.build_terrain(BuildTerrainOptions::reason("start"))?;
        self.started = true;

        let (sx, sz) = self.world.chunks.spawn_column();
        let height = self.world.chunks.height_at(sx, sz).unwrap_or(0);
        self.move_player([sx as f32 + 0.5, f32::from(height), sz as f32 + 0.5]);

        match self.snapshots.load() {
            Ok(Some(snapshot)) => {
                snapshot.restore_into(&mut self.entities.player.vitals);
                tracing::info!(updated_at = snapshot.updated_at, "survival state restored");
            }
            Ok(None) => {}
            Err(err) => self
                .recorder
                .record(FailureKind::Configuration, "snapshot", format!("stored snapshot unreadable: {err}")),
        }

        let id = self.world.profile.id.clone();
        let errors = {
            let world = &self.world;
            let mut context = HookContext {
                from: "",
                to: &id,
                profile: &world.profile,
                seed: WorldSeed::new(self.config.seed),
                chunks: &world.chunks,
                entities: &mut self.entities,
            };
            self.hooks.run_ready(&id, &mut context)
        };
        for err in errors {
            self.recorder.record(FailureKind::HookFailure, "engine", err.to_string());
        }

        self.update_hud(HudContext::default());
        self.publish_snapshot_logged();
        tracing::info!(dimension = %id, mobs = self.entities.mobs.len(), "engine started");
        Ok(())
    }

    /// Replaces the live terrain of the current dimension.
    ///
    /// Generates inline unless `worker_result` carries a pre-computed world
    /// and meshes. Entities are rebound against the new chunks.
    ///
    /// # Errors
    ///
    /// [`TransitionError::Busy`] while a transition runs.
    pub fn build_terrain(&mut self, options: BuildTerrainOptions) -> EngineResult<GenerationMeta> {
        if self.transition.is_running() {
            return Err(TransitionError::Busy(self.transition.state()).into());
        }
        let profile = std::sync::Arc::clone(&self.world.profile);

        let world = match options.worker_result {
            Some(bundle) => World::with_meshes(profile, bundle.world, bundle.meshes, &self.config),
            None => {
                let payload = TaskPayload::WorldGeneration {
                    seed: WorldSeed::new(self.config.seed),
                    profile: (*profile).clone(),
                    grid_size: self.config.grid_size,
                    budget: self.config.voxel_budget(),
                };
                let generated = match self.workers.run_inline(&payload) {
                    TaskResult::WorldGeneration(generated) => generated,
                    _ => World::generate_inline(&profile, &self.config),
                };
                World::stage(profile, generated, &self.config)
            }
        };
        World::note_fallback(&world.meta, &world.profile.id, &mut self.recorder);

        self.workers.invalidate(TaskType::MeshPreparation);
        self.workers.invalidate(TaskType::AiStep);
        self.navmesh.clear();
        self.world = world;
        let report = rebind_all(&mut self.entities, &self.world.chunks, &options.reason);
        self.emit_despawns(&report);

        let meta = self.world.meta.clone();
        self.events.send(EngineEvent::TerrainBuilt {
            reason: options.reason.clone(),
            voxel_count: meta.voxel_count,
        });
        tracing::info!(
            reason = %options.reason,
            dimension = %self.world.profile.id,
            voxels = meta.voxel_count,
            chunks = self.world.chunks.chunk_count(),
            "terrain built"
        );
        Ok(meta)
    }

    /// Starts a transition to the next registered dimension and polls it
    /// once. Inline workers finish the whole transition here.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotStarted`], [`TransitionError::Busy`] or
    /// [`TransitionError::NoNextDimension`].
    pub fn advance_dimension(&mut self, points_awarded: Option<u64>) -> EngineResult<TransitionState> {
        let current = self.world.profile.id.clone();
        let target = self
            .registry
            .next_after(&current)
            .ok_or(TransitionError::NoNextDimension(current))?;
        self.enter_portal(PortalEvent {
            target,
            points_awarded,
        })
    }

    /// Starts a transition for `event` and polls it once.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotStarted`] or [`TransitionError::Busy`].
    pub fn enter_portal(&mut self, event: PortalEvent) -> EngineResult<TransitionState> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        self.transition.begin(event, &self.world.profile.id, &self.events)?;
        Ok(self.poll_transition())
    }

    fn poll_transition(&mut self) -> TransitionState {
        if !self.transition.is_running() {
            return self.transition.state();
        }
        let mut context = TransitionContext {
            config: &self.config,
            registry: &self.registry,
            hooks: &mut self.hooks,
            assets: &*self.assets,
            workers: &mut self.workers,
            recorder: &mut self.recorder,
            events: &self.events,
            world: &mut self.world,
            entities: &mut self.entities,
            navmesh: &mut self.navmesh,
        };
        let state = self.transition.step(&mut context);
        if state == TransitionState::Ready {
            self.ai_timer = 0.0;
            self.update_hud(HudContext::default());
        }
        state
    }

    /// Publishes the HUD, optionally with a new status line.
    pub fn update_hud(&mut self, context: HudContext) -> HudState {
        if context.status.is_some() {
            self.status = context.status;
        }
        let state = self.hud_state();
        self.hud.publish(state.clone());
        state
    }

    fn hud_state(&self) -> HudState {
        let player = &self.entities.player;
        HudState::new(
            &player.vitals,
            &self.world.profile.name,
            player.points,
            self.frame,
            self.status.clone(),
        )
    }

    /// Numbers for developer overlays.
    #[must_use]
    pub fn developer_metrics(&self) -> DeveloperMetrics {
        let chunks = &self.world.chunks;
        DeveloperMetrics {
            frame: self.frame,
            dimension: self.world.profile.id.clone(),
            transition: self.transition.state(),
            transitions_completed: self.transition.completed(),
            chunk_count: chunks.chunk_count(),
            dirty_chunks: chunks.dirty_count(),
            hidden_chunks: chunks.hidden_count(),
            total_blocks: chunks.total_blocks(),
            generation: self.world.meta.clone(),
            mob_count: self.entities.mobs.len(),
            object_count: self.entities.objects.len(),
            nav_grids: self.navmesh.grid_count(),
            nav_pending: self.navmesh.pending_count(),
            worker_backend: self.workers.backend_name(),
            workers: TaskType::ALL
                .iter()
                .map(|&t| (t.as_str(), self.workers.stats(t)))
                .collect(),
            diagnostics: self
                .recorder
                .counts()
                .into_iter()
                .map(|(kind, n)| (kind.as_str(), n))
                .collect(),
            events_dropped: self.bus.dropped(),
            hud_publishes: self.hud.publishes(),
            snapshot_publishes: self.snapshots.publishes(),
            watchdog_resets: self.watchdog.fired(),
            last_transition: self.transition.last_report().cloned(),
        }
    }

    /// Hands a crash report to the survival watchdog.
    pub fn trigger_survival_watchdog(&mut self, descriptor: &CrashDescriptor) -> bool {
        let mut handle = SurvivalHandle {
            player: &mut self.entities.player,
            hud: &mut self.hud,
            snapshots: &mut self.snapshots,
            recorder: &mut self.recorder,
            events: &self.events,
            dimension: &self.world.profile.name,
            frame: self.frame,
            status: self.status.clone(),
        };
        let fired = self.watchdog.trigger(&mut handle, descriptor);
        if fired {
            self.events.send(EngineEvent::WatchdogFired {
                stage: descriptor.stage.clone(),
                reason: descriptor.reason.clone(),
            });
        }
        fired
    }

    /// Advances the simulation by `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> FrameReport {
        if !self.started {
            return FrameReport {
                frame: self.frame,
                transition: self.transition.state(),
                ..FrameReport::default()
            };
        }
        self.frame += 1;
        self.recorder.set_frame(self.frame);
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };

        // 1-2. Frame boundary: accepted results only.
        let accepted = self.workers.collect_accepted(&mut self.recorder);
        report.accepted_results = accepted.len();
        for result in accepted {
            match result.result {
                TaskResult::WorldGeneration(generated) => {
                    if !self.transition.offer_world(result.request_id, generated, &self.config) {
                        tracing::debug!(request = %result.request_id, "world result not claimed by a transition");
                    }
                }
                TaskResult::MeshPreparation(meshes) => report.chunks_rebuilt += self.install_meshes(meshes),
                TaskResult::AiStep(outputs) => self.apply_ai_step(&outputs),
            }
        }

        // 3. Transition
        report.transition = self.poll_transition();

        // 4. Survival
        let (gx, gz) = self.entities.player.column();
        let submerged = self
            .world
            .chunks
            .top_block(gx, gz)
            .is_some_and(|block| block.kind.is_liquid());
        self.entities.player.vitals.decay(dt, submerged, &self.config.player);
        if self.entities.player.vitals.is_corrupt() {
            self.trigger_survival_watchdog(&CrashDescriptor::new("simulation", "nan in player vitals"));
        }

        // 5. Chunk meshes
        if self.workers.is_threaded() {
            report.mesh_request = self.submit_mesh_batch();
        } else {
            let rebuild = self.world.chunks.rebuild_dirty_chunks(self.config.frame_budget);
            report.chunks_rebuilt += rebuild.rebuilt.len();
            if !rebuild.rebuilt.is_empty() {
                self.events.send(EngineEvent::ChunksRebuilt {
                    keys: rebuild.rebuilt,
                    remaining: rebuild.remaining,
                });
            }
        }

        // 6. Navigation
        let center = self.player_chunk();
        self.navmesh.begin_tick();
        self.navmesh.evict_outside(center);
        self.navmesh.ensure_active(center, &self.world.chunks);
        let nav = self
            .navmesh
            .process_pending(&self.world.chunks, self.config.navigation.rebuild_budget);
        report.nav_rebuilt = nav.rebuilt.len();
        report.nav_failed = nav.failed.len();
        for (key, err) in nav.failed {
            self.recorder
                .record(FailureKind::NavmeshRebuildFailure, "navmesh", format!("{key}: {err}; pathing skipped"));
        }

        // 7. AI
        self.ai_timer += dt;
        if self.ai_timer >= self.config.ai_step_interval && !self.transition.is_running() {
            let elapsed = self.ai_timer;
            self.ai_timer = 0.0;
            report.ai_request = self.submit_ai_step(elapsed);
        }

        // 8. HUD and snapshot
        self.update_hud(HudContext::default());
        self.snapshot_timer += dt;
        if self.snapshot_timer >= self.config.snapshot_interval {
            self.snapshot_timer = 0.0;
            self.publish_snapshot_logged();
        }

        report
    }

    fn install_meshes(&mut self, meshes: Vec<ChunkMesh>) -> usize {
        let mut installed = Vec::new();
        for mesh in meshes {
            let key = mesh.key;
            match self.world.chunks.apply_prepared_mesh(mesh) {
                MeshApply::Installed { .. } => installed.push(key),
                MeshApply::Outdated => tracing::debug!(chunk = %key, "outdated mesh rejected"),
                MeshApply::UnknownChunk => tracing::debug!(chunk = %key, "mesh for unknown chunk dropped"),
            }
        }
        let count = installed.len();
        if count > 0 {
            self.events.send(EngineEvent::ChunksRebuilt {
                keys: installed,
                remaining: self.world.chunks.dirty_count(),
            });
        }
        count
    }

    fn submit_mesh_batch(&mut self) -> Option<RequestId> {
        if self.workers.is_pending(TaskType::MeshPreparation) {
            return None;
        }
        let chunks = &mut self.world.chunks;
        chunks.requeue_dirty();
        let keys = chunks.drain_dirty_batch(self.config.frame_budget.min(self.config.mesh_batch_size));
        if keys.is_empty() {
            return None;
        }
        let inputs = chunks.mesh_inputs(&keys);
        Some(
            self.workers
                .submit(TaskPayload::MeshPreparation { inputs }, &mut self.recorder),
        )
    }

    /// Sends an `ai-step` for every mob that may path this tick.
    ///
    /// Supersedes any outstanding ai-step. `None` when there is nothing to
    /// step.
    pub fn submit_ai_step(&mut self, elapsed: f32) -> Option<RequestId> {
        let navmesh = &self.navmesh;
        let mobs: Vec<_> = self
            .entities
            .mobs
            .iter()
            .filter(|(_, mob)| mob.chunk_key.is_some_and(|key| navmesh.can_path(key)))
            .map(|(handle, mob)| mob.step_input(handle.to_bits()))
            .collect();
        if mobs.is_empty() {
            return None;
        }
        let profile = &self.world.profile;
        let request = AiStepRequest {
            elapsed,
            player_position: self.entities.player.position,
            mobs,
            nav: navmesh.snapshot_region(self.player_chunk(), self.config.navigation.active_radius),
            gravity: profile.gravity,
            speed_multiplier: profile.speed_multiplier,
            step_height: navmesh.step_height(),
        };
        Some(self.workers.submit(TaskPayload::AiStep(request), &mut self.recorder))
    }

    fn apply_ai_step(&mut self, outputs: &[MobStepOutput]) {
        for output in outputs {
            let handle = Handle::from_bits(output.handle);
            let Some(mob) = self.entities.mobs.get_mut(handle) else {
                tracing::debug!(handle = output.handle, "ai-step output for a despawned mob");
                continue;
            };
            mob.apply_step(output);
            let kind = mob.kind;
            if rebind_mob(&mut self.entities, &self.world.chunks, handle) == MobAnchor::Despawned {
                self.events.send(EngineEvent::EntityDespawned {
                    category: "mob",
                    kind: kind.name().to_string(),
                    handle: output.handle,
                });
            }
        }
    }

    fn emit_despawns(&self, report: &RebindReport) {
        for despawn in &report.despawned {
            self.events.send(EngineEvent::EntityDespawned {
                category: despawn.category,
                kind: despawn.kind.clone(),
                handle: despawn.handle,
            });
        }
    }

    /// Writes the survival snapshot now.
    ///
    /// # Errors
    ///
    /// [`SnapshotError`] from encoding or the store.
    pub fn publish_snapshot(&mut self) -> EngineResult<SurvivalSnapshot> {
        let snapshot = publish_snapshot(&mut self.snapshots, &self.events, &self.entities.player)?;
        Ok(snapshot)
    }

    fn publish_snapshot_logged(&mut self) {
        if let Err(err) = self.publish_snapshot() {
            tracing::warn!(error = %err, "survival snapshot not written");
        }
    }

    /// Applies a place or mine to the live world.
    ///
    /// # Errors
    ///
    /// [`EngineError::Column`] when the edit is refused.
    pub fn set_column_block(&mut self, gx: i32, gz: i32, mutation: ColumnMutation) -> EngineResult<MutationOutcome> {
        let outcome = self.world.chunks.set_column_block(gx, gz, mutation)?;
        self.navmesh.mark_dirty(outcome.key, &self.world.chunks);
        Ok(outcome)
    }

    /// Moves the player. Returns false (and does nothing) if the target
    /// chunk does not exist.
    pub fn move_player(&mut self, position: [f32; 3]) -> bool {
        let key = self.world.chunks.chunk_key_for_position(position[0], position[2]);
        if !self.world.chunks.contains_chunk(key) {
            return false;
        }
        let player = &mut self.entities.player;
        player.position = position;
        player.chunk_key = Some(key);
        true
    }

    fn player_chunk(&self) -> ChunkKey {
        let p = self.entities.player.position;
        self.world.chunks.chunk_key_for_position(p[0], p[2])
    }

    /// New consumer of engine events.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.receiver()
    }

    /// Consistent sample of the observable world.
    #[must_use]
    pub fn world_view(&self) -> WorldView {
        WorldView {
            frame: self.frame,
            dimension: self.world.profile.id.clone(),
            chunk_keys: self.world.chunks.chunk_keys(),
            player_chunk: self.entities.player.chunk_key,
            mob_count: self.entities.mobs.len(),
            dangling_entities: dangling_count(&self.entities, &self.world.chunks),
            transition: self.transition.state(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// True after [`Engine::start`].
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Frames ticked.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Settings.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Live world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Entities.
    #[must_use]
    pub const fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Entities, mutable.
    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    /// The player.
    #[must_use]
    pub const fn player(&self) -> &Player {
        &self.entities.player
    }

    /// The player, mutable.
    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.entities.player
    }

    /// Dimension registry.
    #[must_use]
    pub const fn registry(&self) -> &DimensionRegistry {
        &self.registry
    }

    /// Hooks, for registering more.
    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    /// Worker dispatcher.
    #[must_use]
    pub const fn workers(&self) -> &WorkerDispatcher {
        &self.workers
    }

    /// Diagnostics.
    #[must_use]
    pub const fn diagnostics(&self) -> &DiagnosticRecorder {
        &self.recorder
    }

    /// Navigation grids.
    #[must_use]
    pub const fn navmesh(&self) -> &NavMesh {
        &self.navmesh
    }

    /// Transition machine.
    #[must_use]
    pub const fn transition(&self) -> &TransitionMachine {
        &self.transition
    }

    /// Last HUD publish.
    #[must_use]
    pub fn last_hud(&self) -> Option<&HudState> {
        self.hud.last()
    }
}

fn publish_snapshot(
    snapshots: &mut SnapshotPublisher,
    events: &EventSender,
    player: &Player,
) -> Result<SurvivalSnapshot, SnapshotError> {
    let snapshot = snapshots.publish(&player.vitals, now_millis())?;
    events.send(EngineEvent::SnapshotPublished {
        updated_at: snapshot.updated_at,
    });
    Ok(snapshot)
}

/// [`SurvivalContext`] over the engine fields the watchdog may touch.
struct SurvivalHandle<'a> {
    player: &'a mut Player,
    hud: &'a mut HudPublisher,
    snapshots: &'a mut SnapshotPublisher,
    recorder: &'a mut DiagnosticRecorder,
    events: &'a EventSender,
    dimension: &'a str,
    frame: u64,
    status: Option<String>,
}

impl SurvivalContext for SurvivalHandle<'_> {
    fn restore_vitals(&mut self) {
        self.player.vitals.reset();
    }

    fn publish_hud(&mut self) {
        let state = HudState::new(
            &self.player.vitals,
            self.dimension,
            self.player.points,
            self.frame,
            self.status.clone(),
        );
        self.hud.publish(state);
    }

    fn publish_snapshot(&mut self) -> Result<(), SnapshotError> {
        publish_snapshot(self.snapshots, self.events, self.player).map(|_| ())
    }

    fn record_diagnostic(&mut self, kind: FailureKind, message: String) {
        self.recorder.record(kind, "watchdog", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let config = EngineConfig {
            grid_size: 32,
            ..EngineConfig::default()
        }
        .inline();
        let mut engine = Engine::new(config).unwrap();
        engine.start().unwrap();
        engine
    }

    #[test]
    fn test_start_builds_world_and_spawns() {
        let engine = engine();
        assert!(engine.is_started());
        assert_eq!(engine.world().chunks.chunk_count(), 4);
        // Origin spawns two zombies, no return portal on first entry.
        assert_eq!(engine.entities().mobs.len(), 2);
        assert!(engine.entities().portals().is_empty());
        assert_eq!(engine.player().chunk_key, Some(ChunkKey::new(1, 1)));
        assert_eq!(engine.world_view().dangling_entities, 0);
    }

    #[test]
    fn test_unknown_starting_dimension() {
        let config = EngineConfig {
            starting_dimension: "void".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::new(config),
            Err(EngineError::Config(ConfigError::UnknownDimension(_)))
        ));
    }

    #[test]
    fn test_not_started_refuses_portals() {
        let mut engine = Engine::new(EngineConfig::default().inline()).unwrap();
        assert!(matches!(engine.advance_dimension(None), Err(EngineError::NotStarted)));
        assert_eq!(engine.tick(0.1).frame, 0);
    }

    #[test]
    fn test_tick_reaches_steady_state() {
        let mut engine = engine();
        for _ in 0..5 {
            engine.tick(0.1);
        }
        let metrics = engine.developer_metrics();
        assert_eq!(metrics.frame, 5);
        assert_eq!(metrics.dirty_chunks, 0);
        assert_eq!(metrics.nav_grids, 4);
        assert!(metrics.hud_publishes >= 5);
        assert_eq!(engine.world_view().dangling_entities, 0);
    }

    #[test]
    fn test_edit_marks_nav_dirty_and_rebuilds() {
        let mut engine = engine();
        engine.tick(0.0);
        let outcome = (0..32)
            .flat_map(|gx| (0..32).map(move |gz| (gx, gz)))
            .find_map(|(gx, gz)| {
                engine
                    .set_column_block(gx, gz, ColumnMutation::Place(strata_worldgen::BlockKind::Stone))
                    .ok()
            })
            .unwrap();
        assert_eq!(outcome.height, outcome.previous_height + 1);
        assert!(engine.navmesh().pending_count() > 0);
        assert!(engine.world().chunks.dirty_count() > 0);

        let report = engine.tick(0.0);
        assert!(report.chunks_rebuilt >= 1);
        assert!(report.nav_rebuilt >= 1);
    }

    #[test]
    fn test_update_hud_keeps_status() {
        let mut engine = engine();
        let state = engine.update_hud(HudContext {
            status: Some("digging".into()),
        });
        assert_eq!(state.status.as_deref(), Some("digging"));
        let state = engine.update_hud(HudContext::default());
        assert_eq!(state.status.as_deref(), Some("digging"));
        assert_eq!(state.dimension, "Origin");
    }

    #[test]
    fn test_metrics_serialize() {
        let engine = engine();
        let json = serde_json::to_value(engine.developer_metrics()).unwrap();
        assert_eq!(json["dimension"], "origin");
        assert!(json["workers"]["ai-step"].is_object());
    }
}
