//! # Dimension Transition State Machine
//!
//! A portal event walks the engine through fixed stages:
//!
//! ```text
//!  Idle ─┐
//!        ├─ PortalEvent ─> ExitingDimension ─> ApplyingProfile ─> RebuildingWorld
//!  Ready ┘                                                             │ (Pending until
//!    ^                                                                 v  world arrives)
//!    └── VerifyingAssets <── RunningReadyHooks <── RebindingEntities <─┘
//! ```
//!
//! Stages are polled in order. A stage returns [`StagePoll::Pending`] to be
//! polled again next frame; only `RebuildingWorld` ever does, while it waits
//! for a `world-generation` worker result and then while it meshes the
//! arrived chunks `frame_budget` per frame. The new chunk set is staged off
//! to the side and committed together with the entity rebind, so nothing
//! ever observes an entity bound to a chunk of the other world.
//!
//! Hook and asset failures are recorded and the transition carries on.

use std::collections::HashSet;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use strata_worldgen::{ChunkManager, DimensionProfile, GeneratedWorld, GenerationMeta, WorldSeed};

use crate::anchoring::{rebind_all, RebindReport};
use crate::config::EngineConfig;
use crate::diagnostics::{DiagnosticRecorder, FailureKind};
use crate::entities::{EntityStore, InteractiveObject, Mob, MobKind};
use crate::error::{HookError, TransitionError};
use crate::events::{EngineEvent, EventSender};
use crate::navmesh::NavMesh;
use crate::registry::DimensionRegistry;
use crate::worker::{RequestId, TaskPayload, TaskResult, TaskType, WorkerDispatcher};
use crate::world::World;

const SOURCE: &str = "transition";

// =============================================================================
// States and reports
// =============================================================================

/// Transition stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionState {
    /// Nothing happened yet.
    #[default]
    Idle,
    /// Running exit hooks of the departing dimension.
    ExitingDimension,
    /// Swapping in the target profile.
    ApplyingProfile,
    /// Producing and staging the new terrain.
    RebuildingWorld,
    /// Committing the new terrain and rebinding entities.
    RebindingEntities,
    /// Running ready hooks of the new dimension.
    RunningReadyHooks,
    /// Resolving required assets.
    VerifyingAssets,
    /// Finished.
    Ready,
}

impl TransitionState {
    /// Stage that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Idle => Self::ExitingDimension,
            Self::ExitingDimension => Self::ApplyingProfile,
            Self::ApplyingProfile => Self::RebuildingWorld,
            Self::RebuildingWorld => Self::RebindingEntities,
            Self::RebindingEntities => Self::RunningReadyHooks,
            Self::RunningReadyHooks => Self::VerifyingAssets,
            Self::VerifyingAssets | Self::Ready => Self::Ready,
        }
    }

    /// True between the portal event and `Ready`.
    #[must_use]
    pub const fn is_running(self) -> bool {
        !matches!(self, Self::Idle | Self::Ready)
    }

    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ExitingDimension => "exiting-dimension",
            Self::ApplyingProfile => "applying-profile",
            Self::RebuildingWorld => "rebuilding-world",
            Self::RebindingEntities => "rebinding-entities",
            Self::RunningReadyHooks => "running-ready-hooks",
            Self::VerifyingAssets => "verifying-assets",
            Self::Ready => "ready",
        }
    }
}

/// Request to move to another dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortalEvent {
    /// Target dimension id.
    pub target: String,
    /// Points granted on arrival.
    pub points_awarded: Option<u64>,
}

impl PortalEvent {
    /// Event for `target` without points.
    #[must_use]
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            points_awarded: None,
        }
    }
}

/// Result of polling a stage once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StagePoll {
    /// Move on to the next stage.
    Complete,
    /// Poll again next frame.
    Pending,
}

/// How a finished stage went.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "kebab-case")]
pub enum StageOutcome {
    /// No problems.
    Completed,
    /// Problems were recorded; the transition continued.
    Failed(String),
}

/// Everything that happened during one transition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    /// Departing dimension.
    pub from: String,
    /// Dimension actually entered.
    pub to: String,
    /// Points added to the player.
    pub points_awarded: u64,
    /// Outcome per finished stage, in order.
    pub stages: Vec<(TransitionState, StageOutcome)>,
    /// Rebind pass of the commit stage.
    pub rebind: Option<RebindReport>,
    /// Generation facts of the new terrain.
    pub generation: Option<GenerationMeta>,
    /// Assets replaced by placeholders.
    pub placeholders: Vec<String>,
    /// Mobs added by ready hooks.
    pub spawned_mobs: usize,
}

impl TransitionReport {
    /// Outcome of `state`, if it ran.
    #[must_use]
    pub fn outcome(&self, state: TransitionState) -> Option<&StageOutcome> {
        self.stages.iter().find(|(s, _)| *s == state).map(|(_, o)| o)
    }
}

// =============================================================================
// Hooks
// =============================================================================

/// What a hook may read and change.
pub struct HookContext<'a> {
    /// Departing dimension id (empty on first entry).
    pub from: &'a str,
    /// Target dimension id.
    pub to: &'a str,
    /// Profile the hook runs for.
    pub profile: &'a DimensionProfile,
    /// World seed.
    pub seed: WorldSeed,
    /// Terrain the hook runs against.
    pub chunks: &'a ChunkManager,
    /// Entities.
    pub entities: &'a mut EntityStore,
}

/// Lifecycle callback run on exit from or arrival in a dimension.
pub trait DimensionHook: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Runs the hook.
    ///
    /// # Errors
    ///
    /// [`HookError`]; it is recorded and the transition continues.
    fn run(&mut self, context: &mut HookContext<'_>) -> Result<(), HookError>;
}

struct Registered {
    dimension: Option<String>,
    hook: Box<dyn DimensionHook>,
}

/// Exit and ready hooks, in registration order.
#[derive(Default)]
pub struct HookRegistry {
    exit: Vec<Registered>,
    ready: Vec<Registered>,
}

impl HookRegistry {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mob spawning and return portal placement for every dimension.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut hooks = Self::new();
        hooks.on_ready(None, Box::new(SpawnInitialMobs));
        hooks.on_ready(None, Box::new(PlaceReturnPortal));
        hooks
    }

    /// Runs `hook` when leaving `dimension` (`None` = any).
    pub fn on_exit(&mut self, dimension: Option<&str>, hook: Box<dyn DimensionHook>) {
        self.exit.push(Registered {
            dimension: dimension.map(str::to_string),
            hook,
        });
    }

    /// Runs `hook` when arriving in `dimension` (`None` = any).
    pub fn on_ready(&mut self, dimension: Option<&str>, hook: Box<dyn DimensionHook>) {
        self.ready.push(Registered {
            dimension: dimension.map(str::to_string),
            hook,
        });
    }

    fn run(list: &mut [Registered], dimension: &str, context: &mut HookContext<'_>) -> Vec<HookError> {
        let mut errors = Vec::new();
        for entry in list.iter_mut() {
            if entry.dimension.as_deref().is_some_and(|d| d != dimension) {
                continue;
            }
            if let Err(err) = entry.hook.run(context) {
                errors.push(err);
            }
        }
        errors
    }

    /// Runs exit hooks for `dimension`.
    pub fn run_exit(&mut self, dimension: &str, context: &mut HookContext<'_>) -> Vec<HookError> {
        Self::run(&mut self.exit, dimension, context)
    }

    /// Runs ready hooks for `dimension`.
    pub fn run_ready(&mut self, dimension: &str, context: &mut HookContext<'_>) -> Vec<HookError> {
        Self::run(&mut self.ready, dimension, context)
    }
}

/// Columns around the spawn point considered for initial mobs.
const SPAWN_RADIUS: i32 = 12;

/// Attempts per mob before falling back to the spawn column.
const SPAWN_ATTEMPTS: usize = 16;

/// Spawns the profile's initial mobs on safe columns near the spawn point.
pub struct SpawnInitialMobs;

impl DimensionHook for SpawnInitialMobs {
    fn name(&self) -> &str {
        "spawn-initial-mobs"
    }

    fn run(&mut self, context: &mut HookContext<'_>) -> Result<(), HookError> {
        let chunks = context.chunks;
        let (sx, sz) = chunks.spawn_column();
        let mut rng = ChaCha8Rng::seed_from_u64(context.seed.derive_str(context.to).derive(0x5EED).value());
        let mut unknown = Vec::new();

        let safe = |gx: i32, gz: i32| {
            chunks.height_at(gx, gz).is_some_and(|h| h > 0)
                && chunks.top_block(gx, gz).is_some_and(|b| !b.kind.is_hazard())
        };

        for rule in &context.profile.spawns {
            let kind: MobKind = match rule.kind.parse() {
                Ok(kind) => kind,
                Err(err) => {
                    unknown.push(err.to_string());
                    continue;
                }
            };
            for _ in 0..rule.count {
                let mut column = (sx, sz);
                for _ in 0..SPAWN_ATTEMPTS {
                    let gx = sx + rng.gen_range(-SPAWN_RADIUS..=SPAWN_RADIUS);
                    let gz = sz + rng.gen_range(-SPAWN_RADIUS..=SPAWN_RADIUS);
                    if safe(gx, gz) {
                        column = (gx, gz);
                        break;
                    }
                }
                let height = chunks.height_at(column.0, column.1).unwrap_or(0);
                let position = [column.0 as f32 + 0.5, f32::from(height), column.1 as f32 + 0.5];
                let mut mob = Mob::new(kind, position, rng.gen());
                mob.chunk_key = Some(chunks.chunk_key_for_position(position[0], position[2]));
                if context.entities.spawn_mob(mob).is_none() {
                    return Err(HookError::new(self.name(), "mob pool full"));
                }
            }
        }

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(HookError::new(self.name(), unknown.join(", ")))
        }
    }
}

/// Places a portal back to the departing dimension next to the spawn point.
///
/// Existing portals are removed first; nothing is placed on first entry.
pub struct PlaceReturnPortal;

impl DimensionHook for PlaceReturnPortal {
    fn name(&self) -> &str {
        "place-return-portal"
    }

    fn run(&mut self, context: &mut HookContext<'_>) -> Result<(), HookError> {
        if context.from.is_empty() || context.from == context.to {
            return Ok(());
        }
        for handle in context.entities.portals() {
            context.entities.objects.remove(handle);
        }

        let chunks = context.chunks;
        let (sx, sz) = chunks.spawn_column();
        let last = chunks.grid_size().saturating_sub(1) as i32;
        let gx = (sx + 2).min(last);
        let height = chunks.height_at(gx, sz).unwrap_or(0);
        let position = [gx as f32 + 0.5, f32::from(height), sz as f32 + 0.5];

        let mut portal = InteractiveObject::portal(context.from, position);
        portal.chunk_key = Some(chunks.chunk_key_for_position(position[0], position[2]));
        context
            .entities
            .spawn_object(portal)
            .map(|_| ())
            .ok_or_else(|| HookError::new(self.name(), "object pool full"))
    }
}

// =============================================================================
// Assets
// =============================================================================

/// Answers whether an asset reference can be loaded.
pub trait AssetResolver: Send {
    /// True if `asset` resolves.
    fn resolve(&self, asset: &str) -> bool;
}

/// Resolver backed by a fixed set of known assets.
#[derive(Clone, Debug, Default)]
pub struct StaticAssetResolver {
    known: HashSet<String>,
}

impl StaticAssetResolver {
    /// Resolver that knows `assets`.
    #[must_use]
    pub fn new<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: assets.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolver that knows every asset the given profiles require.
    #[must_use]
    pub fn from_profiles<'a>(profiles: impl IntoIterator<Item = &'a DimensionProfile>) -> Self {
        Self::new(
            profiles
                .into_iter()
                .flat_map(|p| p.required_asset_manifest.iter().cloned()),
        )
    }
}

impl AssetResolver for StaticAssetResolver {
    fn resolve(&self, asset: &str) -> bool {
        self.known.contains(asset)
    }
}

// =============================================================================
// Machine
// =============================================================================

/// Engine state a transition reads and writes while stepping.
pub struct TransitionContext<'a> {
    /// Engine settings.
    pub config: &'a EngineConfig,
    /// Profile registry.
    pub registry: &'a DimensionRegistry,
    /// Lifecycle hooks.
    pub hooks: &'a mut HookRegistry,
    /// Asset lookup.
    pub assets: &'a dyn AssetResolver,
    /// Worker requests.
    pub workers: &'a mut WorkerDispatcher,
    /// Failure sink.
    pub recorder: &'a mut DiagnosticRecorder,
    /// Event bus.
    pub events: &'a EventSender,
    /// Live world.
    pub world: &'a mut World,
    /// Entities.
    pub entities: &'a mut EntityStore,
    /// Navigation grids.
    pub navmesh: &'a mut NavMesh,
}

struct Active {
    event: PortalEvent,
    profile: Option<Arc<DimensionProfile>>,
    request: Option<RequestId>,
    staged: Option<World>,
    report: TransitionReport,
}

/// Drives portal transitions one stage at a time.
#[derive(Default)]
pub struct TransitionMachine {
    state: TransitionState,
    active: Option<Active>,
    last_report: Option<TransitionReport>,
    completed: u64,
}

impl TransitionMachine {
    /// Idle machine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stage.
    #[must_use]
    pub const fn state(&self) -> TransitionState {
        self.state
    }

    /// True while a transition runs.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Report of the last finished transition.
    #[must_use]
    pub fn last_report(&self) -> Option<&TransitionReport> {
        self.last_report.as_ref()
    }

    /// Finished transitions.
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.completed
    }

    /// Target of the running transition.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.event.target.as_str())
    }

    /// Starts a transition from `current`.
    ///
    /// # Errors
    ///
    /// [`TransitionError::Busy`] while another transition runs.
    pub fn begin(&mut self, event: PortalEvent, current: &str, events: &EventSender) -> Result<(), TransitionError> {
        if self.state.is_running() {
            tracing::warn!(target_dimension = %event.target, state = ?self.state, "portal event rejected, transition running");
            return Err(TransitionError::Busy(self.state));
        }
        tracing::info!(from = current, to = %event.target, "dimension transition started");
        let report = TransitionReport {
            from: current.to_string(),
            to: event.target.clone(),
            ..TransitionReport::default()
        };
        self.active = Some(Active {
            event,
            profile: None,
            request: None,
            staged: None,
            report,
        });
        self.enter(TransitionState::ExitingDimension, events);
        Ok(())
    }

    fn enter(&mut self, state: TransitionState, events: &EventSender) {
        self.state = state;
        if let Some(active) = &self.active {
            events.send(EngineEvent::TransitionStage {
                from: active.report.from.clone(),
                to: active.report.to.clone(),
                state,
            });
        }
    }

    /// Hands over a `world-generation` result. Returns true if it belonged
    /// to the running transition.
    ///
    /// The staged chunks are meshed `frame_budget` at a time by later polls
    /// of the rebuild stage.
    pub fn offer_world(&mut self, request_id: RequestId, generated: GeneratedWorld, config: &EngineConfig) -> bool {
        let Some(active) = &mut self.active else {
            return false;
        };
        if self.state != TransitionState::RebuildingWorld || active.request != Some(request_id) {
            return false;
        }
        let Some(profile) = active.profile.clone() else {
            return false;
        };
        active.staged = Some(World::unmeshed(profile, generated, config));
        true
    }

    /// Polls stages until one is pending or the transition is `Ready`.
    pub fn step(&mut self, context: &mut TransitionContext<'_>) -> TransitionState {
        while self.state.is_running() {
            let Some(mut active) = self.active.take() else {
                break;
            };
            let state = self.state;
            let outcome = match state {
                TransitionState::ExitingDimension => Some(exit_dimension(&mut active, context)),
                TransitionState::ApplyingProfile => Some(apply_profile(&mut active, context)),
                TransitionState::RebuildingWorld => match rebuild_world(&mut active, context) {
                    StagePoll::Complete => Some(StageOutcome::Completed),
                    StagePoll::Pending => None,
                },
                TransitionState::RebindingEntities => Some(rebind_entities(&mut active, context)),
                TransitionState::RunningReadyHooks => Some(run_ready_hooks(&mut active, context)),
                TransitionState::VerifyingAssets => Some(verify_assets(&mut active, context)),
                TransitionState::Idle | TransitionState::Ready => None,
            };

            let Some(outcome) = outcome else {
                // Pending: keep waiting.
                self.active = Some(active);
                break;
            };
            active.report.stages.push((state, outcome));
            self.active = Some(active);
            let next = state.next();
            self.enter(next, context.events);
            if next == TransitionState::Ready {
                self.finish(context);
            }
        }
        self.state
    }

    fn finish(&mut self, context: &mut TransitionContext<'_>) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        let points = active.event.points_awarded.unwrap_or(0);
        context.entities.player.points += points;
        active.report.points_awarded = points;
        tracing::info!(
            from = %active.report.from,
            to = %active.report.to,
            points,
            placeholders = active.report.placeholders.len(),
            "dimension transition ready"
        );
        self.last_report = Some(active.report);
        self.completed += 1;
    }
}

fn outcome_of(errors: &[String]) -> StageOutcome {
    if errors.is_empty() {
        StageOutcome::Completed
    } else {
        StageOutcome::Failed(errors.join("; "))
    }
}

fn exit_dimension(active: &mut Active, ctx: &mut TransitionContext<'_>) -> StageOutcome {
    let world = &*ctx.world;
    let mut hook_ctx = HookContext {
        from: &active.report.from,
        to: &active.event.target,
        profile: &world.profile,
        seed: WorldSeed::new(ctx.config.seed),
        chunks: &world.chunks,
        entities: &mut *ctx.entities,
    };
    let errors: Vec<String> = ctx
        .hooks
        .run_exit(&active.report.from, &mut hook_ctx)
        .iter()
        .map(ToString::to_string)
        .collect();
    for err in &errors {
        ctx.recorder.record(FailureKind::HookFailure, SOURCE, err.clone());
    }
    outcome_of(&errors)
}

fn apply_profile(active: &mut Active, ctx: &mut TransitionContext<'_>) -> StageOutcome {
    let (profile, outcome) = match ctx.registry.get(&active.event.target) {
        Some(profile) => (profile, StageOutcome::Completed),
        None => {
            let reason = format!(
                "unknown dimension {:?}, staying in {}",
                active.event.target, ctx.world.profile.id
            );
            ctx.recorder.record(FailureKind::Configuration, SOURCE, reason.clone());
            (Arc::clone(&ctx.world.profile), StageOutcome::Failed(reason))
        }
    };
    active.report.to = profile.id.clone();
    ctx.world.profile = Arc::clone(&profile);
    active.profile = Some(profile);
    outcome
}

fn rebuild_world(active: &mut Active, ctx: &mut TransitionContext<'_>) -> StagePoll {
    if let Some(staged) = &mut active.staged {
        let remaining = staged.chunks.rebuild_dirty_chunks(ctx.config.frame_budget).remaining;
        if remaining > 0 {
            tracing::trace!(remaining, dimension = %staged.profile.id, "meshing staged world");
            return StagePoll::Pending;
        }
        World::note_fallback(&staged.meta, &staged.profile.id, ctx.recorder);
        return StagePoll::Complete;
    }
    let profile = active.profile.clone().unwrap_or_else(|| Arc::clone(&ctx.world.profile));
    let payload = TaskPayload::WorldGeneration {
        seed: WorldSeed::new(ctx.config.seed),
        profile: (*profile).clone(),
        grid_size: ctx.config.grid_size,
        budget: ctx.config.voxel_budget(),
    };

    if ctx.workers.is_threaded() {
        let superseded = active.request != ctx.workers.latest(TaskType::WorldGeneration)
            || !ctx.workers.is_pending(TaskType::WorldGeneration);
        if active.request.is_none() || superseded {
            let id = ctx.workers.submit(payload, ctx.recorder);
            tracing::debug!(request = %id, dimension = %profile.id, "world generation submitted");
            active.request = Some(id);
        }
        return StagePoll::Pending;
    }

    let TaskResult::WorldGeneration(generated) = ctx.workers.run_inline(&payload) else {
        return StagePoll::Pending;
    };
    World::note_fallback(&generated.meta, &profile.id, ctx.recorder);
    active.staged = Some(World::stage(profile, generated, ctx.config));
    StagePoll::Complete
}

fn rebind_entities(active: &mut Active, ctx: &mut TransitionContext<'_>) -> StageOutcome {
    let Some(staged) = active.staged.take() else {
        let reason = "no staged world to commit".to_string();
        ctx.recorder.record(FailureKind::Configuration, SOURCE, reason.clone());
        return StageOutcome::Failed(reason);
    };

    active.report.generation = Some(staged.meta.clone());
    *ctx.world = staged;
    ctx.workers.invalidate(TaskType::MeshPreparation);
    ctx.workers.invalidate(TaskType::AiStep);
    ctx.navmesh.clear();

    let report = rebind_all(ctx.entities, &ctx.world.chunks, "dimension-transition");
    for despawn in &report.despawned {
        ctx.events.send(EngineEvent::EntityDespawned {
            category: despawn.category,
            kind: despawn.kind.clone(),
            handle: despawn.handle,
        });
    }
    ctx.events.send(EngineEvent::DimensionChanged {
        from: active.report.from.clone(),
        to: active.report.to.clone(),
    });
    let outcome = outcome_of(&report.errors);
    active.report.rebind = Some(report);
    outcome
}

fn run_ready_hooks(active: &mut Active, ctx: &mut TransitionContext<'_>) -> StageOutcome {
    let before = ctx.entities.mobs.len();
    let world = &*ctx.world;
    let mut hook_ctx = HookContext {
        from: &active.report.from,
        to: &active.report.to,
        profile: &world.profile,
        seed: WorldSeed::new(ctx.config.seed),
        chunks: &world.chunks,
        entities: &mut *ctx.entities,
    };
    let errors: Vec<String> = ctx
        .hooks
        .run_ready(&active.report.to, &mut hook_ctx)
        .iter()
        .map(ToString::to_string)
        .collect();
    for err in &errors {
        ctx.recorder.record(FailureKind::HookFailure, SOURCE, err.clone());
    }
    active.report.spawned_mobs = ctx.entities.mobs.len().saturating_sub(before);
    outcome_of(&errors)
}

fn verify_assets(active: &mut Active, ctx: &mut TransitionContext<'_>) -> StageOutcome {
    for asset in &ctx.world.profile.required_asset_manifest {
        if ctx.assets.resolve(asset) {
            continue;
        }
        ctx.recorder.record(
            FailureKind::AssetMissing,
            SOURCE,
            format!("{}: asset {asset} missing, using placeholder", ctx.world.profile.id),
        );
        active.report.placeholders.push(asset.clone());
    }
    StageOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigationConfig;
    use crate::events::EventBus;
    use crate::worker::InlineBackend;

    struct Fixture {
        config: EngineConfig,
        registry: DimensionRegistry,
        hooks: HookRegistry,
        assets: StaticAssetResolver,
        workers: WorkerDispatcher,
        recorder: DiagnosticRecorder,
        events: EventSender,
        world: World,
        entities: EntityStore,
        navmesh: NavMesh,
    }

    impl Fixture {
        fn new() -> Self {
            let config = EngineConfig {
                grid_size: 32,
                ..EngineConfig::default()
            }
            .inline();
            let registry = DimensionRegistry::with_builtins();
            let origin = registry.get("origin").unwrap();
            let generated = World::generate_inline(&origin, &config);
            let world = World::stage(origin, generated, &config);
            let mut entities = EntityStore::new(&config);
            rebind_all(&mut entities, &world.chunks, "initial");
            Self {
                assets: StaticAssetResolver::from_profiles(&[DimensionProfile::origin()]),
                registry,
                hooks: HookRegistry::with_builtins(),
                workers: WorkerDispatcher::with_backend(Box::new(InlineBackend::new())),
                recorder: DiagnosticRecorder::new(64),
                events: EventBus::new(256).sender(),
                world,
                entities,
                navmesh: NavMesh::new(NavigationConfig::default()),
                config,
            }
        }

        fn step(&mut self, machine: &mut TransitionMachine) -> TransitionState {
            let mut ctx = TransitionContext {
                config: &self.config,
                registry: &self.registry,
                hooks: &mut self.hooks,
                assets: &self.assets,
                workers: &mut self.workers,
                recorder: &mut self.recorder,
                events: &self.events,
                world: &mut self.world,
                entities: &mut self.entities,
                navmesh: &mut self.navmesh,
            };
            machine.step(&mut ctx)
        }
    }

    #[test]
    fn test_inline_transition_runs_every_stage() {
        let mut fx = Fixture::new();
        let mut machine = TransitionMachine::new();
        machine
            .begin(
                PortalEvent {
                    target: "rock".into(),
                    points_awarded: Some(5),
                },
                "origin",
                &fx.events,
            )
            .unwrap();

        assert_eq!(fx.step(&mut machine), TransitionState::Ready);
        let report = machine.last_report().unwrap();
        assert_eq!(report.from, "origin");
        assert_eq!(report.to, "rock");
        assert_eq!(report.stages.len(), 6);
        assert_eq!(report.points_awarded, 5);
        assert_eq!(fx.entities.player.points, 5);
        assert_eq!(fx.world.profile.id, "rock");
        // Rock spawns two golems.
        assert_eq!(report.spawned_mobs, 2);
        assert_eq!(fx.entities.count_mobs(MobKind::Golem), 2);
        // Return portal to origin.
        assert_eq!(fx.entities.portals().len(), 1);
        // models/golem is not known to an origin-only resolver.
        assert_eq!(report.placeholders, vec!["models/golem".to_string()]);
        assert_eq!(fx.recorder.count(FailureKind::AssetMissing), 1);
    }

    #[test]
    fn test_busy_while_running() {
        let fx = Fixture::new();
        let mut machine = TransitionMachine::new();
        machine.begin(PortalEvent::to("rock"), "origin", &fx.events).unwrap();
        let err = machine.begin(PortalEvent::to("ember"), "origin", &fx.events).unwrap_err();
        assert_eq!(err, TransitionError::Busy(TransitionState::ExitingDimension));
    }

    #[test]
    fn test_unknown_target_falls_back_to_current() {
        let mut fx = Fixture::new();
        let mut machine = TransitionMachine::new();
        machine.begin(PortalEvent::to("nether"), "origin", &fx.events).unwrap();

        assert_eq!(fx.step(&mut machine), TransitionState::Ready);
        let report = machine.last_report().unwrap();
        assert_eq!(report.to, "origin");
        assert!(matches!(
            report.outcome(TransitionState::ApplyingProfile),
            Some(StageOutcome::Failed(_))
        ));
        assert_eq!(fx.recorder.count(FailureKind::Configuration), 1);
    }

    struct FailingHook;

    impl DimensionHook for FailingHook {
        fn name(&self) -> &str {
            "failing"
        }

        fn run(&mut self, _context: &mut HookContext<'_>) -> Result<(), HookError> {
            Err(HookError::new("failing", "boom"))
        }
    }

    #[test]
    fn test_failing_exit_hook_is_not_fatal() {
        let mut fx = Fixture::new();
        fx.hooks.on_exit(Some("origin"), Box::new(FailingHook));
        let mut machine = TransitionMachine::new();
        machine.begin(PortalEvent::to("ember"), "origin", &fx.events).unwrap();

        assert_eq!(fx.step(&mut machine), TransitionState::Ready);
        assert_eq!(fx.recorder.count(FailureKind::HookFailure), 1);
        let report = machine.last_report().unwrap();
        assert!(matches!(
            report.outcome(TransitionState::ExitingDimension),
            Some(StageOutcome::Failed(_))
        ));
        assert_eq!(report.outcome(TransitionState::RebindingEntities), Some(&StageOutcome::Completed));
    }

    #[test]
    fn test_spawns_are_deterministic() {
        let run = || {
            let mut fx = Fixture::new();
            let mut machine = TransitionMachine::new();
            machine.begin(PortalEvent::to("ember"), "origin", &fx.events).unwrap();
            fx.step(&mut machine);
            let mut positions: Vec<_> = fx.entities.mobs.iter().map(|(_, m)| m.position).collect();
            positions.sort_by(|a, b| a.partial_cmp(b).unwrap());
            positions
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_stage_order() {
        let mut state = TransitionState::Idle;
        let mut seen = Vec::new();
        while state != TransitionState::Ready {
            state = state.next();
            seen.push(state.as_str());
        }
        assert_eq!(
            seen,
            vec![
                "exiting-dimension",
                "applying-profile",
                "rebuilding-world",
                "rebinding-entities",
                "running-ready-hooks",
                "verifying-assets",
                "ready"
            ]
        );
    }
}
