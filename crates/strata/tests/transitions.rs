//! # Dimension Transition Tests
//!
//! Portal transitions driven through the engine surface, with inline,
//! hand-released and dead worker backends.

mod common;

use common::{small_config, DeadBackend, ManualBackend};
use strata::entities::Mob;
use strata::transition::StageOutcome;
use strata::{
    CategoryReport, Engine, EngineBuilder, EngineError, FailureKind, HookRegistry, MobKind,
    PortalEvent, TaskType, TransitionError, TransitionState, WorkerConfig,
};

fn spawn_golem(engine: &mut Engine) {
    let (sx, sz) = engine.world().chunks.spawn_column();
    let height = engine.world().chunks.height_at(sx, sz).unwrap_or(0);
    let position = [sx as f32 + 0.5, f32::from(height), sz as f32 + 0.5];
    let mut golem = Mob::new(MobKind::Golem, position, 7);
    golem.chunk_key = Some(engine.world().chunks.chunk_key_for_position(position[0], position[2]));
    engine.entities_mut().spawn_mob(golem).unwrap();
}

// ============================================================================
// Rebind accounting
// ============================================================================

#[test]
fn test_origin_to_rock_rebinds_single_golem() {
    let mut engine = EngineBuilder::new(small_config())
        .hooks(HookRegistry::new())
        .build()
        .unwrap();
    engine.start().unwrap();
    assert_eq!(engine.entities().mobs.len(), 0);
    spawn_golem(&mut engine);

    let state = engine.advance_dimension(None).unwrap();
    assert_eq!(state, TransitionState::Ready);
    assert_eq!(engine.world().profile.id, "rock");

    let report = engine.transition().last_report().unwrap();
    assert_eq!(report.from, "origin");
    assert_eq!(report.to, "rock");
    assert_eq!(
        report.outcome(TransitionState::RebindingEntities),
        Some(&StageOutcome::Completed)
    );
    let rebind = report.rebind.as_ref().unwrap();
    assert_eq!(
        rebind.kind("golem"),
        CategoryReport {
            total: 1,
            rebound: 1,
            missing: 0,
            despawned: 0,
        }
    );
    assert!(rebind.is_balanced());
    assert_eq!(engine.world_view().dangling_entities, 0);
}

#[test]
fn test_transition_runs_every_stage_in_order() {
    let mut engine = Engine::new(small_config()).unwrap();
    engine.start().unwrap();
    let events = engine.subscribe();
    events.drain();

    engine.advance_dimension(Some(3)).unwrap();
    let stages: Vec<TransitionState> = events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            strata::EngineEvent::TransitionStage { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            TransitionState::ExitingDimension,
            TransitionState::ApplyingProfile,
            TransitionState::RebuildingWorld,
            TransitionState::RebindingEntities,
            TransitionState::RunningReadyHooks,
            TransitionState::VerifyingAssets,
            TransitionState::Ready,
        ]
    );
    assert_eq!(engine.player().points, 3);
    // Rock places a portal back to origin.
    assert_eq!(engine.entities().portals().len(), 1);
}

#[test]
fn test_walks_all_dimensions_and_wraps() {
    let mut engine = Engine::new(small_config()).unwrap();
    engine.start().unwrap();
    let mut seen = vec![engine.world().profile.id.clone()];
    for _ in 0..3 {
        engine.advance_dimension(Some(1)).unwrap();
        engine.tick(0.1);
        seen.push(engine.world().profile.id.clone());
        assert_eq!(engine.world_view().dangling_entities, 0);
    }
    assert_eq!(seen, vec!["origin", "rock", "ember", "origin"]);
    assert_eq!(engine.developer_metrics().transitions_completed, 3);
    assert_eq!(engine.player().points, 3);
}

#[test]
fn test_not_started() {
    let mut engine = Engine::new(small_config()).unwrap();
    assert!(matches!(
        engine.enter_portal(PortalEvent::to("rock")),
        Err(EngineError::NotStarted)
    ));
}

// ============================================================================
// Atomicity with a threaded backend
// ============================================================================

#[test]
fn test_world_stays_consistent_until_generation_lands() {
    let backend = ManualBackend::new();
    let config = strata::EngineConfig {
        grid_size: 32,
        ..strata::EngineConfig::default()
    };
    let mut engine = EngineBuilder::new(config)
        .backend(Box::new(backend.clone()))
        .build()
        .unwrap();
    engine.start().unwrap();
    let origin_meta = engine.world().meta.clone();
    let origin_keys = engine.world_view().chunk_keys;
    let mobs_before = engine.entities().mobs.len();

    let state = engine.advance_dimension(Some(5)).unwrap();
    assert_eq!(state, TransitionState::RebuildingWorld);

    // Second portal while busy is refused.
    assert!(matches!(
        engine.enter_portal(PortalEvent::to("ember")),
        Err(EngineError::Transition(TransitionError::Busy(TransitionState::RebuildingWorld)))
    ));

    for _ in 0..10 {
        let report = engine.tick(0.05);
        assert_eq!(report.transition, TransitionState::RebuildingWorld);
        assert_eq!(report.ai_request, None);
        let view = engine.world_view();
        assert_eq!(view.dangling_entities, 0);
        assert_eq!(view.chunk_keys, origin_keys);
        assert_eq!(view.mob_count, mobs_before);
        assert_eq!(engine.world().meta, origin_meta);
    }
    assert_eq!(engine.player().points, 0);

    let request = engine.workers().latest(TaskType::WorldGeneration).unwrap();
    assert_eq!(backend.queued(TaskType::WorldGeneration), vec![request]);
    assert!(backend.complete(TaskType::WorldGeneration, request));

    let report = engine.tick(0.05);
    assert_eq!(report.transition, TransitionState::Ready);
    assert_eq!(engine.world().profile.id, "rock");
    assert_ne!(engine.world().meta, origin_meta);
    assert_eq!(engine.world().chunks.dirty_count(), 0);
    assert_eq!(engine.world_view().dangling_entities, 0);
    assert_eq!(engine.player().points, 5);
    assert!(engine
        .transition()
        .last_report()
        .and_then(|r| r.rebind.as_ref())
        .is_some_and(|r| r.is_balanced()));
}

#[test]
fn test_staged_world_meshes_within_frame_budget() {
    let backend = ManualBackend::new();
    let config = strata::EngineConfig {
        grid_size: 32,
        frame_budget: 1,
        ..strata::EngineConfig::default()
    };
    let mut engine = EngineBuilder::new(config)
        .backend(Box::new(backend.clone()))
        .build()
        .unwrap();
    engine.start().unwrap();
    let origin_meta = engine.world().meta.clone();

    engine.advance_dimension(None).unwrap();
    let request = engine.workers().latest(TaskType::WorldGeneration).unwrap();
    assert!(backend.complete(TaskType::WorldGeneration, request));

    // Four staged chunks, one meshed per frame; the last one commits.
    for _ in 0..3 {
        assert_eq!(engine.tick(0.05).transition, TransitionState::RebuildingWorld);
        assert_eq!(engine.world().meta, origin_meta);
        assert_eq!(engine.world_view().dangling_entities, 0);
    }
    assert_eq!(engine.tick(0.05).transition, TransitionState::Ready);
    assert_ne!(engine.world().meta, origin_meta);
    assert_eq!(engine.world().chunks.chunk_count(), 4);
    assert_eq!(engine.world().chunks.dirty_count(), 0);
}

// ============================================================================
// Worker fallback
// ============================================================================

#[test]
fn test_dead_backend_falls_back_inline() {
    let config = strata::EngineConfig {
        grid_size: 32,
        ..strata::EngineConfig::default()
    };
    let mut engine = EngineBuilder::new(config)
        .backend(Box::new(DeadBackend))
        .build()
        .unwrap();
    engine.start().unwrap();

    engine.advance_dimension(None).unwrap();
    for _ in 0..3 {
        engine.tick(0.05);
    }

    assert_eq!(engine.transition().state(), TransitionState::Ready);
    assert_eq!(engine.world().profile.id, "rock");
    assert!(!engine.workers().is_threaded());
    assert_eq!(engine.workers().backend_name(), "inline (degraded)");
    assert!(engine.diagnostics().count(FailureKind::WorkerUnavailable) >= 1);
    assert_eq!(engine.workers().stats(TaskType::WorldGeneration).inline_fallbacks, 1);
}

#[test]
fn test_unanswered_generation_completes_inline() {
    let backend = ManualBackend::new();
    let config = strata::EngineConfig {
        grid_size: 32,
        worker: WorkerConfig {
            result_timeout_frames: 5,
            ..WorkerConfig::default()
        },
        ..strata::EngineConfig::default()
    };
    let mut engine = EngineBuilder::new(config)
        .backend(Box::new(backend.clone()))
        .build()
        .unwrap();
    engine.start().unwrap();

    assert_eq!(engine.advance_dimension(None).unwrap(), TransitionState::RebuildingWorld);
    let request = engine.workers().latest(TaskType::WorldGeneration).unwrap();
    for _ in 0..5 {
        assert_eq!(engine.tick(0.05).transition, TransitionState::RebuildingWorld);
    }

    // The backend never answered; the request ran inline.
    assert_eq!(engine.tick(0.05).transition, TransitionState::Ready);
    assert_eq!(engine.world().profile.id, "rock");
    assert_eq!(engine.world_view().dangling_entities, 0);
    let stats = engine.workers().stats(TaskType::WorldGeneration);
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.inline_fallbacks, 1);
    assert!(engine.diagnostics().count(FailureKind::WorkerUnavailable) >= 1);
    assert!(engine.workers().is_threaded());

    // A late answer is stale.
    assert!(backend.complete(TaskType::WorldGeneration, request));
    engine.tick(0.05);
    assert_eq!(engine.workers().stats(TaskType::WorldGeneration).stale_discarded, 1);
    assert_eq!(engine.world().profile.id, "rock");
}

#[test]
fn test_unknown_portal_target_stays_put() {
    let mut engine = Engine::new(small_config()).unwrap();
    engine.start().unwrap();

    let state = engine.enter_portal(PortalEvent::to("void")).unwrap();
    assert_eq!(state, TransitionState::Ready);
    assert_eq!(engine.world().profile.id, "origin");
    assert_eq!(engine.diagnostics().count(FailureKind::Configuration), 1);
    let report = engine.transition().last_report().unwrap();
    assert!(matches!(
        report.outcome(TransitionState::ApplyingProfile),
        Some(StageOutcome::Failed(_))
    ));
}

#[test]
fn test_missing_assets_use_placeholders() {
    let mut engine = EngineBuilder::new(small_config())
        .assets(Box::new(strata::transition::StaticAssetResolver::new(Vec::<String>::new())))
        .build()
        .unwrap();
    engine.start().unwrap();
    engine.advance_dimension(None).unwrap();

    let report = engine.transition().last_report().unwrap();
    let manifest = &engine.world().profile.required_asset_manifest;
    assert_eq!(report.placeholders.len(), manifest.len());
    assert_eq!(
        engine.diagnostics().count(FailureKind::AssetMissing),
        manifest.len() as u64
    );
}
