//! # Terrain Rebuild Tests
//!
//! `build_terrain` with local generation and with pre-computed worker
//! output, including worlds that shrink under the entities.

mod common;

use common::small_config;
use strata::entities::{InteractiveObject, Mob, ObjectKind};
use strata::{BuildTerrainOptions, Engine, EngineEvent, MobKind, TerrainBundle};
use strata_worldgen::{generate, prepare_mesh_batch, ChunkKey, ChunkManager, DimensionProfile, WorldSeed};

fn bundle(grid_size: usize, engine: &Engine) -> TerrainBundle {
    let config = engine.config();
    let profile = DimensionProfile::origin();
    let world = generate(WorldSeed::new(config.seed), &profile, grid_size, config.voxel_budget());
    let chunks = ChunkManager::from_profile(&world.matrix, &profile, config.chunk_size, config.max_column_height);
    let meshes = prepare_mesh_batch(&chunks.mesh_inputs(&chunks.chunk_keys()));
    TerrainBundle { world, meshes }
}

#[test]
fn test_rebuild_is_deterministic() {
    let mut engine = Engine::new(small_config()).unwrap();
    engine.start().unwrap();
    let first = engine.world().meta.clone();
    let heights = engine.world().chunks.heights().clone();

    let meta = engine.build_terrain(BuildTerrainOptions::reason("reset")).unwrap();
    assert_eq!(meta, first);
    assert_eq!(engine.world().chunks.heights(), &heights);
    assert_eq!(engine.world_view().dangling_entities, 0);
}

#[test]
fn test_worker_result_is_installed_as_is() {
    let mut engine = Engine::new(small_config()).unwrap();
    engine.start().unwrap();
    let events = engine.subscribe();
    events.drain();

    let bundle = bundle(32, &engine);
    let expected = bundle.world.meta.clone();
    let meta = engine
        .build_terrain(BuildTerrainOptions {
            reason: "host".into(),
            worker_result: Some(bundle),
        })
        .unwrap();

    assert_eq!(meta, expected);
    assert_eq!(engine.world().chunks.dirty_count(), 0);
    assert!(events.drain().iter().any(
        |e| matches!(e, EngineEvent::TerrainBuilt { reason, voxel_count } if reason == "host" && *voxel_count == expected.voxel_count)
    ));
}

#[test]
fn test_shrinking_world_despawns_and_relocates() {
    let mut engine = Engine::new(small_config()).unwrap();
    engine.start().unwrap();
    let ground = |engine: &Engine, gx: i32, gz: i32| f32::from(engine.world().chunks.height_at(gx, gz).unwrap_or(0));

    // Far corner, gone once the world shrinks to one chunk.
    let y = ground(&engine, 28, 28);
    let far = engine
        .entities_mut()
        .spawn_mob(Mob::new(MobKind::Spider, [28.5, y, 28.5], 3))
        .unwrap();
    let y = ground(&engine, 3, 3);
    let near = engine
        .entities_mut()
        .spawn_mob(Mob::new(MobKind::Golem, [3.5, y, 3.5], 4))
        .unwrap();
    let y = ground(&engine, 29, 29);
    let portal = engine
        .entities_mut()
        .spawn_object(InteractiveObject::portal("rock", [29.5, y, 29.5]))
        .unwrap();
    engine
        .entities_mut()
        .spawn_object(InteractiveObject::new(ObjectKind::Chest, [30.5, y, 30.5]))
        .unwrap();
    assert!(engine.move_player([25.5, y, 25.5]));

    let events = engine.subscribe();
    events.drain();
    let small = bundle(16, &engine);
    engine
        .build_terrain(BuildTerrainOptions {
            reason: "shrink".into(),
            worker_result: Some(small),
        })
        .unwrap();

    let only = ChunkKey::new(0, 0);
    assert_eq!(engine.world().chunks.chunk_keys(), vec![only]);
    assert!(engine.entities().mobs.get(far).is_none());
    assert_eq!(engine.entities().mobs.get(near).unwrap().chunk_key, Some(only));
    assert_eq!(engine.entities().objects.get(portal).unwrap().chunk_key, Some(only));
    assert_eq!(engine.entities().objects.len(), 1);
    assert_eq!(engine.player().chunk_key, Some(only));
    assert_eq!(engine.world_view().dangling_entities, 0);

    let despawned: Vec<(&str, String)> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::EntityDespawned { category, kind, .. } => Some((category, kind)),
            _ => None,
        })
        .collect();
    assert!(despawned.contains(&("mob", "spider".to_string())));
    assert!(despawned.contains(&("object", "chest".to_string())));
    assert!(!despawned.iter().any(|(_, kind)| kind == "golem" || kind == "portal"));
}
