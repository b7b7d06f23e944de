//! # World Generation Properties
//!
//! Determinism, bounds, budget fallback and the place/mine round trip,
//! checked through the public API only.

use strata_worldgen::{
    generate, Block, BlockKind, Cap, ChunkManager, Column, ColumnMutation, DimensionProfile,
    GenerationSource, HeightMatrix, Palette, VoxelBudget, WorldSeed,
};

#[test]
fn test_same_seed_identical_matrix() {
    let profile = DimensionProfile::origin();

    let a = generate(WorldSeed::new(98_765), &profile, 64, VoxelBudget::Unlimited);
    let b = generate(WorldSeed::new(98_765), &profile, 64, VoxelBudget::Unlimited);

    assert_eq!(a.matrix, b.matrix);
    assert_eq!(a.meta, b.meta);
    for (gx, gz, h) in a.matrix.iter() {
        assert!(
            (profile.min_height..=profile.max_height).contains(&h),
            "height {h} at ({gx}, {gz}) out of range"
        );
    }
    assert_eq!(a.meta.source, GenerationSource::Generated);
}

#[test]
fn test_every_profile_stays_in_bounds() {
    for profile in strata_worldgen::builtin_profiles() {
        for seed in [0, 1, 42, 98_765, u64::MAX] {
            let world = generate(WorldSeed::new(seed), &profile, 24, VoxelBudget::Unlimited);
            assert!(world.meta.min_height >= profile.min_height);
            assert!(world.meta.max_height <= profile.max_height);
        }
    }
}

#[test]
fn test_terrain_is_not_flat() {
    let world = generate(WorldSeed::new(7), &DimensionProfile::rock(), 64, VoxelBudget::Unlimited);
    assert!(world.meta.max_height > world.meta.min_height + 3);
}

#[test]
fn test_budget_is_respected_or_floor_reached() {
    let profile = DimensionProfile::ember();
    let floor = u64::from(profile.min_height) * 32 * 32;
    for limit in [floor, floor + 500, floor + 2_000, floor * 4] {
        let world = generate(WorldSeed::new(3), &profile, 32, VoxelBudget::Limit(limit));
        assert!(world.meta.voxel_count <= limit);
        assert_eq!(world.meta.voxel_count, world.matrix.voxel_count());
        if world.meta.source == GenerationSource::Fallback {
            assert!(world.meta.fallback_reason.is_some());
        }
    }
}

/// An empty 4x4 world with one stone block placed at (1, 2).
fn lone_stone() -> ChunkManager {
    let mut world = ChunkManager::new(4, 4, 16, Palette::default());
    world
        .set_column_block(1, 2, ColumnMutation::Place(BlockKind::Stone))
        .unwrap();
    world.rebuild_dirty_chunks(usize::MAX);
    world
}

#[test]
fn test_place_on_grass_buries_cap() {
    let mut world = ChunkManager::from_matrix(&HeightMatrix::filled(4, 1), &Palette::default(), 4, 16);
    world.rebuild_dirty_chunks(usize::MAX);
    assert_eq!(
        *world.column(1, 2).unwrap(),
        Column::from_blocks(vec![Block::capped(BlockKind::Stone, 0, Cap::Grass)])
    );

    let outcome = world
        .set_column_block(1, 2, ColumnMutation::Place(BlockKind::Stone))
        .unwrap();

    assert_eq!(outcome.height, 2);
    assert_eq!(world.height_at(1, 2), Some(2));
    assert!(world.chunk(outcome.key).unwrap().is_dirty());
    let column = world.column(1, 2).unwrap();
    assert_eq!(column.top().unwrap().kind, BlockKind::Stone);
    assert_eq!(column.blocks()[0].cap, Cap::Dirt);
    assert!(world.check_invariants());
}

#[test]
fn test_mine_restores_grass() {
    let mut world = ChunkManager::from_matrix(&HeightMatrix::filled(4, 1), &Palette::default(), 4, 16);
    world.rebuild_dirty_chunks(usize::MAX);
    let original = world.column(1, 2).unwrap().clone();

    world
        .set_column_block(1, 2, ColumnMutation::Place(BlockKind::Stone))
        .unwrap();
    world.rebuild_dirty_chunks(usize::MAX);

    let outcome = world.set_column_block(1, 2, ColumnMutation::Mine).unwrap();
    assert_eq!(outcome.height, 1);
    assert!(world.chunk(outcome.key).unwrap().is_dirty());
    assert_eq!(world.column(1, 2).unwrap(), &original);
    assert_eq!(world.column(1, 2).unwrap().top().unwrap().cap, Cap::Grass);
}

#[test]
fn test_empty_world_place_and_mine() {
    let mut world = lone_stone();
    assert_eq!(world.height_at(1, 2), Some(1));
    assert_eq!(world.column(1, 2).unwrap().top().unwrap().kind, BlockKind::Stone);
    assert_eq!(world.height_at(0, 0), Some(0));

    world.set_column_block(1, 2, ColumnMutation::Mine).unwrap();
    assert_eq!(world.height_at(1, 2), Some(0));
    assert!(world.column(1, 2).unwrap().is_empty());
    assert!(world.check_invariants());
}

#[test]
fn test_invariant_holds_through_random_edits() {
    let profile = DimensionProfile::origin();
    let generated = generate(WorldSeed::new(11), &profile, 32, VoxelBudget::Unlimited);
    let mut world = ChunkManager::from_profile(&generated.matrix, &profile, 8, 48);

    // Deterministic edit pattern: a mix of accepted and rejected mutations.
    let mut state = 0x1234_5678_u32;
    for step in 0..2_000 {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let gx = (state >> 8) as i32 % 34 - 1;
        let gz = (state >> 16) as i32 % 34 - 1;
        let mutation = if state & 1 == 0 {
            ColumnMutation::Mine
        } else {
            ColumnMutation::Place(BlockKind::Dirt)
        };
        let before = world.heights().clone();
        if world.set_column_block(gx, gz, mutation).is_err() {
            assert_eq!(world.heights(), &before, "rejected edit changed heights");
        }
        if step % 50 == 0 {
            world.rebuild_dirty_chunks(4);
        }
    }
    world.rebuild_dirty_chunks(usize::MAX);
    assert_eq!(world.dirty_count(), 0);
    assert!(world.check_invariants());
}
