//! # Entity-Chunk Anchoring
//!
//! Entities only remember the key of the chunk they stand in. After the
//! world changes underneath them, a rebind pass recomputes every key from
//! the entity position and decides what happens to entities whose chunk is
//! gone:
//!
//! | category             | chunk exists | chunk missing                    |
//! |----------------------|--------------|----------------------------------|
//! | player               | rebound      | relocated to spawn column        |
//! | mob                  | rebound      | despawned                        |
//! | persistent object    | rebound      | relocated, counted as `missing`  |
//! | other object         | rebound      | despawned                        |
//!
//! Entities below the new surface are lifted onto it. For every category
//! `rebound + missing + despawned == total`.

use std::collections::BTreeMap;

use serde::Serialize;
use strata_core::Handle;
use strata_worldgen::{ChunkKey, ChunkManager};

use crate::entities::EntityStore;

/// Outcome counts for one entity category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    /// Entities examined.
    pub total: usize,
    /// Bound to an existing chunk.
    pub rebound: usize,
    /// Chunk gone, entity kept and relocated.
    pub missing: usize,
    /// Chunk gone, entity removed.
    pub despawned: usize,
}

impl CategoryReport {
    /// `rebound + missing + despawned == total`.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.rebound + self.missing + self.despawned == self.total
    }

    fn add(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Rebound => self.rebound += 1,
            Outcome::Missing => self.missing += 1,
            Outcome::Despawned => self.despawned += 1,
        }
    }
}

#[derive(Clone, Copy)]
enum Outcome {
    Rebound,
    Missing,
    Despawned,
}

/// What happened to the player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlayerRebind {
    /// Key after the pass.
    pub chunk_key: ChunkKey,
    /// Moved to the spawn column because the chunk was gone.
    pub relocated: bool,
    /// Moved up onto the surface.
    pub lifted: bool,
}

/// An entity removed by a rebind pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Despawn {
    /// `"mob"` or `"object"`.
    pub category: &'static str,
    /// Kind name.
    pub kind: String,
    /// Packed pool handle.
    pub handle: u64,
}

/// Result of [`rebind_all`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RebindReport {
    /// Why the pass ran.
    pub reason: String,
    /// Player outcome.
    pub player: PlayerRebind,
    /// Mob counts.
    pub mobs: CategoryReport,
    /// Object counts.
    pub objects: CategoryReport,
    /// Mob counts per kind name.
    pub mob_kinds: BTreeMap<String, CategoryReport>,
    /// Removed entities.
    pub despawned: Vec<Despawn>,
    /// Problems that did not stop the pass.
    pub errors: Vec<String>,
}

impl RebindReport {
    /// Counts for mob kind `name`, zero if none were seen.
    #[must_use]
    pub fn kind(&self, name: &str) -> CategoryReport {
        self.mob_kinds.get(name).copied().unwrap_or_default()
    }

    /// Balanced counts in every category and kind.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.mobs.is_balanced()
            && self.objects.is_balanced()
            && self.mob_kinds.values().all(CategoryReport::is_balanced)
    }
}

/// Standing position on column `(gx, gz)`.
fn surface_position(chunks: &ChunkManager, column: (i32, i32)) -> [f32; 3] {
    let height = chunks.height_at(column.0, column.1).unwrap_or(0);
    [column.0 as f32 + 0.5, f32::from(height), column.1 as f32 + 0.5]
}

/// Lifts `position` onto the surface. Returns true if it moved.
fn lift(chunks: &ChunkManager, position: &mut [f32; 3]) -> bool {
    let (gx, gz) = (position[0].floor() as i32, position[2].floor() as i32);
    match chunks.height_at(gx, gz).map(f32::from) {
        Some(ground) if position[1] < ground => {
            position[1] = ground;
            true
        }
        _ => false,
    }
}

fn key_of(chunks: &ChunkManager, position: [f32; 3]) -> ChunkKey {
    chunks.chunk_key_for_position(position[0], position[2])
}

/// Rebinds every entity against `chunks`.
pub fn rebind_all(entities: &mut EntityStore, chunks: &ChunkManager, reason: &str) -> RebindReport {
    let mut report = RebindReport {
        reason: reason.to_string(),
        ..RebindReport::default()
    };
    let spawn = chunks.spawn_column();
    let spawn_key = chunks.chunk_key_for_column(spawn.0, spawn.1);
    let spawn_exists = chunks.contains_chunk(spawn_key);
    if !spawn_exists {
        report.errors.push(format!("spawn chunk {spawn_key} does not exist"));
    }

    // Player
    let player = &mut entities.player;
    let mut key = key_of(chunks, player.position);
    let mut relocated = false;
    if !chunks.contains_chunk(key) {
        player.position = surface_position(chunks, spawn);
        key = spawn_key;
        relocated = true;
    }
    let lifted = lift(chunks, &mut player.position);
    player.chunk_key = Some(key);
    report.player = PlayerRebind {
        chunk_key: key,
        relocated,
        lifted,
    };

    // Mobs
    let mut mobs = CategoryReport::default();
    let mut mob_kinds: BTreeMap<String, CategoryReport> = BTreeMap::new();
    let removed = entities.mobs.drain_filter(|_, mob| {
        let key = key_of(chunks, mob.position);
        let outcome = if chunks.contains_chunk(key) {
            mob.chunk_key = Some(key);
            lift(chunks, &mut mob.position);
            Outcome::Rebound
        } else {
            mob.chunk_key = None;
            Outcome::Despawned
        };
        mobs.add(outcome);
        mob_kinds.entry(mob.kind.name().to_string()).or_default().add(outcome);
        matches!(outcome, Outcome::Rebound)
    });
    for (handle, mob) in removed {
        report.despawned.push(Despawn {
            category: "mob",
            kind: mob.kind.name().to_string(),
            handle: handle.to_bits(),
        });
    }
    report.mobs = mobs;
    report.mob_kinds = mob_kinds;

    // Objects
    let mut objects = CategoryReport::default();
    let mut relocation_errors = Vec::new();
    let removed = entities.objects.drain_filter(|_, object| {
        let key = key_of(chunks, object.position);
        let outcome = if chunks.contains_chunk(key) {
            object.chunk_key = Some(key);
            lift(chunks, &mut object.position);
            Outcome::Rebound
        } else if object.persistent && spawn_exists {
            object.position = surface_position(chunks, spawn);
            object.chunk_key = Some(spawn_key);
            Outcome::Missing
        } else {
            if object.persistent {
                relocation_errors.push(format!("cannot relocate {}: no spawn chunk", object.kind));
            }
            object.chunk_key = None;
            Outcome::Despawned
        };
        objects.add(outcome);
        !matches!(outcome, Outcome::Despawned)
    });
    for (handle, object) in removed {
        report.despawned.push(Despawn {
            category: "object",
            kind: object.kind.name().to_string(),
            handle: handle.to_bits(),
        });
    }
    report.objects = objects;
    report.errors.extend(relocation_errors);

    tracing::info!(
        reason,
        mobs_rebound = report.mobs.rebound,
        mobs_despawned = report.mobs.despawned,
        objects_missing = report.objects.missing,
        player_relocated = report.player.relocated,
        "entities rebound"
    );
    report
}

/// Outcome of [`rebind_mob`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MobAnchor {
    /// Key updated.
    Rebound(ChunkKey),
    /// Chunk gone; the mob was removed.
    Despawned,
    /// No live mob behind the handle.
    Unknown,
}

/// Rebinds a single mob after it moved.
pub fn rebind_mob(entities: &mut EntityStore, chunks: &ChunkManager, handle: Handle) -> MobAnchor {
    let Some(mob) = entities.mobs.get_mut(handle) else {
        return MobAnchor::Unknown;
    };
    let key = key_of(chunks, mob.position);
    if chunks.contains_chunk(key) {
        mob.chunk_key = Some(key);
        lift(chunks, &mut mob.position);
        MobAnchor::Rebound(key)
    } else {
        entities.mobs.remove(handle);
        MobAnchor::Despawned
    }
}

/// Live entities whose key is unset, stale or points at a missing chunk.
#[must_use]
pub fn dangling_count(entities: &EntityStore, chunks: &ChunkManager) -> usize {
    let bound = |position: [f32; 3], key: Option<ChunkKey>| {
        key.is_some_and(|k| k == key_of(chunks, position) && chunks.contains_chunk(k))
    };
    let player = usize::from(!bound(entities.player.position, entities.player.chunk_key));
    let mobs = entities
        .mobs
        .iter()
        .filter(|(_, mob)| !bound(mob.position, mob.chunk_key))
        .count();
    let objects = entities
        .objects
        .iter()
        .filter(|(_, object)| !bound(object.position, object.chunk_key))
        .count();
    player + mobs + objects
}
