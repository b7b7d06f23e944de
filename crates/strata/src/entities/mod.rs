//! # Entity Store
//!
//! One player plus two fixed-capacity pools:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ EntityStore                                  │
//! │   player   : Player                          │
//! │   mobs     : Pool<Mob>               (Handle)│
//! │   objects  : Pool<InteractiveObject> (Handle)│
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Every entity carries an optional `chunk_key` for lookup. Nothing here
//! keeps chunks alive; the anchoring pass decides what happens to entities
//! whose chunk is gone.

pub mod mob;
pub mod object;
pub mod player;

pub use mob::{step_mobs, AiStepRequest, Mob, MobKind, MobState, MobStepInput, MobStepOutput};
pub use object::{InteractiveObject, ObjectKind};
pub use player::{Player, Vitals};

use strata_core::{Handle, Pool};

use crate::config::EngineConfig;

/// Player, mobs and interactive objects of the live world.
pub struct EntityStore {
    /// The player.
    pub player: Player,
    /// Mob pool.
    pub mobs: Pool<Mob>,
    /// Object pool.
    pub objects: Pool<InteractiveObject>,
}

impl EntityStore {
    /// Empty pools sized from the config.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            player: Player::new(&config.player),
            mobs: Pool::with_capacity(config.mob_capacity),
            objects: Pool::with_capacity(config.object_capacity),
        }
    }

    /// Adds a mob. `None` when the pool is full.
    pub fn spawn_mob(&mut self, mob: Mob) -> Option<Handle> {
        let kind = mob.kind;
        let handle = self.mobs.insert(mob);
        if handle.is_none() {
            tracing::warn!(kind = %kind, "mob pool full, spawn skipped");
        }
        handle
    }

    /// Adds an object. `None` when the pool is full.
    pub fn spawn_object(&mut self, object: InteractiveObject) -> Option<Handle> {
        let handle = self.objects.insert(object);
        if handle.is_none() {
            tracing::warn!("object pool full, spawn skipped");
        }
        handle
    }

    /// Live mobs of `kind`.
    #[must_use]
    pub fn count_mobs(&self, kind: MobKind) -> usize {
        self.mobs.iter().filter(|(_, mob)| mob.kind == kind).count()
    }

    /// Handles of every portal.
    #[must_use]
    pub fn portals(&self) -> Vec<Handle> {
        self.objects
            .iter()
            .filter(|(_, object)| object.portal_target().is_some())
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Removes every mob and object. The player stays.
    pub fn clear_world_entities(&mut self) {
        self.mobs.clear();
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_until_full() {
        let config = EngineConfig {
            mob_capacity: 2,
            ..EngineConfig::default()
        };
        let mut store = EntityStore::new(&config);

        assert!(store.spawn_mob(Mob::new(MobKind::Zombie, [0.0; 3], 1)).is_some());
        assert!(store.spawn_mob(Mob::new(MobKind::Golem, [0.0; 3], 2)).is_some());
        assert!(store.spawn_mob(Mob::new(MobKind::Golem, [0.0; 3], 3)).is_none());

        assert_eq!(store.count_mobs(MobKind::Golem), 1);
        assert_eq!(store.count_mobs(MobKind::Zombie), 1);
    }

    #[test]
    fn test_portals_and_clear() {
        let mut store = EntityStore::new(&EngineConfig::default());
        store.spawn_object(InteractiveObject::portal("rock", [1.0, 2.0, 3.0]));
        store.spawn_object(InteractiveObject::new(ObjectKind::Chest, [0.0; 3]));
        assert_eq!(store.portals().len(), 1);

        store.clear_world_entities();
        assert!(store.mobs.is_empty());
        assert!(store.objects.is_empty());
    }
}
