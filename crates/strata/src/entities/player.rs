//! Player state and survival vitals.

use serde::Serialize;
use strata_worldgen::ChunkKey;

use crate::config::PlayerConfig;

/// Health, hunger and breath.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Vitals {
    /// Current health.
    pub health: f32,
    /// Health ceiling.
    pub max_health: f32,
    /// Current hunger (full at max).
    pub hunger: f32,
    /// Hunger ceiling.
    pub max_hunger: f32,
    /// Current breath.
    pub breath: f32,
    /// Breath ceiling.
    pub max_breath: f32,
}

impl Vitals {
    /// Full vitals for the configured maxima.
    #[must_use]
    pub fn full(config: &PlayerConfig) -> Self {
        Self {
            health: config.max_health,
            max_health: config.max_health,
            hunger: config.max_hunger,
            max_hunger: config.max_hunger,
            breath: config.max_breath,
            max_breath: config.max_breath,
        }
    }

    /// Restores every vital to its maximum.
    pub fn reset(&mut self) {
        self.health = self.max_health;
        self.hunger = self.max_hunger;
        self.breath = self.max_breath;
    }

    /// Hunger as 0..=100.
    #[must_use]
    pub fn hunger_percent(&self) -> f32 {
        percent(self.hunger, self.max_hunger)
    }

    /// Breath as 0..=100.
    #[must_use]
    pub fn breath_percent(&self) -> f32 {
        percent(self.breath, self.max_breath)
    }

    /// True when any value is NaN or infinite.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        ![self.health, self.hunger, self.breath].iter().all(|v| v.is_finite())
    }

    /// Advances hunger, starvation and breath by `dt` seconds.
    pub fn decay(&mut self, dt: f32, submerged: bool, config: &PlayerConfig) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        self.hunger = (self.hunger - config.hunger_decay_per_second * dt).max(0.0);
        if self.hunger <= 0.0 {
            self.health -= config.starvation_damage_per_second * dt;
        }

        if submerged {
            self.breath = (self.breath - config.breath_loss_per_second * dt).max(0.0);
            if self.breath <= 0.0 {
                self.health -= config.drowning_damage_per_second * dt;
            }
        } else {
            self.breath = (self.breath + config.breath_recovery_per_second * dt).min(self.max_breath);
        }
        self.health = self.health.clamp(0.0, self.max_health);
    }
}

fn percent(value: f32, max: f32) -> f32 {
    if max > 0.0 {
        (value / max * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// The single player.
#[derive(Clone, Debug, PartialEq)]
pub struct Player {
    /// Feet position `[x, y, z]`.
    pub position: [f32; 3],
    /// Chunk the player stands in. Lookup only.
    pub chunk_key: Option<ChunkKey>,
    /// Survival vitals.
    pub vitals: Vitals,
    /// Points collected through portals.
    pub points: u64,
}

impl Player {
    /// New player at the origin with full vitals.
    #[must_use]
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            chunk_key: None,
            vitals: Vitals::full(config),
            points: 0,
        }
    }

    /// Grid column under the player.
    #[must_use]
    pub fn column(&self) -> (i32, i32) {
        (self.position[0].floor() as i32, self.position[2].floor() as i32)
    }
}
