//! # Engine Configuration
//!
//! Everything tunable, loaded from TOML. Every field has a default, so an
//! empty file is a valid config:
//!
//! ```toml
//! seed = 98765
//! grid_size = 64
//! voxel_budget = 200000
//!
//! [worker]
//! mode = "threads"
//! threads = 2
//!
//! [navigation]
//! step_height = 1
//! active_radius = 3
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_worldgen::{VoxelBudget, MAX_COLUMN_HEIGHT};

use crate::error::{ConfigError, ConfigResult};

/// Largest accepted world side length in columns.
pub const MAX_GRID_SIZE: usize = 4096;

/// Largest accepted chunk side length in columns.
pub const MAX_CHUNK_SIZE: usize = 256;

/// Where worker tasks execute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerMode {
    /// Background threads.
    #[default]
    Threads,
    /// On the main thread, results delivered at the next frame boundary.
    Inline,
}

/// Worker offload settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Execution mode.
    pub mode: WorkerMode,
    /// Thread count in `Threads` mode.
    pub threads: usize,
    /// Request queue capacity.
    pub queue_capacity: usize,
    /// Frames a dispatched request may go unanswered before it is re-run
    /// inline.
    pub result_timeout_frames: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: WorkerMode::Threads,
            threads: 2,
            queue_capacity: 64,
            result_timeout_frames: 300,
        }
    }
}

/// Navigation mesh settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Largest height difference a mob can step over.
    pub step_height: u16,
    /// Chunks around an edited chunk whose nav grids are invalidated.
    pub pathing_radius: u32,
    /// Nav grids further than this (in chunks) from the player are evicted.
    pub active_radius: u32,
    /// Nav grid rebuilds per frame.
    pub rebuild_budget: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            step_height: 1,
            pathing_radius: 1,
            active_radius: 3,
            rebuild_budget: 8,
        }
    }
}

/// Player vital maxima and rates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Maximum health.
    pub max_health: f32,
    /// Maximum hunger (full stomach).
    pub max_hunger: f32,
    /// Maximum breath.
    pub max_breath: f32,
    /// Hunger lost per second.
    pub hunger_decay_per_second: f32,
    /// Health lost per second while starving.
    pub starvation_damage_per_second: f32,
    /// Breath lost per second while submerged.
    pub breath_loss_per_second: f32,
    /// Breath regained per second in air.
    pub breath_recovery_per_second: f32,
    /// Health lost per second with no breath left.
    pub drowning_damage_per_second: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_health: 20.0,
            max_hunger: 20.0,
            max_breath: 10.0,
            hunger_decay_per_second: 0.05,
            starvation_damage_per_second: 0.5,
            breath_loss_per_second: 1.0,
            breath_recovery_per_second: 2.0,
            drowning_damage_per_second: 1.0,
        }
    }
}

/// Crash signatures the survival watchdog reacts to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Stage names, matched case-insensitively.
    pub stages: Vec<String>,
    /// Keywords searched in reason and message, case-insensitively.
    pub keywords: Vec<String>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stages: vec!["simulation".into(), "game-logic".into(), "window.error".into()],
            keywords: vec![
                "physics".into(),
                "engine crash".into(),
                "nan".into(),
                "stack overflow".into(),
            ],
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// World seed.
    pub seed: u64,
    /// World side length in columns.
    pub grid_size: usize,
    /// Chunk side length in columns.
    pub chunk_size: usize,
    /// Placement height limit.
    pub max_column_height: u16,
    /// Voxel budget per generated world; absent means unlimited.
    pub voxel_budget: Option<u64>,
    /// Chunk rebuilds per frame.
    pub frame_budget: usize,
    /// Chunks per `mesh-preparation` message.
    pub mesh_batch_size: usize,
    /// Seconds between `ai-step` submissions.
    pub ai_step_interval: f32,
    /// Seconds between periodic snapshot writes.
    pub snapshot_interval: f32,
    /// Dimension the engine starts in.
    pub starting_dimension: String,
    /// Event bus capacity.
    pub event_capacity: usize,
    /// Diagnostics kept in history.
    pub diagnostics_capacity: usize,
    /// Mob pool capacity.
    pub mob_capacity: usize,
    /// Interactive object pool capacity.
    pub object_capacity: usize,
    /// Worker settings.
    pub worker: WorkerConfig,
    /// Navigation settings.
    pub navigation: NavigationConfig,
    /// Player settings.
    pub player: PlayerConfig,
    /// Watchdog settings.
    pub watchdog: WatchdogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 98_765,
            grid_size: 64,
            chunk_size: 16,
            max_column_height: 64,
            voxel_budget: None,
            frame_budget: 4,
            mesh_batch_size: 8,
            ai_step_interval: 0.25,
            snapshot_interval: 5.0,
            starting_dimension: "origin".into(),
            event_capacity: 1024,
            diagnostics_capacity: 256,
            mob_capacity: 256,
            object_capacity: 64,
            worker: WorkerConfig::default(),
            navigation: NavigationConfig::default(),
            player: PlayerConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// I/O, parse or validation errors.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Generation budget as a [`VoxelBudget`].
    #[must_use]
    pub fn voxel_budget(&self) -> VoxelBudget {
        self.voxel_budget.map_or(VoxelBudget::Unlimited, VoxelBudget::Limit)
    }

    /// Same settings with inline workers. Handy for tests and tools.
    #[must_use]
    pub fn inline(mut self) -> Self {
        self.worker.mode = WorkerMode::Inline;
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.grid_size == 0 || self.grid_size > MAX_GRID_SIZE {
            return Err(invalid("grid_size", format!("must be in 1..={MAX_GRID_SIZE}")));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(invalid("chunk_size", format!("must be in 1..={MAX_CHUNK_SIZE}")));
        }
        if self.max_column_height == 0 || self.max_column_height > MAX_COLUMN_HEIGHT {
            return Err(invalid(
                "max_column_height",
                format!("must be in 1..={MAX_COLUMN_HEIGHT}"),
            ));
        }
        if self.frame_budget == 0 {
            return Err(invalid("frame_budget", "must be greater than zero"));
        }
        if self.mesh_batch_size == 0 {
            return Err(invalid("mesh_batch_size", "must be greater than zero"));
        }
        if !(self.ai_step_interval.is_finite() && self.ai_step_interval > 0.0) {
            return Err(invalid("ai_step_interval", "must be a positive number of seconds"));
        }
        if !(self.snapshot_interval.is_finite() && self.snapshot_interval > 0.0) {
            return Err(invalid("snapshot_interval", "must be a positive number of seconds"));
        }
        if self.starting_dimension.trim().is_empty() {
            return Err(invalid("starting_dimension", "must not be empty"));
        }
        if self.event_capacity == 0 || self.diagnostics_capacity == 0 {
            return Err(invalid("event_capacity", "capacities must be greater than zero"));
        }
        if self.mob_capacity == 0 || self.object_capacity == 0 {
            return Err(invalid("mob_capacity", "pool capacities must be greater than zero"));
        }
        if self.worker.mode == WorkerMode::Threads && self.worker.threads == 0 {
            return Err(invalid("worker.threads", "must be at least 1 in threads mode"));
        }
        if self.worker.queue_capacity == 0 {
            return Err(invalid("worker.queue_capacity", "must be greater than zero"));
        }
        if self.worker.result_timeout_frames == 0 {
            return Err(invalid("worker.result_timeout_frames", "must be greater than zero"));
        }

        let p = &self.player;
        for (field, value) in [
            ("player.max_health", p.max_health),
            ("player.max_hunger", p.max_hunger),
            ("player.max_breath", p.max_breath),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, "must be a positive number"));
            }
        }
        for (field, value) in [
            ("player.hunger_decay_per_second", p.hunger_decay_per_second),
            ("player.starvation_damage_per_second", p.starvation_damage_per_second),
            ("player.breath_loss_per_second", p.breath_loss_per_second),
            ("player.breath_recovery_per_second", p.breath_recovery_per_second),
            ("player.drowning_damage_per_second", p.drowning_damage_per_second),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(field, "must be a non-negative number"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.voxel_budget(), VoxelBudget::Unlimited);
    }

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            seed = 7
            voxel_budget = 5000
            starting_dimension = "rock"

            [worker]
            mode = "inline"

            [navigation]
            step_height = 2

            [watchdog]
            keywords = ["segfault"]
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.voxel_budget(), VoxelBudget::Limit(5000));
        assert_eq!(config.worker.mode, WorkerMode::Inline);
        assert_eq!(config.worker.threads, 2);
        assert_eq!(config.navigation.step_height, 2);
        assert_eq!(config.navigation.active_radius, 3);
        assert_eq!(config.watchdog.keywords, vec!["segfault".to_string()]);
        assert_eq!(config.watchdog.stages.len(), 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_toml_str("chunk_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "chunk_size", .. }));

        let err = EngineConfig::from_toml_str("[player]\nmax_health = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "player.max_health", .. }));

        let err = EngineConfig::from_toml_str("grid_size = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_oversized_world_rejected() {
        let err = EngineConfig::from_toml_str("grid_size = 4097").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "grid_size", .. }));

        let err = EngineConfig::from_toml_str("chunk_size = 100000").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "chunk_size", .. }));

        let err = EngineConfig::from_toml_str("[worker]\nresult_timeout_frames = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "worker.result_timeout_frames", .. }));

        let config = EngineConfig::from_toml_str(&format!("grid_size = {MAX_GRID_SIZE}\nchunk_size = {MAX_CHUNK_SIZE}")).unwrap();
        assert_eq!(config.grid_size, MAX_GRID_SIZE);
    }

    #[test]
    fn test_inline_helper() {
        let config = EngineConfig::default().inline();
        assert_eq!(config.worker.mode, WorkerMode::Inline);
        config.validate().unwrap();
    }
}
