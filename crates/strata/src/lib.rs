//! # STRATA Simulation Core
//!
//! Chunked voxel worlds across several dimensions, simulated on one main
//! loop with worker threads for the heavy lifting.
//!
//! ## Design Principles
//!
//! 1. **One writer**: only the main loop mutates world state; workers get
//!    owned copies and return owned results
//! 2. **Latest wins**: every worker request carries a request id, and only
//!    the newest request per task type is applied
//! 3. **Atomic dimension swaps**: a new dimension is staged off to the side
//!    and committed in one step, entities rebound in the same step
//! 4. **Nothing fatal**: failures become diagnostics and the loop carries on
//!
//! ## Core Components
//!
//! - [`Engine`]: owner of the world and the host-facing control surface
//! - [`WorkerDispatcher`]: request ids, staleness, inline fallback
//! - [`TransitionMachine`]: the portal transition stages
//! - [`NavMesh`]: walkability grids around the player
//! - [`SurvivalWatchdog`]: crash recovery for player vitals
//!
//! ## Example
//!
//! ```rust
//! use strata::{Engine, EngineConfig};
//!
//! let config = EngineConfig {
//!     grid_size: 32,
//!     ..EngineConfig::default()
//! }
//! .inline();
//! let mut engine = Engine::new(config).unwrap();
//! engine.start().unwrap();
//! engine.tick(1.0 / 60.0);
//!
//! engine.advance_dimension(Some(10)).unwrap();
//! assert_eq!(engine.world().profile.id, "rock");
//! assert_eq!(engine.player().points, 10);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod anchoring;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod entities;
pub mod error;
pub mod events;
pub mod hud;
pub mod navmesh;
pub mod registry;
pub mod snapshot;
pub mod transition;
pub mod watchdog;
pub mod worker;
pub mod world;

pub use anchoring::{rebind_all, CategoryReport, RebindReport};
pub use config::{EngineConfig, NavigationConfig, PlayerConfig, WatchdogConfig, WorkerConfig, WorkerMode};
pub use diagnostics::{Diagnostic, DiagnosticRecorder, FailureKind};
pub use engine::{BuildTerrainOptions, DeveloperMetrics, Engine, EngineBuilder, FrameReport, TerrainBundle, WorldView};
pub use entities::{EntityStore, InteractiveObject, Mob, MobKind, ObjectKind, Player, Vitals};
pub use error::{ConfigError, EngineError, EngineResult, SnapshotError, TransitionError, WorkerError};
pub use events::{EngineEvent, EventReceiver, EventSender};
pub use hud::{HudContext, HudState};
pub use navmesh::NavMesh;
pub use registry::DimensionRegistry;
pub use snapshot::{KeyValueStore, MemoryStore, SurvivalSnapshot, SNAPSHOT_KEY};
pub use transition::{DimensionHook, HookRegistry, PortalEvent, TransitionMachine, TransitionState};
pub use watchdog::{CrashDescriptor, SurvivalWatchdog};
pub use worker::{RequestId, TaskType, WorkerBackend, WorkerDispatcher};
pub use world::World;
