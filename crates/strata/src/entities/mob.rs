//! # Mobs and the AI Step
//!
//! Simple state machine per mob:
//!
//! ```text
//!            player within detection range
//!   ┌──────┐ ─────────────────────────────> ┌───────┐
//!   │ Idle │                                │ Chase │
//!   └──────┘ <───────────────────────────── └───────┘
//!     │  ^          player lost
//!     │  │ target reached / stuck
//!     v  │
//!   ┌────────┐
//!   │ Wander │
//!   └────────┘
//! ```
//!
//! [`step_mobs`] is the `ai-step` task body. It is a pure function of its
//! input (the navigation snapshot is a copy), so it runs the same on a
//! worker thread and inline. Each mob carries its own LCG seed, so the same
//! input always produces the same output.

use std::fmt;
use std::str::FromStr;

use strata_worldgen::ChunkKey;
use thiserror::Error;

use crate::navmesh::NavSnapshot;

/// Seconds a mob idles at least.
pub const IDLE_MIN: f32 = 2.0;

/// Seconds a mob idles at most.
pub const IDLE_MAX: f32 = 5.0;

/// Wander targets are picked within this many columns of home.
pub const WANDER_RADIUS: i32 = 5;

/// Fall speed in blocks per second at gravity 1.0.
pub const FALL_SPEED: f32 = 9.8;

/// Mob species.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MobKind {
    /// Slow-witted walker.
    Zombie,
    /// Heavy stone guardian.
    Golem,
    /// Fast climber.
    Spider,
}

impl MobKind {
    /// Stable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Zombie => "zombie",
            Self::Golem => "golem",
            Self::Spider => "spider",
        }
    }

    /// Movement speed in columns per second.
    #[must_use]
    pub const fn speed(self) -> f32 {
        match self {
            Self::Zombie => 2.0,
            Self::Golem => 1.0,
            Self::Spider => 3.0,
        }
    }

    /// Distance at which the mob notices the player.
    #[must_use]
    pub const fn detection_range(self) -> f32 {
        match self {
            Self::Zombie => 10.0,
            Self::Golem => 6.0,
            Self::Spider => 12.0,
        }
    }
}

impl fmt::Display for MobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown mob kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mob kind {0:?}")]
pub struct UnknownMobKind(pub String);

impl FromStr for MobKind {
    type Err = UnknownMobKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zombie" => Ok(Self::Zombie),
            "golem" => Ok(Self::Golem),
            "spider" => Ok(Self::Spider),
            _ => Err(UnknownMobKind(s.to_string())),
        }
    }
}

/// AI state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MobState {
    /// Standing still.
    Idle {
        /// Seconds left.
        remaining: f32,
    },
    /// Walking to a column.
    Wander {
        /// Target column.
        target: (i32, i32),
    },
    /// Walking to the player.
    Chase,
}

impl Default for MobState {
    fn default() -> Self {
        Self::Idle { remaining: IDLE_MIN }
    }
}

/// A mob living in the mob pool.
#[derive(Clone, Debug, PartialEq)]
pub struct Mob {
    /// Species.
    pub kind: MobKind,
    /// Feet position `[x, y, z]`.
    pub position: [f32; 3],
    /// Chunk the mob stands in. Lookup only.
    pub chunk_key: Option<ChunkKey>,
    /// AI state.
    pub state: MobState,
    /// Spawn column, center of wandering.
    pub home: (i32, i32),
    /// LCG state.
    pub seed: u32,
    /// Accumulated movement not yet spent on a whole column.
    pub stride: f32,
}

impl Mob {
    /// Creates an idle mob at `position`.
    #[must_use]
    pub fn new(kind: MobKind, position: [f32; 3], seed: u32) -> Self {
        Self {
            kind,
            position,
            chunk_key: None,
            state: MobState::default(),
            home: cell_of(position),
            seed,
            stride: 0.0,
        }
    }

    /// Grid column under the mob.
    #[must_use]
    pub fn column(&self) -> (i32, i32) {
        cell_of(self.position)
    }

    /// Copies the fields the AI step needs.
    #[must_use]
    pub fn step_input(&self, handle: u64) -> MobStepInput {
        MobStepInput {
            handle,
            kind: self.kind,
            position: self.position,
            state: self.state,
            home: self.home,
            seed: self.seed,
            stride: self.stride,
        }
    }

    /// Takes over the AI step output.
    pub fn apply_step(&mut self, output: &MobStepOutput) {
        self.position = output.position;
        self.state = output.state;
        self.seed = output.seed;
        self.stride = output.stride;
    }
}

/// One mob inside an `ai-step` payload.
#[derive(Clone, Debug, PartialEq)]
pub struct MobStepInput {
    /// Packed pool handle.
    pub handle: u64,
    /// Species.
    pub kind: MobKind,
    /// Position.
    pub position: [f32; 3],
    /// State.
    pub state: MobState,
    /// Home column.
    pub home: (i32, i32),
    /// LCG state.
    pub seed: u32,
    /// Carried movement.
    pub stride: f32,
}

/// One mob inside an `ai-step` result.
#[derive(Clone, Debug, PartialEq)]
pub struct MobStepOutput {
    /// Packed pool handle.
    pub handle: u64,
    /// New position.
    pub position: [f32; 3],
    /// New state.
    pub state: MobState,
    /// New LCG state.
    pub seed: u32,
    /// New carried movement.
    pub stride: f32,
}

/// `ai-step` payload.
#[derive(Clone, Debug)]
pub struct AiStepRequest {
    /// Seconds since the previous step.
    pub elapsed: f32,
    /// Player feet position.
    pub player_position: [f32; 3],
    /// Mobs to advance.
    pub mobs: Vec<MobStepInput>,
    /// Walkability around the player.
    pub nav: NavSnapshot,
    /// Gravity multiplier of the dimension.
    pub gravity: f32,
    /// Speed multiplier of the dimension.
    pub speed_multiplier: f32,
    /// Largest climbable step.
    pub step_height: u16,
}

struct Lcg(u32);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        ((self.0 >> 16) & 0x7FFF) as f32 / 32_768.0
    }

    fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }

    fn offset(&mut self, radius: i32) -> i32 {
        let span = (radius * 2 + 1) as f32;
        (self.next_f32() * span) as i32 - radius
    }
}

fn cell_of(position: [f32; 3]) -> (i32, i32) {
    (position[0].floor() as i32, position[2].floor() as i32)
}

fn distance_sq_xz(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dz = a[2] - b[2];
    dx * dx + dz * dz
}

/// Advances every mob in the request.
#[must_use]
pub fn step_mobs(request: &AiStepRequest) -> Vec<MobStepOutput> {
    request.mobs.iter().map(|mob| step_mob(mob, request)).collect()
}

fn step_mob(mob: &MobStepInput, request: &AiStepRequest) -> MobStepOutput {
    let mut rng = Lcg(mob.seed);
    let here = cell_of(mob.position);
    let range = mob.kind.detection_range();
    let sees_player = distance_sq_xz(mob.position, request.player_position) <= range * range;

    let mut state = match mob.state {
        _ if sees_player => MobState::Chase,
        MobState::Chase => MobState::Idle {
            remaining: rng.range(IDLE_MIN, IDLE_MAX),
        },
        MobState::Idle { remaining } => {
            let remaining = remaining - request.elapsed;
            if remaining <= 0.0 {
                MobState::Wander {
                    target: (
                        mob.home.0 + rng.offset(WANDER_RADIUS),
                        mob.home.1 + rng.offset(WANDER_RADIUS),
                    ),
                }
            } else {
                MobState::Idle { remaining }
            }
        }
        MobState::Wander { target } if target == here => MobState::Idle {
            remaining: rng.range(IDLE_MIN, IDLE_MAX),
        },
        wander @ MobState::Wander { .. } => wander,
    };

    let target = match state {
        MobState::Chase => Some(cell_of(request.player_position)),
        MobState::Wander { target } => Some(target),
        MobState::Idle { .. } => None,
    };

    let mut cell = here;
    let mut stride = 0.0;
    if let Some(target) = target {
        stride = mob.stride + mob.kind.speed() * request.speed_multiplier * request.elapsed;
        while stride >= 1.0 && cell != target {
            match request.nav.next_step(cell, target, request.step_height) {
                Some(next) => {
                    cell = next;
                    stride -= 1.0;
                }
                None => {
                    stride = 0.0;
                    if matches!(state, MobState::Wander { .. }) {
                        state = MobState::Idle {
                            remaining: rng.range(IDLE_MIN, IDLE_MAX),
                        };
                    }
                    break;
                }
            }
        }
        if cell == target {
            stride = 0.0;
        }
    }

    let mut position = mob.position;
    if cell != here {
        position[0] = cell.0 as f32 + 0.5;
        position[2] = cell.1 as f32 + 0.5;
    }
    if let Some(ground) = request.nav.height(cell).map(f32::from) {
        position[1] = if position[1] > ground {
            (position[1] - FALL_SPEED * request.gravity * request.elapsed).max(ground)
        } else {
            ground
        };
    }

    MobStepOutput {
        handle: mob.handle,
        position,
        state,
        seed: rng.0,
        stride,
    }
}
