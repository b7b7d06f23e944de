//! HUD state derived from the player and the live dimension.

use serde::Serialize;

use crate::entities::Vitals;
use crate::events::{EngineEvent, EventSender};

/// Everything the HUD draws.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HudState {
    /// Health.
    pub health: f32,
    /// Health ceiling.
    pub max_health: f32,
    /// Hunger.
    pub hunger: f32,
    /// Hunger ceiling.
    pub max_hunger: f32,
    /// Hunger as 0..=100.
    pub hunger_percent: f32,
    /// Breath.
    pub breath: f32,
    /// Breath ceiling.
    pub max_breath: f32,
    /// Breath as 0..=100.
    pub breath_percent: f32,
    /// Display name of the live dimension.
    pub dimension: String,
    /// Portal points.
    pub points: u64,
    /// Frame the state was taken in.
    pub frame: u64,
    /// Optional status line.
    pub status: Option<String>,
}

impl HudState {
    /// Builds a HUD state.
    #[must_use]
    pub fn new(vitals: &Vitals, dimension: &str, points: u64, frame: u64, status: Option<String>) -> Self {
        Self {
            health: vitals.health,
            max_health: vitals.max_health,
            hunger: vitals.hunger,
            max_hunger: vitals.max_hunger,
            hunger_percent: vitals.hunger_percent(),
            breath: vitals.breath,
            max_breath: vitals.max_breath,
            breath_percent: vitals.breath_percent(),
            dimension: dimension.to_string(),
            points,
            frame,
            status,
        }
    }
}

/// Extra input for `update_hud`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HudContext {
    /// Status line to show; `None` keeps the current one.
    pub status: Option<String>,
}

/// Sends HUD states to the event bus and remembers the last one.
pub struct HudPublisher {
    events: EventSender,
    last: Option<HudState>,
    publishes: u64,
}

impl HudPublisher {
    /// Publisher on `events`.
    #[must_use]
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            last: None,
            publishes: 0,
        }
    }

    /// Publishes `state`.
    pub fn publish(&mut self, state: HudState) {
        self.events.send(EngineEvent::HudUpdated(state.clone()));
        self.last = Some(state);
        self.publishes += 1;
    }

    /// Last published state.
    #[must_use]
    pub fn last(&self) -> Option<&HudState> {
        self.last.as_ref()
    }

    /// Status line of the last publish.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.last.as_ref().and_then(|s| s.status.as_deref())
    }

    /// Number of publishes.
    #[must_use]
    pub const fn publishes(&self) -> u64 {
        self.publishes
    }
}
