//! # Survival Snapshots
//!
//! Player vitals serialized as JSON into a key-value store:
//!
//! ```json
//! {
//!   "player": {
//!     "health": 16.0, "maxHealth": 16.0,
//!     "hunger": 20.0, "maxHunger": 20.0, "hungerPercent": 100.0,
//!     "breath": 10.0, "maxBreath": 10.0, "breathPercent": 100.0
//!   },
//!   "updatedAt": 1700000000000
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::entities::Vitals;
use crate::error::SnapshotError;

/// Store key used by the engine.
pub const SNAPSHOT_KEY: &str = "strata.survival";

/// Player part of a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
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
}

/// Persisted survival state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurvivalSnapshot {
    /// Player vitals.
    pub player: PlayerSnapshot,
    /// Milliseconds since the Unix epoch.
    pub updated_at: u64,
}

impl SurvivalSnapshot {
    /// Snapshot of `vitals`.
    #[must_use]
    pub fn from_vitals(vitals: &Vitals, updated_at: u64) -> Self {
        Self {
            player: PlayerSnapshot {
                health: vitals.health,
                max_health: vitals.max_health,
                hunger: vitals.hunger,
                max_hunger: vitals.max_hunger,
                hunger_percent: vitals.hunger_percent(),
                breath: vitals.breath,
                max_breath: vitals.max_breath,
                breath_percent: vitals.breath_percent(),
            },
            updated_at,
        }
    }

    /// Encodes as JSON.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Json`].
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from JSON.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Json`].
    pub fn from_json(source: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Writes the stored values back into `vitals`, clamped to its maxima.
    pub fn restore_into(&self, vitals: &mut Vitals) {
        let p = &self.player;
        vitals.health = p.health.clamp(0.0, vitals.max_health);
        vitals.hunger = p.hunger.clamp(0.0, vitals.max_hunger);
        vitals.breath = p.breath.clamp(0.0, vitals.max_breath);
    }
}

/// Wall-clock milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Where snapshots are written.
pub trait KeyValueStore: Send {
    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Store`] when the write is refused.
    fn put(&self, key: &str, value: String) -> Result<(), SnapshotError>;

    /// Value under `key`.
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory store. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &str, value: String) -> Result<(), SnapshotError> {
        self.inner.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }
}

/// Writes snapshots of the player's vitals.
pub struct SnapshotPublisher {
    store: Box<dyn KeyValueStore>,
    key: String,
    publishes: u64,
    last_updated_at: u64,
}

impl SnapshotPublisher {
    /// Publisher writing to `key` in `store`.
    #[must_use]
    pub fn new(store: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            publishes: 0,
            last_updated_at: 0,
        }
    }

    /// Writes a snapshot of `vitals`. Timestamps never go backwards.
    ///
    /// # Errors
    ///
    /// Encoding or store errors; the counters are not bumped then.
    pub fn publish(&mut self, vitals: &Vitals, updated_at: u64) -> Result<SurvivalSnapshot, SnapshotError> {
        let updated_at = updated_at.max(self.last_updated_at);
        let snapshot = SurvivalSnapshot::from_vitals(vitals, updated_at);
        self.store.put(&self.key, snapshot.to_json()?)?;
        self.publishes += 1;
        self.last_updated_at = updated_at;
        tracing::debug!(key = %self.key, updated_at, "survival snapshot published");
        Ok(snapshot)
    }

    /// Reads the stored snapshot, if any.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Json`] when the stored value is not a snapshot.
    pub fn load(&self) -> Result<Option<SurvivalSnapshot>, SnapshotError> {
        self.store
            .get(&self.key)
            .map(|json| SurvivalSnapshot::from_json(&json))
            .transpose()
    }

    /// Successful publishes.
    #[must_use]
    pub const fn publishes(&self) -> u64 {
        self.publishes
    }

    /// Timestamp of the last publish.
    #[must_use]
    pub const fn last_updated_at(&self) -> u64 {
        self.last_updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;

    #[test]
    fn test_json_field_names() {
        let mut vitals = Vitals::full(&PlayerConfig::default());
        vitals.hunger = 10.0;
        let json = SurvivalSnapshot::from_vitals(&vitals, 42).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["updatedAt"], 42);
        let player = &value["player"];
        for field in [
            "health",
            "maxHealth",
            "hunger",
            "maxHunger",
            "hungerPercent",
            "breath",
            "maxBreath",
            "breathPercent",
        ] {
            assert!(player.get(field).is_some(), "missing {field}");
        }
        assert_eq!(player["hungerPercent"], 50.0);
    }

    #[test]
    fn test_publish_and_load_through_shared_store() {
        let store = MemoryStore::new();
        let mut publisher = SnapshotPublisher::new(Box::new(store.clone()), SNAPSHOT_KEY);
        let vitals = Vitals::full(&PlayerConfig::default());

        publisher.publish(&vitals, 100).unwrap();
        // Older timestamp is lifted to the previous one.
        let second = publisher.publish(&vitals, 50).unwrap();
        assert_eq!(second.updated_at, 100);
        assert_eq!(publisher.publishes(), 2);

        assert_eq!(store.len(), 1);
        let loaded = publisher.load().unwrap().unwrap();
        assert_eq!(loaded, second);
    }

    #[test]
    fn test_restore_clamps() {
        let config = PlayerConfig::default();
        let mut vitals = Vitals::full(&config);
        let mut snapshot = SurvivalSnapshot::from_vitals(&vitals, 1);
        snapshot.player.health = 500.0;
        snapshot.player.breath = 3.0;

        vitals.breath = 9.0;
        snapshot.restore_into(&mut vitals);
        assert_eq!(vitals.health, config.max_health);
        assert_eq!(vitals.breath, 3.0);
    }

    #[test]
    fn test_garbage_is_a_json_error() {
        let store = MemoryStore::new();
        store.put(SNAPSHOT_KEY, "not json".into()).unwrap();
        let publisher = SnapshotPublisher::new(Box::new(store), SNAPSHOT_KEY);
        assert!(matches!(publisher.load(), Err(SnapshotError::Json(_))));
    }
}
