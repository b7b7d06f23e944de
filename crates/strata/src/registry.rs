//! # Dimension Registry
//!
//! Explicit registry of dimension profiles. Each id owns a
//! [`VersionedSlot`], so hot-swapping a profile is a single pointer
//! replacement followed by subscriber notification. A reader that already
//! took an `Arc` keeps a complete profile no matter what is registered
//! afterwards.
//!
//! Registration order is the portal progression order used by
//! `advance_dimension`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_core::{SubscriptionId, VersionedSlot};
use strata_worldgen::{builtin_profiles, DimensionProfile, ProfileError};

/// Registry of dimension profiles keyed by id.
#[derive(Default)]
pub struct DimensionRegistry {
    slots: RwLock<HashMap<String, Arc<VersionedSlot<DimensionProfile>>>>,
    order: RwLock<Vec<String>>,
}

impl DimensionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with `origin`, `rock` and `ember`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for profile in builtin_profiles() {
            registry.insert_validated(profile);
        }
        registry
    }

    /// Validates and installs `profile`, replacing any profile with the same
    /// id. Returns the slot's new version (1 for a new id).
    ///
    /// # Errors
    ///
    /// The validation error; nothing is changed in that case.
    pub fn register(&self, profile: DimensionProfile) -> Result<u64, ProfileError> {
        profile.validate()?;
        Ok(self.insert_validated(profile))
    }

    fn insert_validated(&self, profile: DimensionProfile) -> u64 {
        let id = profile.id.clone();
        let existing = self.slots.read().get(&id).cloned();
        if let Some(slot) = existing {
            let version = slot.replace(profile);
            tracing::info!(dimension = %id, version, "dimension profile replaced");
            return version;
        }

        let mut slots = self.slots.write();
        // Lost a race with another registration of the same id.
        if let Some(slot) = slots.get(&id).cloned() {
            drop(slots);
            return slot.replace(profile);
        }
        slots.insert(id.clone(), Arc::new(VersionedSlot::new(profile)));
        drop(slots);
        self.order.write().push(id.clone());
        tracing::info!(dimension = %id, "dimension profile registered");
        1
    }

    /// Parses a `[[dimension]]` TOML document and registers every profile.
    ///
    /// The whole document is validated before anything is registered.
    ///
    /// # Errors
    ///
    /// Parse or validation errors.
    pub fn load_toml(&self, source: &str) -> Result<usize, ProfileError> {
        let profiles = DimensionProfile::parse_toml(source)?;
        let count = profiles.len();
        for profile in profiles {
            self.insert_validated(profile);
        }
        Ok(count)
    }

    /// Current profile for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<DimensionProfile>> {
        self.slots.read().get(id).map(|slot| slot.load())
    }

    /// Current version for `id`.
    #[must_use]
    pub fn version(&self, id: &str) -> Option<u64> {
        self.slots.read().get(id).map(|slot| slot.version())
    }

    /// True if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.slots.read().contains_key(id)
    }

    /// Calls `listener` after every replacement of `id`.
    pub fn subscribe<F>(&self, id: &str, listener: F) -> Option<SubscriptionId>
    where
        F: Fn(u64, &Arc<DimensionProfile>) + Send + Sync + 'static,
    {
        self.slots.read().get(id).map(|slot| slot.subscribe(listener))
    }

    /// Removes a listener registered with [`DimensionRegistry::subscribe`].
    pub fn unsubscribe(&self, id: &str, subscription: SubscriptionId) -> bool {
        self.slots
            .read()
            .get(id)
            .is_some_and(|slot| slot.unsubscribe(subscription))
    }

    /// Ids in registration order.
    #[must_use]
    pub fn ordered_ids(&self) -> Vec<String> {
        self.order.read().clone()
    }

    /// Id registered after `id`, wrapping to the first. `None` when `id` is
    /// the only dimension or unknown and the registry is empty.
    #[must_use]
    pub fn next_after(&self, id: &str) -> Option<String> {
        let order = self.order.read();
        if order.is_empty() {
            return None;
        }
        let next = match order.iter().position(|candidate| candidate == id) {
            Some(i) => &order[(i + 1) % order.len()],
            None => &order[0],
        };
        (next != id).then(|| next.clone())
    }

    /// Number of registered dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
