//! Interactive world objects: portals, chests, beacons.

use std::fmt;

use strata_worldgen::ChunkKey;

/// What an object does when the player touches it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Starts a transition to `target`.
    Portal {
        /// Target dimension id.
        target: String,
    },
    /// Loot container.
    Chest,
    /// Light and landmark.
    Beacon,
}

impl ObjectKind {
    /// Stable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Portal { .. } => "portal",
            Self::Chest => "chest",
            Self::Beacon => "beacon",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Portal { target } => write!(f, "portal->{target}"),
            other => f.write_str(other.name()),
        }
    }
}

/// An object living in the object pool.
#[derive(Clone, Debug, PartialEq)]
pub struct InteractiveObject {
    /// Behaviour.
    pub kind: ObjectKind,
    /// Base position `[x, y, z]`.
    pub position: [f32; 3],
    /// Chunk the object sits in. Lookup only.
    pub chunk_key: Option<ChunkKey>,
    /// Persistent objects are relocated instead of despawned when their
    /// chunk disappears.
    pub persistent: bool,
}

impl InteractiveObject {
    /// A portal leading to `target`. Portals are persistent.
    #[must_use]
    pub fn portal(target: impl Into<String>, position: [f32; 3]) -> Self {
        Self {
            kind: ObjectKind::Portal {
                target: target.into(),
            },
            position,
            chunk_key: None,
            persistent: true,
        }
    }

    /// A non-persistent object of `kind`.
    #[must_use]
    pub fn new(kind: ObjectKind, position: [f32; 3]) -> Self {
        Self {
            kind,
            position,
            chunk_key: None,
            persistent: false,
        }
    }

    /// Grid column under the object.
    #[must_use]
    pub fn column(&self) -> (i32, i32) {
        (self.position[0].floor() as i32, self.position[2].floor() as i32)
    }

    /// Target dimension if this is a portal.
    #[must_use]
    pub fn portal_target(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Portal { target } => Some(target),
            _ => None,
        }
    }
}
