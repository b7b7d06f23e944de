//! # Engine Event Bus
//!
//! Observable notifications from the simulation to hosts (UI, renderer,
//! tooling).
//!
//! ```text
//! ┌──────────────┐  try_send   ┌──────────────┐  drain   ┌──────────────┐
//! │  main loop   │────────────>│   bounded    │────────> │     host     │
//! │ (only writer)│             │   channel    │          │  (UI, tools) │
//! └──────────────┘             └──────────────┘          └──────────────┘
//! ```
//!
//! Sending never blocks the frame. When the channel is full the event is
//! dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use strata_worldgen::ChunkKey;

use crate::diagnostics::Diagnostic;
use crate::hud::HudState;
use crate::transition::TransitionState;

/// Notifications emitted by the engine.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    // =========================================================================
    // World
    // =========================================================================
    /// Chunk meshes were rebuilt this frame.
    ChunksRebuilt {
        /// Rebuilt chunks.
        keys: Vec<ChunkKey>,
        /// Dirty chunks still waiting.
        remaining: usize,
    },

    /// A new world was installed by `build_terrain`.
    TerrainBuilt {
        /// Diagnostic label passed by the caller.
        reason: String,
        /// Total voxels.
        voxel_count: u64,
    },

    // =========================================================================
    // Survival
    // =========================================================================
    /// The HUD should redraw.
    HudUpdated(HudState),

    /// A survival snapshot was written to the store.
    SnapshotPublished {
        /// Timestamp written into the snapshot.
        updated_at: u64,
    },

    /// The survival watchdog caught a crash signature.
    WatchdogFired {
        /// Crash stage.
        stage: String,
        /// Crash reason.
        reason: String,
    },

    // =========================================================================
    // Dimensions
    // =========================================================================
    /// A transition entered a new stage.
    TransitionStage {
        /// Departing dimension.
        from: String,
        /// Target dimension.
        to: String,
        /// Stage just entered.
        state: TransitionState,
    },

    /// The live world now belongs to a different dimension.
    DimensionChanged {
        /// Previous dimension.
        from: String,
        /// New dimension.
        to: String,
    },

    // =========================================================================
    // Entities
    // =========================================================================
    /// An entity was removed from its pool by a rebind pass.
    EntityDespawned {
        /// `"mob"` or `"object"`.
        category: &'static str,
        /// Kind name.
        kind: String,
        /// Packed pool handle.
        handle: u64,
    },

    // =========================================================================
    // Failures
    // =========================================================================
    /// A failure was recorded.
    Diagnostic(Diagnostic),
}

/// Event bus: one bounded channel, many producers, many consumers.
pub struct EventBus {
    sender: Sender<EngineEvent>,
    receiver: Receiver<EngineEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    /// Creates a bus holding at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Producer handle.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Consumer handle.
    #[must_use]
    pub fn receiver(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Events dropped because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Creates a bus and returns one handle of each kind.
    #[must_use]
    pub fn create_pair(capacity: usize) -> (EventSender, EventReceiver) {
        let bus = Self::new(capacity);
        (bus.sender(), bus.receiver())
    }
}

/// Handle for sending events.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<EngineEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Sends without blocking. Returns `false` if the event was dropped.
    #[inline]
    pub fn send(&self, event: EngineEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            // Nobody listening is not an error for the simulation.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Events dropped on this bus so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handle for receiving events.
#[derive(Clone)]
pub struct EventReceiver {
    receiver: Receiver<EngineEvent>,
}

impl EventReceiver {
    /// Takes every pending event without blocking.
    #[inline]
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.receiver.try_iter().collect()
    }

    /// Takes one event, if any.
    #[inline]
    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.receiver.try_recv().ok()
    }

    /// Number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_drain() {
        let (sender, receiver) = EventBus::create_pair(4);
        assert!(sender.send(EngineEvent::SnapshotPublished { updated_at: 1 }));
        assert!(sender.send(EngineEvent::SnapshotPublished { updated_at: 2 }));

        assert_eq!(receiver.pending_count(), 2);
        let events = receiver.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(receiver.pending_count(), 0);
    }

    #[test]
    fn test_full_channel_drops_and_counts() {
        let bus = EventBus::new(1);
        let sender = bus.sender();

        assert!(sender.send(EngineEvent::SnapshotPublished { updated_at: 1 }));
        assert!(!sender.send(EngineEvent::SnapshotPublished { updated_at: 2 }));
        assert_eq!(bus.dropped(), 1);
        assert_eq!(sender.dropped(), 1);
    }

    #[test]
    fn test_multiple_consumers_share_queue() {
        let bus = EventBus::new(8);
        let a = bus.receiver();
        let b = bus.receiver();
        bus.sender().send(EngineEvent::DimensionChanged {
            from: "origin".into(),
            to: "rock".into(),
        });

        let total = a.drain().len() + b.drain().len();
        assert_eq!(total, 1);
    }
}
