//! # Diagnostic Recorder
//!
//! Every recoverable failure in the simulation ends up here instead of
//! propagating past a frame boundary.
//!
//! ```text
//!  worker fallback ─┐
//!  asset missing ───┤
//!  navmesh failure ─┼──> DiagnosticRecorder ──> tracing (warn/debug)
//!  stale result ────┤         │              └─> EngineEvent::Diagnostic
//!  watchdog ────────┘         └─> bounded history + per-kind counters
//! ```

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::events::{EngineEvent, EventSender};

/// Failure taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Voxel budget exceeded, fallback terrain used.
    GenerationFallback,
    /// Worker threads unavailable, task ran inline.
    WorkerUnavailable,
    /// A required asset did not resolve; placeholder used.
    AssetMissing,
    /// A nav grid could not be rebuilt; pathing skipped this tick.
    NavmeshRebuildFailure,
    /// A superseded worker result was discarded.
    StaleWorkerResult,
    /// A crash signature was caught by the watchdog.
    SimulationCrash,
    /// A lifecycle hook failed.
    HookFailure,
    /// Bad configuration or unknown dimension.
    Configuration,
}

impl FailureKind {
    /// Every kind, in counter order.
    pub const ALL: [Self; 8] = [
        Self::GenerationFallback,
        Self::WorkerUnavailable,
        Self::AssetMissing,
        Self::NavmeshRebuildFailure,
        Self::StaleWorkerResult,
        Self::SimulationCrash,
        Self::HookFailure,
        Self::Configuration,
    ];

    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenerationFallback => "generation-fallback",
            Self::WorkerUnavailable => "worker-unavailable",
            Self::AssetMissing => "asset-missing",
            Self::NavmeshRebuildFailure => "navmesh-rebuild-failure",
            Self::StaleWorkerResult => "stale-worker-result",
            Self::SimulationCrash => "simulation-crash",
            Self::HookFailure => "hook-failure",
            Self::Configuration => "configuration",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }

    /// Stale results are routine; everything else is worth a warning.
    const fn is_routine(self) -> bool {
        matches!(self, Self::StaleWorkerResult)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Frame it happened in.
    pub frame: u64,
    /// Failure class.
    pub kind: FailureKind,
    /// Subsystem that reported it.
    pub source: String,
    /// Human-readable detail.
    pub message: String,
}

/// Bounded diagnostic history with per-kind counters.
pub struct DiagnosticRecorder {
    history: VecDeque<Diagnostic>,
    capacity: usize,
    counts: [u64; FailureKind::ALL.len()],
    frame: u64,
    events: Option<EventSender>,
}

impl DiagnosticRecorder {
    /// Creates a recorder keeping the last `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            counts: [0; FailureKind::ALL.len()],
            frame: 0,
            events: None,
        }
    }

    /// Also forwards every entry to the event bus.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Frame number stamped on new entries.
    #[inline]
    pub fn set_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Records a failure.
    pub fn record(&mut self, kind: FailureKind, source: &str, message: impl Into<String>) {
        let message = message.into();
        if kind.is_routine() {
            tracing::debug!(kind = %kind, source, "{message}");
        } else {
            tracing::warn!(kind = %kind, source, "{message}");
        }

        let diagnostic = Diagnostic {
            frame: self.frame,
            kind,
            source: source.to_string(),
            message,
        };
        self.counts[kind.index()] += 1;
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        if let Some(events) = &self.events {
            events.send(EngineEvent::Diagnostic(diagnostic.clone()));
        }
        self.history.push_back(diagnostic);
    }

    /// Total entries ever recorded for `kind`.
    #[inline]
    #[must_use]
    pub fn count(&self, kind: FailureKind) -> u64 {
        self.counts[kind.index()]
    }

    /// `(kind, count)` for every kind with at least one entry.
    #[must_use]
    pub fn counts(&self) -> Vec<(FailureKind, u64)> {
        FailureKind::ALL
            .iter()
            .map(|&kind| (kind, self.count(kind)))
            .filter(|&(_, n)| n > 0)
            .collect()
    }

    /// Retained entries, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &Diagnostic> {
        self.history.iter()
    }

    /// Most recent entry of `kind`.
    #[must_use]
    pub fn last_of(&self, kind: FailureKind) -> Option<&Diagnostic> {
        self.history.iter().rev().find(|d| d.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    #[test]
    fn test_history_is_bounded_counts_are_not() {
        let mut recorder = DiagnosticRecorder::new(2);
        for i in 0..5 {
            recorder.set_frame(i);
            recorder.record(FailureKind::AssetMissing, "transition", format!("asset {i}"));
        }
        assert_eq!(recorder.count(FailureKind::AssetMissing), 5);
        let frames: Vec<_> = recorder.recent().map(|d| d.frame).collect();
        assert_eq!(frames, vec![3, 4]);
    }

    #[test]
    fn test_forwards_to_event_bus() {
        let (sender, receiver) = EventBus::create_pair(8);
        let mut recorder = DiagnosticRecorder::new(8).with_events(sender);

        recorder.record(FailureKind::WorkerUnavailable, "worker", "threads gone");

        match receiver.try_recv() {
            Some(EngineEvent::Diagnostic(d)) => {
                assert_eq!(d.kind, FailureKind::WorkerUnavailable);
                assert_eq!(d.source, "worker");
            }
            other => panic!("expected diagnostic event, got {other:?}"),
        }
    }

    #[test]
    fn test_counts_and_last_of() {
        let mut recorder = DiagnosticRecorder::new(16);
        recorder.record(FailureKind::StaleWorkerResult, "worker", "ai-step #1");
        recorder.record(FailureKind::HookFailure, "transition", "exit hook");
        recorder.record(FailureKind::StaleWorkerResult, "worker", "ai-step #3");

        assert_eq!(
            recorder.counts(),
            vec![(FailureKind::StaleWorkerResult, 2), (FailureKind::HookFailure, 1)]
        );
        assert_eq!(
            recorder.last_of(FailureKind::StaleWorkerResult).unwrap().message,
            "ai-step #3"
        );
        assert!(recorder.last_of(FailureKind::SimulationCrash).is_none());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(FailureKind::NavmeshRebuildFailure.to_string(), "navmesh-rebuild-failure");
        for (i, kind) in FailureKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
