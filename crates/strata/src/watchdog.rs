//! # Survival Watchdog
//!
//! Catches crash signatures coming out of the simulation and puts the player
//! back on their feet without restarting anything:
//!
//! ```text
//!  CrashDescriptor ──> matches? ──no──> false
//!                         │
//!                        yes
//!                         v
//!   restore vitals ─> publish HUD ─> publish snapshot ─> simulation-crash
//! ```
//!
//! The watchdog owns no engine state. Callers hand it a
//! [`SurvivalContext`] for the duration of one call.

use serde::{Deserialize, Serialize};

use crate::config::WatchdogConfig;
use crate::diagnostics::FailureKind;
use crate::error::SnapshotError;

/// A reported crash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashDescriptor {
    /// Where it happened (`simulation`, `game-logic`, `window.error`, ...).
    pub stage: String,
    /// Short reason tag.
    pub reason: String,
    /// Free-form detail.
    pub message: String,
}

impl CrashDescriptor {
    /// Descriptor without a message.
    #[must_use]
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.into(),
            message: String::new(),
        }
    }

    /// Adds a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// What the watchdog may touch during a trigger.
pub trait SurvivalContext {
    /// Resets health, hunger and breath to their maxima.
    fn restore_vitals(&mut self);

    /// Republishes the HUD.
    fn publish_hud(&mut self);

    /// Republishes the survival snapshot.
    ///
    /// # Errors
    ///
    /// The store error; the watchdog records it and carries on.
    fn publish_snapshot(&mut self) -> Result<(), SnapshotError>;

    /// Records a diagnostic.
    fn record_diagnostic(&mut self, kind: FailureKind, message: String);
}

/// Why a descriptor matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CrashMatch {
    /// Stage name matched.
    Stage(String),
    /// Keyword found in reason or message.
    Keyword(String),
}

/// Stage and keyword matcher plus reset sequence.
#[derive(Clone, Debug)]
pub struct SurvivalWatchdog {
    stages: Vec<String>,
    keywords: Vec<String>,
    fired: u64,
}

impl SurvivalWatchdog {
    /// Watchdog with the configured signatures.
    #[must_use]
    pub fn new(config: &WatchdogConfig) -> Self {
        let normalize = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            stages: normalize(&config.stages),
            keywords: normalize(&config.keywords),
            fired: 0,
        }
    }

    /// Checks `descriptor` against the signatures, case-insensitively.
    #[must_use]
    pub fn matches(&self, descriptor: &CrashDescriptor) -> Option<CrashMatch> {
        let stage = descriptor.stage.trim().to_lowercase();
        if let Some(hit) = self.stages.iter().find(|s| **s == stage) {
            return Some(CrashMatch::Stage(hit.clone()));
        }
        let reason = descriptor.reason.to_lowercase();
        let message = descriptor.message.to_lowercase();
        self.keywords
            .iter()
            .find(|k| reason.contains(k.as_str()) || message.contains(k.as_str()))
            .map(|k| CrashMatch::Keyword(k.clone()))
    }

    /// Runs the reset sequence if `descriptor` matches. Returns whether it
    /// did.
    pub fn trigger(&mut self, context: &mut dyn SurvivalContext, descriptor: &CrashDescriptor) -> bool {
        let Some(hit) = self.matches(descriptor) else {
            tracing::debug!(stage = %descriptor.stage, reason = %descriptor.reason, "crash ignored by watchdog");
            return false;
        };

        context.restore_vitals();
        context.publish_hud();
        if let Err(err) = context.publish_snapshot() {
            context.record_diagnostic(FailureKind::SimulationCrash, format!("snapshot after reset failed: {err}"));
        }
        context.record_diagnostic(
            FailureKind::SimulationCrash,
            format!(
                "stage={} reason={} matched {hit:?}; vitals restored",
                descriptor.stage, descriptor.reason
            ),
        );
        self.fired += 1;
        true
    }

    /// Number of resets so far.
    #[must_use]
    pub const fn fired(&self) -> u64 {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recording {
        calls: Vec<&'static str>,
        diagnostics: Vec<FailureKind>,
        snapshot_fails: bool,
    }

    impl SurvivalContext for Recording {
        fn restore_vitals(&mut self) {
            self.calls.push("restore");
        }

        fn publish_hud(&mut self) {
            self.calls.push("hud");
        }

        fn publish_snapshot(&mut self) -> Result<(), SnapshotError> {
            self.calls.push("snapshot");
            if self.snapshot_fails {
                Err(SnapshotError::Store("offline".into()))
            } else {
                Ok(())
            }
        }

        fn record_diagnostic(&mut self, kind: FailureKind, _message: String) {
            self.diagnostics.push(kind);
        }
    }

    fn watchdog() -> SurvivalWatchdog {
        SurvivalWatchdog::new(&WatchdogConfig::default())
    }

    #[test]
    fn test_stage_match_runs_sequence_in_order() {
        let mut context = Recording::default();
        let mut dog = watchdog();

        assert!(dog.trigger(&mut context, &CrashDescriptor::new("simulation", "physics-crash")));
        assert_eq!(context.calls, vec!["restore", "hud", "snapshot"]);
        assert_eq!(context.diagnostics, vec![FailureKind::SimulationCrash]);
        assert_eq!(dog.fired(), 1);
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let dog = watchdog();
        let descriptor = CrashDescriptor::new("render", "oops").with_message("Detected NaN in velocity");
        assert_eq!(dog.matches(&descriptor), Some(CrashMatch::Keyword("nan".into())));
        assert_eq!(
            dog.matches(&CrashDescriptor::new("Window.Error", "")),
            Some(CrashMatch::Stage("window.error".into()))
        );
    }

    #[test]
    fn test_no_match_touches_nothing() {
        let mut context = Recording::default();
        let mut dog = watchdog();
        assert!(!dog.trigger(&mut context, &CrashDescriptor::new("audio", "buffer underrun")));
        assert!(context.calls.is_empty());
        assert_eq!(dog.fired(), 0);
    }

    #[test]
    fn test_snapshot_failure_is_recorded_not_fatal() {
        let mut context = Recording {
            snapshot_fails: true,
            ..Recording::default()
        };
        let mut dog = watchdog();
        assert!(dog.trigger(&mut context, &CrashDescriptor::new("game-logic", "x")));
        assert_eq!(context.diagnostics.len(), 2);
    }

    #[test]
    fn test_custom_signatures() {
        let config = WatchdogConfig {
            stages: vec![],
            keywords: vec!["Segfault".into()],
        };
        let dog = SurvivalWatchdog::new(&config);
        assert!(dog.matches(&CrashDescriptor::new("simulation", "x")).is_none());
        assert!(dog.matches(&CrashDescriptor::new("any", "SEGFAULT at 0x0")).is_some());
    }
}
