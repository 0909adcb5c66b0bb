//! Variant lifecycle
//!
//! `Planned → Building → Built | BuildFailed → Running → Ran | RunFailed →
//! Passed | Mismatched`. The tracker holds the live state of every variant
//! in a run and rejects transitions outside the table.

use crate::error::StateMachineError;
use crate::types::VariantId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Lifecycle state of one variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantState {
    /// Created by the planner
    Planned,
    /// Toolchain running
    Building,
    /// Artifact available
    Built,
    /// Build did not produce an artifact
    BuildFailed,
    /// Artifact executing
    Running,
    /// Execution exited successfully
    Ran,
    /// Execution failed or timed out
    RunFailed,
    /// Output matched
    Passed,
    /// Output missing or different
    Mismatched,
}

impl VariantState {
    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: VariantState) -> &'static [VariantState] {
    use VariantState::{
        BuildFailed, Building, Built, Mismatched, Passed, Planned, Ran, RunFailed, Running,
    };
    match from {
        Planned => &[Building],
        Building => &[Built, BuildFailed],
        Built => &[Running],
        Running => &[Ran, RunFailed],
        Ran => &[Passed, Mismatched],
        BuildFailed | RunFailed | Passed | Mismatched => &[],
    }
}

/// Check a single transition against the table
///
/// # Errors
/// `StateMachineError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(
    id: VariantId,
    from: VariantState,
    to: VariantState,
) -> Result<(), StateMachineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalTransition { id, from, to })
    }
}

/// Counts of variants per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Not yet terminal
    pub in_flight: usize,
    /// Passed
    pub passed: usize,
    /// Failed at build, run or collection
    pub failed: usize,
}

/// Live state of every variant in a run
#[derive(Debug, Default)]
pub struct VariantTracker {
    states: DashMap<VariantId, VariantState>,
}

impl VariantTracker {
    /// Create empty tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variant in `Planned`
    pub fn register(&self, id: VariantId) {
        self.states.insert(id, VariantState::Planned);
    }

    /// Move a variant to `to`
    ///
    /// Illegal transitions leave the state untouched and are logged.
    ///
    /// # Errors
    /// `StateMachineError::UnknownVariant` or `StateMachineError::IllegalTransition`
    pub fn advance(&self, id: VariantId, to: VariantState) -> Result<(), StateMachineError> {
        let mut state = self
            .states
            .get_mut(&id)
            .ok_or(StateMachineError::UnknownVariant(id))?;
        if let Err(e) = validate_transition(id, *state, to) {
            tracing::error!(variant_id = %id, from = ?*state, ?to, "illegal variant transition");
            return Err(e);
        }
        tracing::trace!(variant_id = %id, from = ?*state, ?to, "variant transition");
        *state = to;
        Ok(())
    }

    /// Current state of a variant
    #[must_use]
    pub fn state(&self, id: VariantId) -> Option<VariantState> {
        self.states.get(&id).map(|s| *s)
    }

    /// Variants not yet in a terminal state, in id order
    #[must_use]
    pub fn unfinished(&self) -> Vec<VariantId> {
        let mut ids: Vec<VariantId> = self
            .states
            .iter()
            .filter(|entry| !entry.value().is_terminal())
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Per-state counts
    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        self.states
            .iter()
            .fold(TrackerStats::default(), |mut stats, entry| {
                match *entry.value() {
                    VariantState::Passed => stats.passed += 1,
                    VariantState::BuildFailed
                    | VariantState::RunFailed
                    | VariantState::Mismatched => stats.failed += 1,
                    _ => stats.in_flight += 1,
                }
                stats
            })
    }

    /// Number of tracked variants
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing is tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VariantState::*;

    #[test]
    fn happy_path_is_legal() {
        let path = [Planned, Building, Built, Running, Ran, Passed];
        for pair in path.windows(2) {
            assert!(validate_transition(VariantId(0), pair[0], pair[1]).is_ok());
        }
    }

    #[test]
    fn terminal_states() {
        for state in [BuildFailed, RunFailed, Passed, Mismatched] {
            assert!(state.is_terminal());
        }
        for state in [Planned, Building, Built, Running, Ran] {
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn skipping_a_stage_is_illegal() {
        assert_eq!(
            validate_transition(VariantId(1), Planned, Running),
            Err(StateMachineError::IllegalTransition {
                id: VariantId(1),
                from: Planned,
                to: Running
            })
        );
        assert!(validate_transition(VariantId(1), BuildFailed, Running).is_err());
    }

    #[test]
    fn tracker_rejects_illegal_and_keeps_state() {
        let tracker = VariantTracker::new();
        tracker.register(VariantId(0));
        tracker.advance(VariantId(0), Building).unwrap();
        assert!(tracker.advance(VariantId(0), Passed).is_err());
        assert_eq!(tracker.state(VariantId(0)), Some(Building));
    }

    #[test]
    fn tracker_unknown_variant() {
        let tracker = VariantTracker::new();
        assert_eq!(
            tracker.advance(VariantId(9), Building),
            Err(StateMachineError::UnknownVariant(VariantId(9)))
        );
    }

    #[test]
    fn tracker_reports_unfinished_and_stats() {
        let tracker = VariantTracker::new();
        for id in 0..3 {
            tracker.register(VariantId(id));
        }
        tracker.advance(VariantId(1), Building).unwrap();
        tracker.advance(VariantId(1), BuildFailed).unwrap();
        assert_eq!(tracker.unfinished(), vec![VariantId(0), VariantId(2)]);
        assert_eq!(
            tracker.stats(),
            TrackerStats {
                in_flight: 2,
                passed: 0,
                failed: 1
            }
        );
    }
}
