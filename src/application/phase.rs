//! Phases and run states.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::infrastructure::concurrency::PoolStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Structure,
    Actors,
    Boundaries,
    UseCases,
    Quality,
}

impl Phase {
    /// Execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Structure,
        Phase::Actors,
        Phase::Boundaries,
        Phase::UseCases,
        Phase::Quality,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Structure => "structure",
            Phase::Actors => "actors",
            Phase::Boundaries => "boundaries",
            Phase::UseCases => "use-cases",
            Phase::Quality => "quality",
        }
    }

    /// Case-insensitive; `_` and `-` are interchangeable.
    pub fn from_name(s: &str) -> Option<Phase> {
        let key = s.trim().to_lowercase().replace('_', "-");
        Phase::ALL.iter().copied().find(|p| p.name() == key)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Orchestrator state machine. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    NotStarted,
    Structure,
    Actors,
    Boundaries,
    UseCases,
    Quality,
    Done,
    Failed,
}

impl RunState {
    pub fn running(phase: Phase) -> RunState {
        match phase {
            Phase::Structure => RunState::Structure,
            Phase::Actors => RunState::Actors,
            Phase::Boundaries => RunState::Boundaries,
            Phase::UseCases => RunState::UseCases,
            Phase::Quality => RunState::Quality,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            RunState::Structure => Some(Phase::Structure),
            RunState::Actors => Some(Phase::Actors),
            RunState::Boundaries => Some(Phase::Boundaries),
            RunState::UseCases => Some(Phase::UseCases),
            RunState::Quality => Some(Phase::Quality),
            RunState::NotStarted | RunState::Done | RunState::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    Completed,
    /// Disabled by configuration; outputs stay empty.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub stats: PoolStats,
    /// Entities the phase added to the model.
    pub entities_added: usize,
    pub duration_ms: u64,
}

impl PhaseReport {
    pub fn skipped(phase: Phase) -> Self {
        Self {
            phase,
            status: PhaseStatus::Skipped,
            stats: PoolStats::default(),
            entities_added: 0,
            duration_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names_round_trip() {
        for phase in Phase::ALL {
            assert_eq!(Phase::from_name(phase.name()), Some(phase));
        }
        assert_eq!(Phase::from_name("USE_CASES"), Some(Phase::UseCases));
        assert_eq!(Phase::from_name(" Quality "), Some(Phase::Quality));
        assert_eq!(Phase::from_name("rendering"), None);
    }

    #[test]
    fn test_run_state_phase_mapping() {
        for phase in Phase::ALL {
            assert_eq!(RunState::running(phase).phase(), Some(phase));
        }
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Actors.is_terminal());
    }
}
