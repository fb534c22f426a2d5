//! Progress surface for front ends.
//!
//! A [`ProgressHandle`] is cheap to clone and may be polled from any thread
//! while the run executes; the orchestrator is the only writer.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::application::orchestrator::FileError;
use crate::application::phase::{Phase, PhaseStatus, RunState};
use crate::domain::model::EntityCounts;
use crate::infrastructure::concurrency::PoolStats;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub status: PhaseStatus,
    pub stats: PoolStats,
    /// Model counts right after the phase committed.
    pub counts: EntityCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub state: RunState,
    /// Files reported so far in the running phase.
    pub files_done: usize,
    pub files_total: usize,
    pub phases: BTreeMap<Phase, PhaseProgress>,
    pub errors: Vec<FileError>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            state: RunState::NotStarted,
            files_done: 0,
            files_total: 0,
            phases: BTreeMap::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<RwLock<ProgressSnapshot>>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.read().clone()
    }

    pub fn state(&self) -> RunState {
        self.inner.read().state
    }

    pub fn current_phase(&self) -> Option<Phase> {
        self.inner.read().state.phase()
    }

    pub fn error_count(&self) -> usize {
        self.inner.read().errors.len()
    }

    pub(crate) fn set_state(&self, state: RunState) {
        self.inner.write().state = state;
    }

    pub(crate) fn begin_phase(&self, phase: Phase, files_total: usize) {
        let mut guard = self.inner.write();
        guard.state = RunState::running(phase);
        guard.files_done = 0;
        guard.files_total = files_total;
    }

    pub(crate) fn file_done(&self) {
        self.inner.write().files_done += 1;
    }

    pub(crate) fn push_error(&self, error: FileError) {
        self.inner.write().errors.push(error);
    }

    pub(crate) fn finish_phase(&self, phase: Phase, progress: PhaseProgress) {
        self.inner.write().phases.insert(phase, progress);
    }
}
