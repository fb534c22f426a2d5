// Run configuration, phase sequencing and progress reporting.

pub mod config;
pub mod orchestrator;
pub mod phase;
pub mod progress;

pub use config::{AnalysisConfig, ConfigError, FrameworkChoice, RawConfig};
pub use orchestrator::{AnalysisRun, FileError, PhaseError, RunReport};
pub use phase::{Phase, PhaseReport, PhaseStatus, RunState};
pub use progress::{PhaseProgress, ProgressHandle, ProgressSnapshot};
