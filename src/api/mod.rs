// Serializable views of a run for downstream consumers.

pub mod dto;

pub use dto::{ModelSummary, PhaseSummaryDto, RunSummaryDto};
