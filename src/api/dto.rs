use serde::{Deserialize, Serialize};

use crate::application::{PhaseStatus, RunReport, RunState};
use crate::domain::model::DomainModel;

/// Per-collection counts of a model, for front ends that only need totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub framework: String,
    pub confidence: f64,
    pub source_files: usize,
    pub analyzed_files: usize,
    pub failed_files: usize,
    pub complete: bool,
    pub endpoints: usize,
    pub models: usize,
    pub services: usize,
    pub views: usize,
    pub actors: usize,
    pub boundaries: usize,
    pub use_cases: usize,
    pub findings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummaryDto {
    pub phase: String,
    pub status: PhaseStatus,
    pub entities_added: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummaryDto {
    pub state: RunState,
    pub failure: Option<String>,
    pub model: ModelSummary,
    pub phases: Vec<PhaseSummaryDto>,
}

impl From<&DomainModel> for ModelSummary {
    fn from(model: &DomainModel) -> Self {
        let project = model.project();
        let counts = model.counts();
        ModelSummary {
            framework: project.framework.name().to_string(),
            confidence: project.confidence,
            source_files: project.source_files,
            analyzed_files: project.analyzed_files,
            failed_files: project.failed_files,
            complete: project.complete,
            endpoints: counts.endpoints,
            models: counts.models,
            services: counts.services,
            views: counts.views,
            actors: counts.actors,
            boundaries: counts.boundaries,
            use_cases: counts.use_cases,
            findings: model.quality().findings.len(),
        }
    }
}

impl From<&RunReport> for RunSummaryDto {
    fn from(report: &RunReport) -> Self {
        let phases = report
            .phases
            .iter()
            .map(|p| PhaseSummaryDto {
                phase: p.phase.name().to_string(),
                status: p.status,
                entities_added: p.entities_added,
                cache_hits: p.stats.cache_hits,
                cache_misses: p.stats.cache_misses,
                failed: p.stats.failed,
                duration_ms: p.duration_ms,
            })
            .collect();

        RunSummaryDto {
            state: report.state,
            failure: report.failure.clone(),
            model: ModelSummary::from(&report.model),
            phases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{Phase, PhaseReport};
    use crate::infrastructure::concurrency::PoolStats;

    #[test]
    fn test_empty_model_summary() {
        let summary = ModelSummary::from(&DomainModel::new());
        assert_eq!(summary.endpoints, 0);
        assert_eq!(summary.findings, 0);
        assert!(!summary.complete);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["use_cases"], 0);
    }

    #[test]
    fn test_run_summary_from_report() {
        let report = RunReport {
            state: RunState::Failed,
            model: DomainModel::new(),
            errors: Vec::new(),
            phases: vec![
                PhaseReport {
                    phase: Phase::Structure,
                    status: PhaseStatus::Completed,
                    stats: PoolStats {
                        dispatched: 3,
                        cache_hits: 2,
                        cache_misses: 1,
                        ..PoolStats::default()
                    },
                    entities_added: 4,
                    duration_ms: 7,
                },
                PhaseReport::skipped(Phase::Actors),
            ],
            detection: None,
            failure: Some("run cancelled".to_string()),
            complete: false,
        };

        let dto = RunSummaryDto::from(&report);
        assert_eq!(dto.state, RunState::Failed);
        assert_eq!(dto.failure.as_deref(), Some("run cancelled"));
        assert_eq!(dto.phases.len(), 2);
        assert_eq!(dto.phases[0].phase, "structure");
        assert_eq!(dto.phases[0].cache_hits, 2);
        assert_eq!(dto.phases[0].cache_misses, 1);
        assert_eq!(dto.phases[0].entities_added, 4);
        assert_eq!(dto.phases[1].status, PhaseStatus::Skipped);
        assert_eq!(dto.model, ModelSummary::from(&report.model));
    }
}
