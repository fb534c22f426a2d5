use crate::application::orchestrator::RunReport;
use crate::application::phase::Phase;
use crate::domain::model::DomainModel;

pub mod json_exporter;

/// Notified after each phase commits, with the model as it now stands.
pub trait PhaseObserver: Send {
    fn phase_committed(&mut self, phase: Phase, model: &DomainModel);
}

/// Writes a finished run somewhere a renderer can pick it up.
pub trait ReportExporter {
    fn export(&self, report: &RunReport, path: &str) -> std::io::Result<()>;
}
