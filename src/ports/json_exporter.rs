//! JSON Report Exporter
//!
//! Serializes a finished run (model, per-file errors, phase reports) as JSON,
//! or only its [`RunSummaryDto`] when the full model is not wanted.

use std::io::{Error, ErrorKind, Result};

use serde::Serialize;

use crate::api::RunSummaryDto;
use crate::application::orchestrator::RunReport;
use crate::ports::ReportExporter;

pub struct JsonExporter {
    pub pretty: bool,
    /// Emit counts and phase statistics instead of the whole report.
    pub summary: bool,
}

impl JsonExporter {
    pub fn to_json(&self, report: &RunReport) -> Result<String> {
        if self.summary {
            self.encode(&RunSummaryDto::from(report))
        } else {
            self.encode(report)
        }
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        json.map_err(|e| Error::new(ErrorKind::InvalidData, e))
    }
}

impl ReportExporter for JsonExporter {
    fn export(&self, report: &RunReport, path: &str) -> Result<()> {
        let content = self.to_json(report)?;
        std::fs::write(path, content)
    }
}
