//! Quality report: metric totals plus findings over the merged model.

use std::collections::BTreeSet;

use crate::domain::extraction::FileMetrics;
use crate::domain::model::{DomainModel, FileQuality, Finding, FindingKind, QualityReport};

/// Files with more code lines than this are reported.
pub const LARGE_FILE_LINES: usize = 500;

/// A file that failed extraction in some phase.
#[derive(Debug, Clone)]
pub struct FailedFile<'a> {
    pub file: &'a str,
    pub phase: &'a str,
    pub reason: String,
}

/// Build the report. `check_coverage` is false when use cases were never
/// derived, in which case every endpoint would look uncovered.
pub fn build_report(
    model: &DomainModel,
    mut files: Vec<FileQuality>,
    failures: &[FailedFile<'_>],
    check_coverage: bool,
) -> QualityReport {
    files.sort_by(|a, b| a.file.cmp(&b.file));

    let mut totals = FileMetrics::default();
    for f in &files {
        totals.total_lines += f.metrics.total_lines;
        totals.code_lines += f.metrics.code_lines;
        totals.comment_lines += f.metrics.comment_lines;
        totals.blank_lines += f.metrics.blank_lines;
        totals.todo_markers += f.metrics.todo_markers;
        totals.max_indent_depth = totals.max_indent_depth.max(f.metrics.max_indent_depth);
    }

    let mut findings = Vec::new();

    for e in model.endpoints() {
        if e.method.is_mutating() && !e.authenticated {
            findings.push(Finding {
                kind: FindingKind::UnprotectedMutation,
                subject: e.id.clone(),
                message: format!("{} {} changes state without authentication", e.method, e.path),
            });
        }
    }

    for m in model.models() {
        if m.fields.is_empty() {
            findings.push(Finding {
                kind: FindingKind::ModelWithoutFields,
                subject: m.id.clone(),
                message: format!("model {} declares no fields", m.name),
            });
        }
    }

    if check_coverage {
        let covered: BTreeSet<&str> = model
            .use_cases()
            .flat_map(|u| u.endpoint_ids.iter().map(String::as_str))
            .collect();
        for e in model.endpoints() {
            if !covered.contains(e.id.as_str()) {
                findings.push(Finding {
                    kind: FindingKind::UncoveredEndpoint,
                    subject: e.id.clone(),
                    message: format!("{} {} is not part of any use case", e.method, e.path),
                });
            }
        }
    }

    for f in &files {
        if f.metrics.code_lines > LARGE_FILE_LINES {
            findings.push(Finding {
                kind: FindingKind::LargeFile,
                subject: f.file.clone(),
                message: format!("{} code lines (limit {})", f.metrics.code_lines, LARGE_FILE_LINES),
            });
        }
    }

    for failure in failures {
        findings.push(Finding {
            kind: FindingKind::ExtractionFailure,
            subject: failure.file.to_string(),
            message: format!("{} phase: {}", failure.phase, failure.reason),
        });
    }

    findings.sort();
    findings.dedup();

    QualityReport {
        files,
        totals,
        findings,
    }
}
