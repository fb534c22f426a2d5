//! Per-file extraction output.
//!
//! An [`ExtractionResult`] is what one worker produces for one file: the
//! candidates discovered by the rule set, in line order. Results are also the
//! payload of cache records, so every type here is plain serde data that
//! round-trips through bincode.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    /// Route declared without a method restriction.
    Any,
}

impl HttpMethod {
    pub fn parse(s: &str) -> Option<HttpMethod> {
        match s.trim().trim_matches(|c| c == '\'' || c == '"').to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" | "DEL" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            "ALL" | "ANY" | "ROUTE" | "REQUEST" => Some(HttpMethod::Any),
            _ => None,
        }
    }

    /// Parse a method list such as `['GET', 'POST']` or `GET|POST`.
    pub fn parse_list(s: &str) -> Vec<HttpMethod> {
        let mut methods: Vec<HttpMethod> = s
            .split(|c: char| c == ',' || c == '|' || c.is_whitespace() || c == '[' || c == ']')
            .filter_map(HttpMethod::parse)
            .collect();
        methods.sort();
        methods.dedup();
        methods
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Any => "ANY",
        }
    }

    /// True for methods that change server state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete | HttpMethod::Any
        )
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1-based inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn line(line: usize) -> Self {
        Self { start: line, end: line }
    }

    pub fn span(start: usize, end: usize) -> Self {
        Self { start, end: end.max(start) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParamLocation {
    Path,
    Query,
    Body,
    Header,
}

impl ParamLocation {
    pub fn from_marker(marker: &str) -> ParamLocation {
        let marker = marker.to_lowercase();
        if marker.contains("path") || marker.contains("route") || marker == "param" {
            ParamLocation::Path
        } else if marker.contains("body") {
            ParamLocation::Body
        } else if marker.contains("header") {
            ParamLocation::Header
        } else {
            ParamLocation::Query
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCandidate {
    pub method: HttpMethod,
    pub path: String,
    pub component: String,
    pub handler: Option<String>,
    pub authenticated: bool,
    pub roles: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub lines: LineRange,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldCandidate {
    pub name: String,
    pub type_name: String,
    pub annotations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub name: String,
    pub fields: Vec<FieldCandidate>,
    pub relations: Vec<String>,
    pub lines: LineRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCandidate {
    pub name: String,
    pub stereotype: String,
    pub operations: Vec<String>,
    pub lines: LineRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCandidate {
    pub name: String,
    pub lines: LineRange,
}

/// A function or class that carries an auth marker but no route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardedHandler {
    pub name: String,
    pub roles: Vec<String>,
    pub lines: LineRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCandidate {
    pub role: String,
    pub evidence: String,
    pub lines: LineRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCandidate {
    pub target: String,
    pub evidence: String,
    pub lines: LineRange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub total_lines: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    pub blank_lines: usize,
    pub todo_markers: usize,
    pub max_indent_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Candidate {
    Endpoint(EndpointCandidate),
    Model(ModelCandidate),
    Service(ServiceCandidate),
    View(ViewCandidate),
    GuardedHandler(GuardedHandler),
    Role(RoleCandidate),
    ExternalSystem(ExternalCandidate),
    Metrics(FileMetrics),
}

impl Candidate {
    pub fn first_line(&self) -> usize {
        match self {
            Candidate::Endpoint(c) => c.lines.start,
            Candidate::Model(c) => c.lines.start,
            Candidate::Service(c) => c.lines.start,
            Candidate::View(c) => c.lines.start,
            Candidate::GuardedHandler(c) => c.lines.start,
            Candidate::Role(c) => c.lines.start,
            Candidate::ExternalSystem(c) => c.lines.start,
            Candidate::Metrics(_) => 0,
        }
    }
}

/// Output of applying one rule set to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Relative path of the file the candidates came from.
    pub file: String,
    pub candidates: Vec<Candidate>,
}

impl ExtractionResult {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            candidates: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointCandidate> {
        self.candidates.iter().filter_map(|c| match c {
            Candidate::Endpoint(e) => Some(e),
            _ => None,
        })
    }
}

/// File-level failure. Recorded and skipped; never fails a run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExtractionError {
    #[error("failed to read file: {0}")]
    Io(String),
    #[error("file is not valid UTF-8 (first bad byte at offset {offset})")]
    Encoding { offset: usize },
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("extraction exceeded the {limit_ms} ms soft timeout")]
    Timeout { limit_ms: u64 },
    /// The file could not be read when the inventory was built.
    #[error("file was unreadable at discovery")]
    Unreadable,
}
