//! Domain Model
//!
//! The aggregate every phase writes into and every renderer reads from.
//! Collections are keyed by entity id in ordered maps, so enumeration order is
//! independent of the order in which parallel workers finished. Cross-entity
//! links are ids, never copies.
//!
//! The `add_*` accessors are public: an editing front end mutating the model
//! between runs goes through the same invariant checks as the pipeline.

use std::collections::btree_map::Values;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::extraction::{FileMetrics, HttpMethod, LineRange, Parameter};
use crate::domain::framework::{Framework, FrameworkScore};
use crate::domain::language::Language;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{kind} `{id}` already exists")]
    Duplicate { kind: &'static str, id: String },
    #[error("{kind} `{id}` does not reference a source file")]
    MissingSourceFile { kind: &'static str, id: String },
    #[error("actor `{0}` has no provenance")]
    EmptyProvenance(String),
    #[error("unknown {kind} `{id}` referenced by `{from}`")]
    UnknownReference {
        kind: &'static str,
        id: String,
        from: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────
// Structural entities
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub method: HttpMethod,
    pub path: String,
    /// Declaring controller/class, or the file stem for free functions.
    pub component: String,
    pub handler: Option<String>,
    pub authenticated: bool,
    pub roles: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub file: String,
    pub lines: LineRange,
    /// Set by the actor phase.
    pub actor_ids: Vec<String>,
    /// Set by the boundary phase.
    pub boundary: Option<String>,
}

impl Endpoint {
    /// Stable id: unique per file, declaration line, method and path, so
    /// stacked route markers on one handler stay distinct.
    pub fn make_id(file: &str, line: usize, method: HttpMethod, path: &str) -> String {
        format!("{}:{}#{} {}", file, line, method, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    pub annotations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub fields: Vec<Field>,
    /// Names of related models.
    pub relations: Vec<String>,
    pub file: String,
    pub lines: LineRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    /// service, repository, controller or component
    pub stereotype: String,
    pub operations: Vec<String>,
    pub file: String,
    pub lines: LineRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    pub name: String,
    pub file: String,
    pub lines: LineRange,
}

/// Id shared by models, services and views: `file::Name`.
pub fn component_id(file: &str, name: &str) -> String {
    format!("{}::{}", file, name)
}

// ─────────────────────────────────────────────────────────────────────────
// Derived entities
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActorKind {
    InternalUser,
    EndUser,
    ExternalSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessLevel {
    Public,
    Authenticated,
    Privileged,
    External,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Authenticated => "authenticated",
            AccessLevel::Privileged => "privileged",
            AccessLevel::External => "external",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProvenanceSource {
    /// An endpoint's auth annotation (endpoint id).
    Endpoint(String),
    /// A role declaration found in security configuration.
    Declaration(String),
    /// An outbound call to a third party.
    OutboundCall(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provenance {
    pub file: String,
    pub line: usize,
    pub source: ProvenanceSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    /// Normalized role string; actors are de-duplicated on it.
    pub identity: String,
    pub kind: ActorKind,
    pub access: AccessLevel,
    pub roles: Vec<String>,
    pub provenance: Vec<Provenance>,
    pub endpoint_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoundaryKind {
    Subsystem,
    Layer,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentRef {
    Endpoint(String),
    Model(String),
    Service(String),
    View(String),
    Actor(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemBoundary {
    pub id: String,
    pub name: String,
    pub kind: BoundaryKind,
    pub members: Vec<ComponentRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseCase {
    pub id: String,
    pub name: String,
    pub primary_actor: Option<String>,
    pub actor_ids: Vec<String>,
    pub endpoint_ids: Vec<String>,
    pub model_ids: Vec<String>,
    pub boundary: Option<String>,
    pub preconditions: Vec<String>,
    pub scenario: Vec<String>,
    pub postconditions: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────
// Quality and project summary
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileQuality {
    pub file: String,
    pub language: Language,
    pub metrics: FileMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FindingKind {
    UnprotectedMutation,
    ModelWithoutFields,
    UncoveredEndpoint,
    LargeFile,
    ExtractionFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub files: Vec<FileQuality>,
    pub totals: FileMetrics,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub root: String,
    pub framework: Framework,
    pub confidence: f64,
    pub scores: Vec<FrameworkScore>,
    pub inventory_files: usize,
    pub source_files: usize,
    pub analyzed_files: usize,
    pub failed_files: usize,
    pub languages: BTreeMap<Language, usize>,
    /// False when the run ended before every enabled phase committed.
    pub complete: bool,
}

/// Entity counts, as exposed to progress consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub endpoints: usize,
    pub models: usize,
    pub services: usize,
    pub views: usize,
    pub actors: usize,
    pub boundaries: usize,
    pub use_cases: usize,
}

impl EntityCounts {
    pub fn total(&self) -> usize {
        self.endpoints
            + self.models
            + self.services
            + self.views
            + self.actors
            + self.boundaries
            + self.use_cases
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainModel {
    project: ProjectInfo,
    endpoints: BTreeMap<String, Endpoint>,
    models: BTreeMap<String, Model>,
    services: BTreeMap<String, Service>,
    views: BTreeMap<String, View>,
    actors: BTreeMap<String, Actor>,
    boundaries: BTreeMap<String, SystemBoundary>,
    use_cases: BTreeMap<String, UseCase>,
    quality: QualityReport,
}

impl DomainModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    pub fn endpoints(&self) -> Values<'_, String, Endpoint> {
        self.endpoints.values()
    }

    pub fn models(&self) -> Values<'_, String, Model> {
        self.models.values()
    }

    pub fn services(&self) -> Values<'_, String, Service> {
        self.services.values()
    }

    pub fn views(&self) -> Values<'_, String, View> {
        self.views.values()
    }

    pub fn actors(&self) -> Values<'_, String, Actor> {
        self.actors.values()
    }

    pub fn boundaries(&self) -> Values<'_, String, SystemBoundary> {
        self.boundaries.values()
    }

    pub fn use_cases(&self) -> Values<'_, String, UseCase> {
        self.use_cases.values()
    }

    pub fn quality(&self) -> &QualityReport {
        &self.quality
    }

    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub fn model(&self, id: &str) -> Option<&Model> {
        self.models.get(id)
    }

    pub fn service(&self, id: &str) -> Option<&Service> {
        self.services.get(id)
    }

    pub fn view(&self, id: &str) -> Option<&View> {
        self.views.get(id)
    }

    pub fn boundary(&self, id: &str) -> Option<&SystemBoundary> {
        self.boundaries.get(id)
    }

    pub fn actor(&self, id: &str) -> Option<&Actor> {
        self.actors.get(id)
    }

    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            endpoints: self.endpoints.len(),
            models: self.models.len(),
            services: self.services.len(),
            views: self.views.len(),
            actors: self.actors.len(),
            boundaries: self.boundaries.len(),
            use_cases: self.use_cases.len(),
        }
    }

    /// Every endpoint, model, service and view that came from `file`.
    pub fn entities_from_file(&self, file: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .endpoints
            .values()
            .filter(|e| e.file == file)
            .map(|e| e.id.clone())
            .chain(self.models.values().filter(|m| m.file == file).map(|m| m.id.clone()))
            .chain(self.services.values().filter(|s| s.file == file).map(|s| s.id.clone()))
            .chain(self.views.values().filter(|v| v.file == file).map(|v| v.id.clone()))
            .collect();
        ids.sort();
        ids
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutators
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_project(&mut self, project: ProjectInfo) {
        self.project = project;
    }

    pub fn project_mut(&mut self) -> &mut ProjectInfo {
        &mut self.project
    }

    pub fn set_quality(&mut self, quality: QualityReport) {
        self.quality = quality;
    }

    pub fn add_endpoint(&mut self, endpoint: Endpoint) -> Result<(), ModelError> {
        require_file("endpoint", &endpoint.id, &endpoint.file)?;
        insert_unique(&mut self.endpoints, "endpoint", endpoint.id.clone(), endpoint)
    }

    pub fn add_model(&mut self, model: Model) -> Result<(), ModelError> {
        require_file("model", &model.id, &model.file)?;
        insert_unique(&mut self.models, "model", model.id.clone(), model)
    }

    pub fn add_service(&mut self, service: Service) -> Result<(), ModelError> {
        require_file("service", &service.id, &service.file)?;
        insert_unique(&mut self.services, "service", service.id.clone(), service)
    }

    pub fn add_view(&mut self, view: View) -> Result<(), ModelError> {
        require_file("view", &view.id, &view.file)?;
        insert_unique(&mut self.views, "view", view.id.clone(), view)
    }

    pub fn add_actor(&mut self, actor: Actor) -> Result<(), ModelError> {
        if actor.provenance.is_empty() {
            return Err(ModelError::EmptyProvenance(actor.id));
        }
        for endpoint_id in &actor.endpoint_ids {
            self.require_endpoint(endpoint_id, &actor.id)?;
        }
        insert_unique(&mut self.actors, "actor", actor.id.clone(), actor)
    }

    pub fn add_boundary(&mut self, boundary: SystemBoundary) -> Result<(), ModelError> {
        for member in &boundary.members {
            self.require_member(member, &boundary.id)?;
        }
        insert_unique(&mut self.boundaries, "boundary", boundary.id.clone(), boundary)
    }

    /// Use cases are derived: every actor, endpoint and model they mention
    /// must already be in the model.
    pub fn add_use_case(&mut self, use_case: UseCase) -> Result<(), ModelError> {
        for actor_id in use_case.primary_actor.iter().chain(use_case.actor_ids.iter()) {
            if !self.actors.contains_key(actor_id) {
                return Err(unknown("actor", actor_id, &use_case.id));
            }
        }
        for endpoint_id in &use_case.endpoint_ids {
            self.require_endpoint(endpoint_id, &use_case.id)?;
        }
        for model_id in &use_case.model_ids {
            if !self.models.contains_key(model_id) {
                return Err(unknown("model", model_id, &use_case.id));
            }
        }
        if let Some(boundary) = &use_case.boundary {
            if !self.boundaries.contains_key(boundary) {
                return Err(unknown("boundary", boundary, &use_case.id));
            }
        }
        insert_unique(&mut self.use_cases, "use case", use_case.id.clone(), use_case)
    }

    /// Mark an endpoint as protected (roles are merged).
    pub fn protect_endpoint(&mut self, endpoint_id: &str, roles: &[String]) -> Result<(), ModelError> {
        let endpoint = self
            .endpoints
            .get_mut(endpoint_id)
            .ok_or_else(|| unknown("endpoint", endpoint_id, "auth annotation"))?;
        endpoint.authenticated = true;
        let merged: BTreeSet<String> = endpoint.roles.drain(..).chain(roles.iter().cloned()).collect();
        endpoint.roles = merged.into_iter().collect();
        Ok(())
    }

    pub fn add_model_relation(&mut self, model_id: &str, target: &str) -> Result<(), ModelError> {
        let model = self
            .models
            .get_mut(model_id)
            .ok_or_else(|| unknown("model", model_id, "relation"))?;
        if !model.relations.iter().any(|r| r == target) {
            model.relations.push(target.to_string());
            model.relations.sort();
        }
        Ok(())
    }

    pub fn link_endpoint_actor(&mut self, endpoint_id: &str, actor_id: &str) -> Result<(), ModelError> {
        if !self.actors.contains_key(actor_id) {
            return Err(unknown("actor", actor_id, endpoint_id));
        }
        let endpoint = self
            .endpoints
            .get_mut(endpoint_id)
            .ok_or_else(|| unknown("endpoint", endpoint_id, actor_id))?;
        if !endpoint.actor_ids.iter().any(|a| a == actor_id) {
            endpoint.actor_ids.push(actor_id.to_string());
            endpoint.actor_ids.sort();
        }
        Ok(())
    }

    pub fn set_endpoint_boundary(&mut self, endpoint_id: &str, boundary_id: &str) -> Result<(), ModelError> {
        if !self.boundaries.contains_key(boundary_id) {
            return Err(unknown("boundary", boundary_id, endpoint_id));
        }
        let endpoint = self
            .endpoints
            .get_mut(endpoint_id)
            .ok_or_else(|| unknown("endpoint", endpoint_id, boundary_id))?;
        endpoint.boundary = Some(boundary_id.to_string());
        Ok(())
    }

    fn require_endpoint(&self, endpoint_id: &str, from: &str) -> Result<(), ModelError> {
        if self.endpoints.contains_key(endpoint_id) {
            Ok(())
        } else {
            Err(unknown("endpoint", endpoint_id, from))
        }
    }

    fn require_member(&self, member: &ComponentRef, from: &str) -> Result<(), ModelError> {
        let (kind, present, id) = match member {
            ComponentRef::Endpoint(id) => ("endpoint", self.endpoints.contains_key(id), id),
            ComponentRef::Model(id) => ("model", self.models.contains_key(id), id),
            ComponentRef::Service(id) => ("service", self.services.contains_key(id), id),
            ComponentRef::View(id) => ("view", self.views.contains_key(id), id),
            ComponentRef::Actor(id) => ("actor", self.actors.contains_key(id), id),
        };
        if present {
            Ok(())
        } else {
            Err(unknown(kind, id, from))
        }
    }
}

fn require_file(kind: &'static str, id: &str, file: &str) -> Result<(), ModelError> {
    if file.is_empty() {
        Err(ModelError::MissingSourceFile {
            kind,
            id: id.to_string(),
        })
    } else {
        Ok(())
    }
}

fn insert_unique<T>(
    map: &mut BTreeMap<String, T>,
    kind: &'static str,
    id: String,
    value: T,
) -> Result<(), ModelError> {
    if map.contains_key(&id) {
        return Err(ModelError::Duplicate { kind, id });
    }
    map.insert(id, value);
    Ok(())
}

fn unknown(kind: &'static str, id: &str, from: &str) -> ModelError {
    ModelError::UnknownReference {
        kind,
        id: id.to_string(),
        from: from.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(id: &str) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            method: HttpMethod::Get,
            path: "/orders".to_string(),
            component: "orders".to_string(),
            handler: None,
            authenticated: false,
            roles: vec![],
            parameters: vec![],
            file: "orders.py".to_string(),
            lines: LineRange::line(3),
            actor_ids: vec![],
            boundary: None,
        }
    }

    fn actor(id: &str) -> Actor {
        Actor {
            id: id.to_string(),
            name: "Visitor".to_string(),
            identity: "visitor".to_string(),
            kind: ActorKind::EndUser,
            access: AccessLevel::Public,
            roles: vec![],
            provenance: vec![Provenance {
                file: "orders.py".to_string(),
                line: 3,
                source: ProvenanceSource::Endpoint("e1".to_string()),
            }],
            endpoint_ids: vec!["e1".to_string()],
        }
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let mut model = DomainModel::new();
        model.add_endpoint(endpoint("e1")).unwrap();
        assert!(matches!(
            model.add_endpoint(endpoint("e1")),
            Err(ModelError::Duplicate { .. })
        ));
        assert_eq!(model.counts().endpoints, 1);
    }

    #[test]
    fn test_actor_requires_provenance() {
        let mut model = DomainModel::new();
        model.add_endpoint(endpoint("e1")).unwrap();
        let mut a = actor("actor:visitor");
        a.provenance.clear();
        assert!(matches!(model.add_actor(a), Err(ModelError::EmptyProvenance(_))));
    }

    #[test]
    fn test_use_case_rejects_forward_references() {
        let mut model = DomainModel::new();
        model.add_endpoint(endpoint("e1")).unwrap();
        let use_case = UseCase {
            id: "UC-001".to_string(),
            name: "View Orders".to_string(),
            primary_actor: Some("actor:visitor".to_string()),
            actor_ids: vec!["actor:visitor".to_string()],
            endpoint_ids: vec!["e1".to_string()],
            model_ids: vec![],
            boundary: None,
            preconditions: vec![],
            scenario: vec![],
            postconditions: vec![],
        };
        assert!(model.add_use_case(use_case.clone()).is_err());

        model.add_actor(actor("actor:visitor")).unwrap();
        assert!(model.add_use_case(use_case).is_ok());
    }

    #[test]
    fn test_protect_endpoint_merges_roles() {
        let mut model = DomainModel::new();
        model.add_endpoint(endpoint("e1")).unwrap();
        model.protect_endpoint("e1", &["staff".to_string()]).unwrap();
        model.protect_endpoint("e1", &["admin".to_string(), "staff".to_string()]).unwrap();
        let e = model.endpoint("e1").unwrap();
        assert!(e.authenticated);
        assert_eq!(e.roles, vec!["admin".to_string(), "staff".to_string()]);
    }
}
