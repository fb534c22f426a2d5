//! Structure phase merge: endpoint, model, service and view candidates become
//! entities; guarded handlers and field types are resolved afterwards.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::domain::extraction::{Candidate, ExtractionResult};
use crate::domain::model::{
    component_id, DomainModel, Endpoint, Field, Model, ModelError, Service, View,
};

/// Accumulates state that spans files while a phase's results are merged.
#[derive(Debug, Default)]
pub struct StructureMerge {
    /// Handler name → roles, from functions that carry auth but no route.
    guarded: BTreeMap<String, BTreeSet<String>>,
}

impl StructureMerge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn one file's candidates into entities. Returns how many were added.
    pub fn merge(&mut self, model: &mut DomainModel, result: &ExtractionResult) -> Result<usize, ModelError> {
        let file = result.file.as_str();
        let mut added = 0;

        for candidate in &result.candidates {
            match candidate {
                Candidate::Endpoint(c) => {
                    let id = Endpoint::make_id(file, c.lines.start, c.method, &c.path);
                    if model.endpoint(&id).is_some() {
                        debug!("Skipping duplicate endpoint {}", id);
                        continue;
                    }
                    model.add_endpoint(Endpoint {
                        id,
                        method: c.method,
                        path: c.path.clone(),
                        component: c.component.clone(),
                        handler: c.handler.clone(),
                        authenticated: c.authenticated,
                        roles: c.roles.clone(),
                        parameters: c.parameters.clone(),
                        file: file.to_string(),
                        lines: c.lines,
                        actor_ids: Vec::new(),
                        boundary: None,
                    })?;
                    added += 1;
                }
                Candidate::Model(c) => {
                    let id = component_id(file, &c.name);
                    if model.model(&id).is_some() {
                        continue;
                    }
                    model.add_model(Model {
                        id,
                        name: c.name.clone(),
                        fields: c
                            .fields
                            .iter()
                            .map(|f| Field {
                                name: f.name.clone(),
                                type_name: f.type_name.clone(),
                                annotations: f.annotations.clone(),
                            })
                            .collect(),
                        relations: c.relations.clone(),
                        file: file.to_string(),
                        lines: c.lines,
                    })?;
                    added += 1;
                }
                Candidate::Service(c) => {
                    let id = component_id(file, &c.name);
                    if model.service(&id).is_some() {
                        continue;
                    }
                    model.add_service(Service {
                        id,
                        name: c.name.clone(),
                        stereotype: c.stereotype.clone(),
                        operations: c.operations.clone(),
                        file: file.to_string(),
                        lines: c.lines,
                    })?;
                    added += 1;
                }
                Candidate::View(c) => {
                    let id = component_id(file, &c.name);
                    if model.view(&id).is_some() {
                        continue;
                    }
                    model.add_view(View {
                        id,
                        name: c.name.clone(),
                        file: file.to_string(),
                        lines: c.lines,
                    })?;
                    added += 1;
                }
                Candidate::GuardedHandler(g) => {
                    self.guarded
                        .entry(g.name.clone())
                        .or_default()
                        .extend(g.roles.iter().cloned());
                }
                Candidate::Role(_) | Candidate::ExternalSystem(_) | Candidate::Metrics(_) => {}
            }
        }
        Ok(added)
    }

    /// Cross-file resolution once every file has been merged.
    pub fn finish(self, model: &mut DomainModel) -> Result<(), ModelError> {
        resolve_guarded_handlers(model, &self.guarded)?;
        infer_model_relations(model)
    }
}

/// An unauthenticated endpoint whose handler names a guarded function or
/// class (by last path segment) takes that guard's roles.
fn resolve_guarded_handlers(
    model: &mut DomainModel,
    guarded: &BTreeMap<String, BTreeSet<String>>,
) -> Result<(), ModelError> {
    if guarded.is_empty() {
        return Ok(());
    }
    let updates: Vec<(String, Vec<String>)> = model
        .endpoints()
        .filter(|e| !e.authenticated)
        .filter_map(|e| {
            let handler = e.handler.as_deref()?;
            let last = handler
                .rsplit(|c: char| c == '.' || c == ':')
                .find(|s| !s.is_empty())?;
            guarded
                .get(last)
                .map(|roles| (e.id.clone(), roles.iter().cloned().collect()))
        })
        .collect();

    for (endpoint_id, roles) in updates {
        debug!("Endpoint {} protected through its guarded handler", endpoint_id);
        model.protect_endpoint(&endpoint_id, &roles)?;
    }
    Ok(())
}

/// A field whose type mentions another model's name as a whole word adds a
/// relation to that model.
fn infer_model_relations(model: &mut DomainModel) -> Result<(), ModelError> {
    let names: BTreeSet<String> = model.models().map(|m| m.name.clone()).collect();
    let mut links: Vec<(String, String)> = Vec::new();

    for m in model.models() {
        for field in &m.fields {
            for token in field
                .type_name
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .filter(|t| !t.is_empty())
            {
                if token != m.name && names.contains(token) {
                    links.push((m.id.clone(), token.to_string()));
                }
            }
        }
    }

    for (model_id, target) in links {
        model.add_model_relation(&model_id, &target)?;
    }
    Ok(())
}
