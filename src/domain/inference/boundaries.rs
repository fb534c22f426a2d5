//! Boundary inference: directory clustering into subsystems, stereotype-based
//! layers, and one boundary around external systems.

use std::collections::BTreeMap;

use crate::domain::model::{
    ActorKind, BoundaryKind, ComponentRef, DomainModel, ModelError, SystemBoundary,
};

use super::title_case;

/// Leading directories that say nothing about the application's structure.
const SOURCE_ROOTS: &[&str] = &["src", "main", "java", "kotlin", "app", "lib", "python"];
const CORE: &str = "core";

pub const PRESENTATION_LAYER: &str = "layer:presentation";
pub const BUSINESS_LAYER: &str = "layer:business";
pub const DATA_LAYER: &str = "layer:data";
pub const EXTERNAL_BOUNDARY: &str = "external:systems";

pub fn subsystem_id(key: &str) -> String {
    format!("subsystem:{}", key)
}

/// Directory segments of a relative file path with source roots stripped.
fn directory_segments(file: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = file.split('/').collect();
    segments.pop();
    let skip = segments
        .iter()
        .take_while(|s| SOURCE_ROOTS.contains(&s.to_lowercase().as_str()))
        .count();
    segments.split_off(skip)
}

/// Maps each component file to its subsystem key.
///
/// The directory prefix shared by every file is dropped; the first remaining
/// segment names the subsystem, and files with nothing left fall into `core`.
pub fn cluster_files<'a>(files: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, String> {
    let dirs: BTreeMap<&str, Vec<&str>> = files
        .into_iter()
        .map(|f| (f, directory_segments(f)))
        .collect();

    let common = dirs
        .values()
        .fold(None::<Vec<&str>>, |acc, segs| match acc {
            None => Some(segs.clone()),
            Some(prefix) => Some(
                prefix
                    .iter()
                    .zip(segs.iter())
                    .take_while(|(a, b)| a == b)
                    .map(|(a, _)| *a)
                    .collect(),
            ),
        })
        .map(|p| p.len())
        .unwrap_or(0);

    dirs.into_iter()
        .map(|(file, segs)| {
            let key = segs
                .get(common)
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| CORE.to_string());
            (file.to_string(), key)
        })
        .collect()
}

/// Build subsystem, layer and external boundaries and annotate endpoints
/// with their subsystem. Returns how many boundaries were added.
pub fn infer(model: &mut DomainModel) -> Result<usize, ModelError> {
    let files: Vec<String> = model
        .endpoints()
        .map(|e| e.file.clone())
        .chain(model.models().map(|m| m.file.clone()))
        .chain(model.services().map(|s| s.file.clone()))
        .chain(model.views().map(|v| v.file.clone()))
        .collect();
    let clusters = cluster_files(files.iter().map(String::as_str));
    let subsystem_of = |file: &str| clusters.get(file).cloned().unwrap_or_else(|| CORE.to_string());

    let mut subsystems: BTreeMap<String, Vec<ComponentRef>> = BTreeMap::new();
    let mut presentation = Vec::new();
    let mut business = Vec::new();
    let mut data = Vec::new();
    let mut endpoint_subsystem = Vec::new();

    for e in model.endpoints() {
        let key = subsystem_of(&e.file);
        subsystems.entry(key.clone()).or_default().push(ComponentRef::Endpoint(e.id.clone()));
        presentation.push(ComponentRef::Endpoint(e.id.clone()));
        endpoint_subsystem.push((e.id.clone(), subsystem_id(&key)));
    }
    for v in model.views() {
        subsystems.entry(subsystem_of(&v.file)).or_default().push(ComponentRef::View(v.id.clone()));
        presentation.push(ComponentRef::View(v.id.clone()));
    }
    for s in model.services() {
        subsystems.entry(subsystem_of(&s.file)).or_default().push(ComponentRef::Service(s.id.clone()));
        let member = ComponentRef::Service(s.id.clone());
        match s.stereotype.as_str() {
            "controller" => presentation.push(member),
            "repository" => data.push(member),
            _ => business.push(member),
        }
    }
    for m in model.models() {
        subsystems.entry(subsystem_of(&m.file)).or_default().push(ComponentRef::Model(m.id.clone()));
        data.push(ComponentRef::Model(m.id.clone()));
    }
    let external: Vec<ComponentRef> = model
        .actors()
        .filter(|a| a.kind == ActorKind::ExternalSystem)
        .map(|a| ComponentRef::Actor(a.id.clone()))
        .collect();

    let mut boundaries: Vec<SystemBoundary> = subsystems
        .into_iter()
        .map(|(key, members)| SystemBoundary {
            id: subsystem_id(&key),
            name: title_case(&key),
            kind: BoundaryKind::Subsystem,
            members,
        })
        .collect();
    for (id, name, members) in [
        (PRESENTATION_LAYER, "Presentation Layer", presentation),
        (BUSINESS_LAYER, "Business Layer", business),
        (DATA_LAYER, "Data Layer", data),
    ] {
        if !members.is_empty() {
            boundaries.push(SystemBoundary {
                id: id.to_string(),
                name: name.to_string(),
                kind: BoundaryKind::Layer,
                members,
            });
        }
    }
    if !external.is_empty() {
        boundaries.push(SystemBoundary {
            id: EXTERNAL_BOUNDARY.to_string(),
            name: "External Systems".to_string(),
            kind: BoundaryKind::External,
            members: external,
        });
    }

    let added = boundaries.len();
    for mut boundary in boundaries {
        boundary.members.sort();
        model.add_boundary(boundary)?;
    }
    for (endpoint_id, boundary_id) in endpoint_subsystem {
        model.set_endpoint_boundary(&endpoint_id, &boundary_id)?;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_strips_roots_and_common_prefix() {
        let clusters = cluster_files([
            "src/main/java/com/shop/orders/OrderController.java",
            "src/main/java/com/shop/orders/Order.java",
            "src/main/java/com/shop/billing/InvoiceService.java",
            "src/main/java/com/shop/App.java",
        ]);
        assert_eq!(clusters["src/main/java/com/shop/orders/Order.java"], "orders");
        assert_eq!(clusters["src/main/java/com/shop/billing/InvoiceService.java"], "billing");
        assert_eq!(clusters["src/main/java/com/shop/App.java"], "core");
    }

    #[test]
    fn test_single_directory_is_core() {
        let clusters = cluster_files(["app/routes.py", "app/models.py"]);
        assert!(clusters.values().all(|k| k == "core"));
    }

    #[test]
    fn test_django_apps_become_subsystems() {
        let clusters = cluster_files(["orders/views.py", "accounts/views.py", "manage.py"]);
        assert_eq!(clusters["orders/views.py"], "orders");
        assert_eq!(clusters["accounts/views.py"], "accounts");
        assert_eq!(clusters["manage.py"], "core");
    }
}
