//! Use-case derivation.
//!
//! Endpoints are grouped by (component, resource). Each group becomes one use
//! case whose primary actor is chosen by three heuristics in fixed priority,
//! first match wins, with actors visited in id order:
//!
//! 1. an actor linked to any endpoint of the group
//! 2. an actor whose identity is a substring of the normalized use-case name
//! 3. an actor whose roles appear among the words of the scenario steps

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::extraction::HttpMethod;
use crate::domain::model::{Actor, DomainModel, Endpoint, ModelError, UseCase};

use super::{normalize_identity, title_case, words};

/// Path segments that never name a resource.
const NOISE_SEGMENTS: &[&str] = &["api", "rest"];

/// Component suffixes dropped when a group has no resource in its paths.
const COMPONENT_SUFFIXES: &[&str] = &["Controller", "Resource", "Handler", "Views", "View", "Router", "Routes"];

fn verb(method: HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get | HttpMethod::Head | HttpMethod::Options => "View",
        HttpMethod::Post => "Create",
        HttpMethod::Put | HttpMethod::Patch => "Update",
        HttpMethod::Delete => "Delete",
        HttpMethod::Any => "Access",
    }
}

fn is_parameter(segment: &str) -> bool {
    segment.starts_with('{')
        || segment.starts_with(':')
        || segment.starts_with('<')
        || segment.starts_with('*')
        || segment.starts_with('(')
}

fn is_version(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some('v') | Some('V'))
        && chars.clone().next().is_some()
        && chars.all(|c| c.is_ascii_digit() || c == '.')
}

/// First path segment that is not a parameter, `api`, `rest` or a version.
pub fn resource_of(path: &str) -> Option<String> {
    path.split('/')
        .map(|s| s.trim().trim_matches(|c: char| c == '^' || c == '$'))
        .filter(|s| !s.is_empty())
        .find(|s| {
            !is_parameter(s) && !is_version(s) && !NOISE_SEGMENTS.contains(&s.to_lowercase().as_str())
        })
        .map(|s| s.to_lowercase())
}

fn resource_from_component(component: &str) -> String {
    let trimmed = COMPONENT_SUFFIXES
        .iter()
        .find_map(|suffix| component.strip_suffix(suffix).filter(|rest| !rest.is_empty()))
        .unwrap_or(component);
    let mut out = String::new();
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('-');
        }
        out.extend(c.to_lowercase());
    }
    if out.is_empty() {
        "home".to_string()
    } else {
        out
    }
}

pub fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if word.ends_with("sses") || word.ends_with("xes") || word.ends_with("ches") || word.ends_with("shes") {
        word[..word.len() - 2].to_string()
    } else if word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

pub fn plural(word: &str) -> String {
    let vowel_y = ["ay", "ey", "oy", "uy"].iter().any(|s| word.ends_with(s));
    if word.ends_with('y') && !vowel_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") || word.ends_with("sh") {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

fn compact(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn postcondition(verb: &str, resource: &str) -> String {
    match verb {
        "View" => format!("{} data is returned to the caller", resource),
        "Create" => format!("A new {} record is stored", resource),
        "Update" => format!("The {} record reflects the changes", resource),
        "Delete" => format!("The {} record is removed", resource),
        _ => format!("The {} request is processed", resource),
    }
}

/// Pick the primary actor by the three heuristics, in order.
pub fn primary_actor<'a>(
    actors: &[&'a Actor],
    endpoints: &[&Endpoint],
    use_case_name: &str,
    scenario: &[String],
) -> Option<&'a Actor> {
    let linked = actors
        .iter()
        .find(|a| endpoints.iter().any(|e| e.actor_ids.contains(&a.id)));
    if let Some(actor) = linked {
        return Some(*actor);
    }

    let name = normalize_identity(use_case_name);
    let by_name = actors
        .iter()
        .find(|a| !a.identity.is_empty() && name.contains(&a.identity));
    if let Some(actor) = by_name {
        return Some(*actor);
    }

    let scenario_words: BTreeSet<String> = scenario.iter().flat_map(|s| words(s).collect::<Vec<_>>()).collect();
    actors
        .iter()
        .find(|a| a.roles.iter().any(|r| r.split(' ').all(|w| scenario_words.contains(w))))
        .copied()
}

/// Derive use cases from the endpoints, actors and boundaries already in the
/// model. Returns how many were added.
pub fn infer(model: &mut DomainModel) -> Result<usize, ModelError> {
    let mut groups: BTreeMap<(String, String), Vec<&Endpoint>> = BTreeMap::new();
    for e in model.endpoints() {
        let resource = resource_of(&e.path).unwrap_or_else(|| resource_from_component(&e.component));
        groups.entry((e.component.clone(), resource)).or_default().push(e);
    }

    let actors: Vec<&Actor> = model.actors().collect();
    let mut use_cases = Vec::new();

    for (index, ((_, resource), mut endpoints)) in groups.into_iter().enumerate() {
        endpoints.sort_by(|a, b| (a.method, &a.path, &a.id).cmp(&(b.method, &b.path, &b.id)));
        let resource_name = title_case(&resource);

        let verbs: Vec<&str> = endpoints
            .iter()
            .map(|e| verb(e.method))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let name = match verbs.as_slice() {
            [single] => format!("{} {}", single, resource_name),
            _ => format!("Manage {}", resource_name),
        };

        let mut preconditions = Vec::new();
        let roles: BTreeSet<String> = endpoints
            .iter()
            .flat_map(|e| e.roles.iter().map(|r| normalize_identity(r)))
            .filter(|r| !r.is_empty())
            .collect();
        if endpoints.iter().any(|e| e.authenticated) {
            preconditions.push("The user is authenticated".to_string());
        }
        if !roles.is_empty() {
            preconditions.push(format!(
                "The user holds one of the roles: {}",
                roles.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }

        let mut scenario: Vec<String> = endpoints
            .iter()
            .map(|e| {
                let target = match &e.handler {
                    Some(h) => format!("{}.{}", e.component, h),
                    None => e.component.clone(),
                };
                format!("Send {} {} handled by {}", e.method, e.path, target)
            })
            .collect();
        scenario.push("The system returns the outcome of the request".to_string());

        let postconditions: Vec<String> = verbs.iter().map(|v| postcondition(v, &resource.replace('-', " "))).collect();

        let primary = primary_actor(&actors, &endpoints, &name, &scenario).map(|a| a.id.clone());
        let mut actor_ids: BTreeSet<String> = endpoints
            .iter()
            .flat_map(|e| e.actor_ids.iter().cloned())
            .collect();
        actor_ids.extend(primary.iter().cloned());

        let singular_key = compact(&singular(&resource));
        let plural_key = compact(&plural(&singular(&resource)));
        let model_ids: Vec<String> = model
            .models()
            .filter(|m| {
                let key = compact(&m.name);
                key == singular_key || key == plural_key
            })
            .map(|m| m.id.clone())
            .collect();

        let boundary = endpoints.iter().find_map(|e| e.boundary.clone());

        use_cases.push(UseCase {
            id: format!("UC-{:03}", index + 1),
            name,
            primary_actor: primary,
            actor_ids: actor_ids.into_iter().collect(),
            endpoint_ids: endpoints.iter().map(|e| e.id.clone()).collect(),
            model_ids,
            boundary,
            preconditions,
            scenario,
            postconditions,
        });
    }

    let added = use_cases.len();
    for use_case in use_cases {
        model.add_use_case(use_case)?;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::extraction::LineRange;
    use crate::domain::model::{AccessLevel, ActorKind, Field, Model, Provenance, ProvenanceSource};

    fn endpoint(id: &str, method: HttpMethod, path: &str) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            method,
            path: path.to_string(),
            component: "OrderController".to_string(),
            handler: None,
            authenticated: false,
            roles: vec![],
            parameters: vec![],
            file: "OrderController.java".to_string(),
            lines: LineRange::line(1),
            actor_ids: vec![],
            boundary: None,
        }
    }

    fn actor(identity: &str, roles: &[&str]) -> Actor {
        Actor {
            id: format!("actor:{}", identity.replace(' ', "-")),
            name: title_case(identity),
            identity: identity.to_string(),
            kind: ActorKind::EndUser,
            access: AccessLevel::Authenticated,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            provenance: vec![Provenance {
                file: "Security.java".to_string(),
                line: 1,
                source: ProvenanceSource::Declaration(identity.to_string()),
            }],
            endpoint_ids: vec![],
        }
    }

    #[test]
    fn test_resource_of() {
        assert_eq!(resource_of("/api/v1/orders/{id}"), Some("orders".to_string()));
        assert_eq!(resource_of("/rest/:tenant/invoices"), Some("invoices".to_string()));
        assert_eq!(resource_of("^orders/(?P<pk>\\d+)/$"), Some("orders".to_string()));
        assert_eq!(resource_of("/"), None);
        assert_eq!(resource_of("/videos"), Some("videos".to_string()));
    }

    #[test]
    fn test_singular_and_plural() {
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("addresses"), "address");
        assert_eq!(singular("orders"), "order");
        assert_eq!(plural("category"), "categories");
        assert_eq!(plural("key"), "keys");
        assert_eq!(plural("box"), "boxes");
    }

    #[test]
    fn test_groups_name_and_models() {
        let mut model = DomainModel::new();
        model.add_endpoint(endpoint("e1", HttpMethod::Get, "/orders")).unwrap();
        model.add_endpoint(endpoint("e2", HttpMethod::Post, "/orders")).unwrap();
        model.add_endpoint(endpoint("e3", HttpMethod::Get, "/customers/{id}")).unwrap();
        model
            .add_model(Model {
                id: "Order.java::Order".to_string(),
                name: "Order".to_string(),
                fields: vec![Field {
                    name: "id".to_string(),
                    type_name: "Long".to_string(),
                    annotations: vec![],
                }],
                relations: vec![],
                file: "Order.java".to_string(),
                lines: LineRange::line(1),
            })
            .unwrap();

        assert_eq!(infer(&mut model).unwrap(), 2);
        let names: Vec<_> = model.use_cases().map(|u| (u.id.clone(), u.name.clone())).collect();
        assert_eq!(
            names,
            vec![
                ("UC-001".to_string(), "View Customers".to_string()),
                ("UC-002".to_string(), "Manage Orders".to_string()),
            ]
        );
        let orders = model.use_cases().nth(1).unwrap();
        assert_eq!(orders.model_ids, vec!["Order.java::Order".to_string()]);
        assert_eq!(orders.endpoint_ids, vec!["e1".to_string(), "e2".to_string()]);
    }

    #[test]
    fn test_primary_actor_priority() {
        let admin = actor("admin", &["admin"]);
        let customer = actor("customer", &["customer"]);
        let mut linked = endpoint("e1", HttpMethod::Get, "/customers");
        linked.actor_ids = vec!["actor:customer".to_string()];
        let unlinked = endpoint("e2", HttpMethod::Get, "/admin/reports");
        let actors = vec![&admin, &customer];

        // Linked actor wins over a name match.
        let chosen = primary_actor(&actors, &[&linked], "View Admin", &[]).unwrap();
        assert_eq!(chosen.id, "actor:customer");

        // Name substring.
        let chosen = primary_actor(&actors, &[&unlinked], "View Customer Reports", &[]).unwrap();
        assert_eq!(chosen.id, "actor:customer");

        // Scenario words.
        let scenario = vec!["Send GET /admin/reports handled by ReportController".to_string()];
        let chosen = primary_actor(&actors, &[&unlinked], "View Reports", &scenario).unwrap();
        assert_eq!(chosen.id, "actor:admin");

        assert!(primary_actor(&actors, &[&unlinked], "View Reports", &[]).is_none());
    }
}
