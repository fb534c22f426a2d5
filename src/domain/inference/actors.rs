//! Actor inference.
//!
//! Identities come from three places: endpoint auth (roles, or the bare
//! "authenticated user" / "visitor"), role declarations found by the actor
//! scan, and outbound integrations. Identities are normalized before
//! de-duplication; each resulting actor keeps every fact that produced it.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::extraction::{Candidate, ExtractionResult};
use crate::domain::model::{
    AccessLevel, Actor, ActorKind, DomainModel, ModelError, Provenance, ProvenanceSource,
};

use super::{normalize_identity, title_case};

pub const VISITOR: &str = "visitor";
pub const AUTHENTICATED_USER: &str = "authenticated user";

const INTERNAL_WORDS: &[&str] = &[
    "admin",
    "administrator",
    "staff",
    "manager",
    "operator",
    "superuser",
    "moderator",
    "support",
    "internal",
    "employee",
];

#[derive(Debug, Default)]
struct Draft {
    name: Option<String>,
    roles: BTreeSet<String>,
    provenance: BTreeSet<Provenance>,
    endpoint_ids: BTreeSet<String>,
    external: bool,
}

/// `actor:` followed by the identity with spaces as hyphens.
pub fn actor_id(identity: &str) -> String {
    format!("actor:{}", identity.replace(' ', "-"))
}

pub fn classify(identity: &str, external: bool) -> (ActorKind, AccessLevel) {
    if identity == VISITOR {
        (ActorKind::EndUser, AccessLevel::Public)
    } else if external {
        (ActorKind::ExternalSystem, AccessLevel::External)
    } else if identity.split(' ').any(|w| INTERNAL_WORDS.contains(&w)) {
        (ActorKind::InternalUser, AccessLevel::Privileged)
    } else {
        (ActorKind::EndUser, AccessLevel::Authenticated)
    }
}

/// Infer actors from merged endpoints plus the actor-phase scan results, add
/// them to the model, and link every endpoint to its actors.
pub fn infer(model: &mut DomainModel, scans: &[ExtractionResult]) -> Result<usize, ModelError> {
    let mut drafts: BTreeMap<String, Draft> = BTreeMap::new();

    for endpoint in model.endpoints() {
        let mut identities: Vec<String> = endpoint
            .roles
            .iter()
            .map(|r| normalize_identity(r))
            .filter(|r| !r.is_empty())
            .collect();
        if identities.is_empty() {
            identities.push(if endpoint.authenticated {
                AUTHENTICATED_USER.to_string()
            } else {
                VISITOR.to_string()
            });
        }
        let role_based = !endpoint.roles.is_empty();

        for identity in identities {
            let draft = drafts.entry(identity.clone()).or_default();
            if role_based {
                draft.roles.insert(identity.clone());
            }
            draft.provenance.insert(Provenance {
                file: endpoint.file.clone(),
                line: endpoint.lines.start,
                source: ProvenanceSource::Endpoint(endpoint.id.clone()),
            });
            draft.endpoint_ids.insert(endpoint.id.clone());
        }
    }

    for scan in scans {
        for candidate in &scan.candidates {
            match candidate {
                Candidate::Role(role) => {
                    let identity = normalize_identity(&role.role);
                    if identity.is_empty() {
                        continue;
                    }
                    let draft = drafts.entry(identity.clone()).or_default();
                    draft.roles.insert(identity);
                    draft.provenance.insert(Provenance {
                        file: scan.file.clone(),
                        line: role.lines.start,
                        source: ProvenanceSource::Declaration(role.evidence.clone()),
                    });
                }
                Candidate::ExternalSystem(ext) => {
                    let identity = normalize_identity(&ext.target);
                    if identity.is_empty() {
                        continue;
                    }
                    let draft = drafts.entry(identity).or_default();
                    draft.external = true;
                    draft.name.get_or_insert_with(|| ext.target.clone());
                    draft.provenance.insert(Provenance {
                        file: scan.file.clone(),
                        line: ext.lines.start,
                        source: ProvenanceSource::OutboundCall(ext.evidence.clone()),
                    });
                }
                _ => {}
            }
        }
    }

    let mut added = 0;
    for (identity, draft) in drafts {
        // An identity that also guards endpoints is a user, not a remote system.
        let external = draft.external && draft.endpoint_ids.is_empty();
        let (kind, access) = classify(&identity, external);
        let id = actor_id(&identity);
        let endpoint_ids: Vec<String> = draft.endpoint_ids.into_iter().collect();
        let name = match draft.name {
            Some(target) if external => target,
            _ => title_case(&identity),
        };

        model.add_actor(Actor {
            id: id.clone(),
            name,
            identity,
            kind,
            access,
            roles: draft.roles.into_iter().collect(),
            provenance: draft.provenance.into_iter().collect(),
            endpoint_ids: endpoint_ids.clone(),
        })?;
        for endpoint_id in &endpoint_ids {
            model.link_endpoint_actor(endpoint_id, &id)?;
        }
        added += 1;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::extraction::{ExternalCandidate, HttpMethod, LineRange, RoleCandidate};
    use crate::domain::model::Endpoint;

    fn endpoint(id: &str, authenticated: bool, roles: &[&str]) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            method: HttpMethod::Get,
            path: "/orders".to_string(),
            component: "OrderController".to_string(),
            handler: None,
            authenticated,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            parameters: vec![],
            file: "OrderController.java".to_string(),
            lines: LineRange::line(1),
            actor_ids: vec![],
            boundary: None,
        }
    }

    #[test]
    fn test_roles_are_normalized_before_dedup() {
        let mut model = DomainModel::new();
        model.add_endpoint(endpoint("a", true, &["ROLE_ADMIN"])).unwrap();
        model.add_endpoint(endpoint("b", true, &["admin "])).unwrap();
        model.add_endpoint(endpoint("c", false, &[])).unwrap();
        model.add_endpoint(endpoint("d", true, &[])).unwrap();

        assert_eq!(infer(&mut model, &[]).unwrap(), 3);

        let admin = model.actor("actor:admin").unwrap();
        assert_eq!(admin.kind, ActorKind::InternalUser);
        assert_eq!(admin.access, AccessLevel::Privileged);
        assert_eq!(admin.endpoint_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(admin.provenance.len(), 2);

        let visitor = model.actor("actor:visitor").unwrap();
        assert_eq!(visitor.access, AccessLevel::Public);
        let user = model.actor("actor:authenticated-user").unwrap();
        assert_eq!(user.access, AccessLevel::Authenticated);
        assert_eq!(user.name, "Authenticated User");

        assert_eq!(model.endpoint("a").unwrap().actor_ids, vec!["actor:admin".to_string()]);
    }

    #[test]
    fn test_declarations_and_external_systems() {
        let mut model = DomainModel::new();
        let mut scan = ExtractionResult::new("config/Security.java");
        scan.candidates.push(Candidate::Role(RoleCandidate {
            role: "CUSTOMER".to_string(),
            evidence: "hasRole(\"CUSTOMER\")".to_string(),
            lines: LineRange::line(12),
        }));
        scan.candidates.push(Candidate::ExternalSystem(ExternalCandidate {
            target: "api.stripe.com".to_string(),
            evidence: "https://api.stripe.com".to_string(),
            lines: LineRange::line(30),
        }));

        infer(&mut model, &[scan]).unwrap();

        let customer = model.actor("actor:customer").unwrap();
        assert_eq!(customer.kind, ActorKind::EndUser);
        assert_eq!(customer.access, AccessLevel::Authenticated);
        assert!(customer.endpoint_ids.is_empty());

        let stripe = model.actor("actor:api.stripe.com").unwrap();
        assert_eq!(stripe.kind, ActorKind::ExternalSystem);
        assert_eq!(stripe.access, AccessLevel::External);
        assert_eq!(stripe.name, "api.stripe.com");
        assert!(matches!(stripe.provenance[0].source, ProvenanceSource::OutboundCall(_)));
    }
}
