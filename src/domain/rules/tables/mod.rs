//! Built-in rule tables, one module per ecosystem.

mod actors;
mod dotnet;
mod generic;
mod javascript;
mod jvm;
mod python;
mod rust;

use crate::domain::framework::Framework;
use crate::domain::rules::{RuleAction, RuleDescriptor, TableDescriptor};

pub(crate) const fn rule(id: &'static str, pattern: &'static str, action: RuleAction) -> RuleDescriptor {
    RuleDescriptor {
        id,
        pattern,
        action,
        path_hint: None,
    }
}

/// Rule restricted to files whose relative path matches `hint`.
pub(crate) const fn hinted(
    id: &'static str,
    pattern: &'static str,
    hint: &'static str,
    action: RuleAction,
) -> RuleDescriptor {
    RuleDescriptor {
        id,
        pattern,
        action,
        path_hint: Some(hint),
    }
}

pub(crate) fn structure_tables(framework: Framework) -> &'static [TableDescriptor] {
    match framework {
        Framework::Spring => jvm::SPRING,
        Framework::Django => python::DJANGO,
        Framework::FastApi => python::FASTAPI,
        Framework::Flask => python::FLASK,
        Framework::Express => javascript::EXPRESS,
        Framework::AspNetCore => dotnet::ASPNET,
        Framework::Actix | Framework::Axum => rust::RUST_WEB,
        Framework::Unknown => generic::GENERIC,
    }
}

/// Actor evidence depends on the language, not the framework.
pub(crate) fn actor_tables(_framework: Framework) -> &'static [TableDescriptor] {
    actors::ACTORS
}
