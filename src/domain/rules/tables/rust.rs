use super::rule;
use crate::domain::language::Language;
use crate::domain::rules::RuleAction::*;
use crate::domain::rules::{RuleDescriptor, SyntaxPass, TableDescriptor};

/// Builder-style routes; attribute routes come from the syntax pass.
const ROUTER_BUILDERS: &[RuleDescriptor] = &[
    rule(
        "rust.route",
        r#"\.route\(\s*"([^"]+)"\s*,\s*(.+)$"#,
        MethodRouter { path: 1, routes: 2 },
    ),
    rule(
        "actix.resource",
        r#"web::resource\(\s*"([^"]+)"\s*\)(.+)$"#,
        MethodRouter { path: 1, routes: 2 },
    ),
];

pub(super) const RUST_WEB: &[TableDescriptor] = &[TableDescriptor {
    language: Language::Rust,
    groups: &[ROUTER_BUILDERS],
    syntax: SyntaxPass::RustItems,
}];

pub(super) const RUST_ITEMS: TableDescriptor = TableDescriptor {
    language: Language::Rust,
    groups: &[],
    syntax: SyntaxPass::RustItems,
};
