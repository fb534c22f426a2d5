//! Language-only rules for repositories with no recognized framework.
//!
//! No routes: without a framework there is no reliable endpoint syntax, so
//! only components (models and services) are reported.

use super::dotnet::CS_MODELS;
use super::javascript::{JS_MODELS, JS_SERVICES};
use super::jvm::{JAVA_FIELDS, KOTLIN_FIELDS};
use super::python::{PY_MODELS, PY_SERVICES};
use super::{hinted, rule};
use crate::domain::language::Language;
use crate::domain::rules::RuleAction::*;
use crate::domain::rules::{ComponentKind, RuleDescriptor, SyntaxPass, TableDescriptor};

const CLASS_COMPONENTS: &[RuleDescriptor] = &[
    rule(
        "generic.repository",
        r"\b(?:class|interface)\s+(\w+Repository)\b",
        ComponentDecl { kind: ComponentKind::Service("repository"), name: 1 },
    ),
    rule(
        "generic.service",
        r"\bclass\s+(\w+(?:Service|Manager))\b",
        ComponentDecl { kind: ComponentKind::Service("service"), name: 1 },
    ),
    rule(
        "generic.controller",
        r"\bclass\s+(\w+Controller)\b",
        ComponentDecl { kind: ComponentKind::Service("controller"), name: 1 },
    ),
    hinted(
        "generic.model-class",
        r"^\s*(?:(?:public|data|final|abstract)\s+)*(?:class|record)\s+(\w+)",
        r"(?i)(^|/)(models?|entit(?:y|ies)|domain)/",
        ComponentDecl { kind: ComponentKind::Model, name: 1 },
    ),
];

pub(super) const GENERIC: &[TableDescriptor] = &[
    TableDescriptor {
        language: Language::Java,
        groups: &[CLASS_COMPONENTS, JAVA_FIELDS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::Kotlin,
        groups: &[CLASS_COMPONENTS, KOTLIN_FIELDS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::CSharp,
        groups: &[CLASS_COMPONENTS, CS_MODELS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::Python,
        groups: &[PY_MODELS, PY_SERVICES],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::JavaScript,
        groups: &[JS_MODELS, JS_SERVICES],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::TypeScript,
        groups: &[JS_MODELS, JS_SERVICES],
        syntax: SyntaxPass::None,
    },
    super::rust::RUST_ITEMS,
];
