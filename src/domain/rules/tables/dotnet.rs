//! ASP.NET Core controllers, minimal APIs and EF entities.

use super::{hinted, rule};
use crate::domain::language::Language;
use crate::domain::rules::RuleAction::*;
use crate::domain::rules::{
    ComponentKind, MethodSpec, ParamSpec, RoleSpec, RuleDescriptor, SyntaxPass, TableDescriptor,
};

const CS_ROUTES: &[RuleDescriptor] = &[
    rule(
        "aspnet.http-attribute",
        r#"\[Http(Get|Post|Put|Patch|Delete)(?:\(\s*(?:template\s*:\s*)?"([^"]*)"[^)]*\))?\]"#,
        RouteMarker { method: MethodSpec::Group(1), path: Some(2) },
    ),
    rule(
        "aspnet.route-attribute",
        r#"\[Route\(\s*"([^"]*)"\s*\)\]"#,
        RouteMarker { method: MethodSpec::Unspecified, path: Some(1) },
    ),
    rule(
        "aspnet.minimal-api",
        r#"\.Map(Get|Post|Put|Patch|Delete)\(\s*"([^"]*)""#,
        InlineRoute { method: MethodSpec::Group(1), path: 2, handler: None },
    ),
];

pub(super) const CS_AUTH: &[RuleDescriptor] = &[
    rule(
        "aspnet.authorize",
        r"\[Authorize\b(?:\(([^)]*)\))?\]",
        AuthMarker { roles: RoleSpec::Keyed(1) },
    ),
    rule(
        "aspnet.require-authorization",
        r"\.RequireAuthorization\(([^)]*)\)",
        AuthMarker { roles: RoleSpec::Keyed(1) },
    ),
    rule("aspnet.allow-anonymous", r"\[AllowAnonymous\]", AllowAnonymous),
];

pub(super) const CS_COMPONENTS: &[RuleDescriptor] = &[
    rule(
        "aspnet.controller",
        r"\bclass\s+(\w+)\s*:\s*(?:Controller|ControllerBase)\b",
        ComponentDecl { kind: ComponentKind::Service("controller"), name: 1 },
    ),
    rule(
        "cs.service",
        r"\bclass\s+(\w+Service)\b",
        ComponentDecl { kind: ComponentKind::Service("service"), name: 1 },
    ),
    rule(
        "cs.repository",
        r"\bclass\s+(\w+Repository)\b",
        ComponentDecl { kind: ComponentKind::Service("repository"), name: 1 },
    ),
    rule(
        "aspnet.view",
        r#"return\s+View\(\s*"([^"]+)""#,
        ComponentDecl { kind: ComponentKind::View, name: 1 },
    ),
    rule(
        "aspnet.razor-page",
        r"\bclass\s+(\w+)\s*:\s*PageModel\b",
        ComponentDecl { kind: ComponentKind::View, name: 1 },
    ),
];

pub(super) const CS_MODELS: &[RuleDescriptor] = &[
    hinted(
        "cs.model-class",
        r"^\s*public\s+(?:(?:partial|sealed|abstract)\s+)*class\s+(\w+)",
        r"(?i)(^|/)(models?|entities|domain)/",
        ComponentDecl { kind: ComponentKind::Model, name: 1 },
    ),
    rule("ef.table", r"\[Table\(", ComponentMarker { kind: ComponentKind::Model }),
    rule("cs.field-attribute", r"^\s*\[(\w+)", FieldAnnotation { name: 1 }),
    rule(
        "cs.property",
        r"^\s*public\s+(?:(?:virtual|required|override)\s+)*([\w<>?\[\],.]+)\s+(\w+)\s*\{\s*get;",
        Field { name: 2, type_name: Some(1) },
    ),
];

const CS_PARAMS: &[RuleDescriptor] = &[rule(
    "aspnet.param",
    r"\[(FromRoute|FromQuery|FromBody|FromHeader|FromForm)\]\s*[\w<>?\[\],.]+\s+(\w+)",
    Param { name: 2, location: ParamSpec::Group(1) },
)];

pub(super) const ASPNET: &[TableDescriptor] = &[TableDescriptor {
    language: Language::CSharp,
    groups: &[CS_ROUTES, CS_AUTH, CS_COMPONENTS, CS_MODELS, CS_PARAMS],
    syntax: SyntaxPass::None,
}];
