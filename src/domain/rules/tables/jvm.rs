//! Spring on Java and Kotlin.

use super::rule;
use crate::domain::language::Language;
use crate::domain::rules::RuleAction::*;
use crate::domain::rules::{
    ComponentKind, MethodSpec, ParamSpec, RoleSpec, RuleDescriptor, SyntaxPass, TableDescriptor,
};

const SPRING_ROUTES: &[RuleDescriptor] = &[
    rule(
        "spring.mapping",
        r#"@(Get|Post|Put|Patch|Delete)Mapping\b(?:\(\s*(?:(?:value|path)\s*=\s*)?[\{\[]?\s*"([^"]*)")?"#,
        RouteMarker { method: MethodSpec::Group(1), path: Some(2) },
    ),
    rule(
        "spring.request-mapping",
        r#"@RequestMapping\b(?:\(\s*(?:(?:value|path)\s*=\s*)?[\{\[]?\s*"([^"]*)")?(?:.*?RequestMethod\.(\w+))?"#,
        RouteMarker { method: MethodSpec::Group(2), path: Some(1) },
    ),
];

const SPRING_AUTH: &[RuleDescriptor] = &[
    rule(
        "spring.pre-authorize",
        r#"@PreAuthorize\(\s*"([^"]*)""#,
        AuthMarker { roles: RoleSpec::Expression(1) },
    ),
    rule(
        "spring.secured",
        r"@(?:Secured|RolesAllowed)\(\s*[\{\[]?\s*([^)}\]]*)",
        AuthMarker { roles: RoleSpec::List(1) },
    ),
    rule(
        "spring.principal",
        r"@AuthenticationPrincipal\b",
        AuthMarker { roles: RoleSpec::None },
    ),
    rule("spring.permit-all", r"@PermitAll\b", AllowAnonymous),
];

const SPRING_COMPONENTS: &[RuleDescriptor] = &[
    rule(
        "spring.controller",
        r"@(?:RestController|Controller)\b",
        ComponentMarker { kind: ComponentKind::Service("controller") },
    ),
    rule(
        "spring.service",
        r"@Service\b",
        ComponentMarker { kind: ComponentKind::Service("service") },
    ),
    rule(
        "spring.repository",
        r"@Repository\b",
        ComponentMarker { kind: ComponentKind::Service("repository") },
    ),
    rule(
        "spring.component",
        r"@Component\b",
        ComponentMarker { kind: ComponentKind::Service("component") },
    ),
    rule(
        "spring.entity",
        r"@(?:Entity|Document|Embeddable)\b",
        ComponentMarker { kind: ComponentKind::Model },
    ),
    rule(
        "spring.data-repository",
        r"interface\s+(\w+)\s*(?::|extends)\s*(?:Jpa|Crud|PagingAndSorting|Mongo|R2dbc|ReactiveCrud|ReactiveMongo)Repository\b",
        ComponentDecl { kind: ComponentKind::Service("repository"), name: 1 },
    ),
    rule(
        "spring.model-and-view",
        r#"new\s+ModelAndView\(\s*"([^"]+)""#,
        ComponentDecl { kind: ComponentKind::View, name: 1 },
    ),
];

const JAVA_PARAMS: &[RuleDescriptor] = &[rule(
    "java.param",
    r"@(PathVariable|RequestParam|RequestBody|RequestHeader)(?:\([^)]*\))?\s+(?:final\s+)?[\w<>,.?\[\]]+\s+(\w+)",
    Param { name: 2, location: ParamSpec::Group(1) },
)];

const KOTLIN_PARAMS: &[RuleDescriptor] = &[rule(
    "kotlin.param",
    r"@(PathVariable|RequestParam|RequestBody|RequestHeader)(?:\([^)]*\))?\s+(\w+)\s*:",
    Param { name: 2, location: ParamSpec::Group(1) },
)];

pub(super) const JAVA_FIELDS: &[RuleDescriptor] = &[
    rule("java.field-annotation", r"^\s*@(\w+)", FieldAnnotation { name: 1 }),
    rule(
        "java.field",
        r"^\s*(?:private|protected|public)\s+((?:final\s+|transient\s+|static\s+)*[\w<>,.?\[\] ]+?)\s+(\w+)\s*(?:=[^;]*)?;",
        Field { name: 2, type_name: Some(1) },
    ),
];

pub(super) const KOTLIN_FIELDS: &[RuleDescriptor] = &[
    rule("kotlin.field-annotation", r"^\s*@(\w+)", FieldAnnotation { name: 1 }),
    rule(
        "kotlin.property",
        r"^\s*(?:@\w+(?:\([^)]*\))?\s+)*(?:(?:private|protected|public|internal|override|lateinit|open)\s+)*(?:val|var)\s+(\w+)\s*:\s*([\w<>,.? ]+?)\s*(?:=.*?)?,?\s*$",
        Field { name: 1, type_name: Some(2) },
    ),
];

pub(super) const SPRING: &[TableDescriptor] = &[
    TableDescriptor {
        language: Language::Java,
        groups: &[SPRING_ROUTES, SPRING_AUTH, SPRING_COMPONENTS, JAVA_PARAMS, JAVA_FIELDS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::Kotlin,
        groups: &[SPRING_ROUTES, SPRING_AUTH, SPRING_COMPONENTS, KOTLIN_PARAMS, KOTLIN_FIELDS],
        syntax: SyntaxPass::None,
    },
];
