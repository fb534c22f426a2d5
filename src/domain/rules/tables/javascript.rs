//! Express (JavaScript and TypeScript), with NestJS decorators and the
//! common ODM/ORM declarations.

use super::rule;
use crate::domain::language::Language;
use crate::domain::rules::RuleAction::*;
use crate::domain::rules::{
    ComponentKind, MethodSpec, ParamSpec, RoleSpec, RuleDescriptor, SyntaxPass, TableDescriptor,
};

const EXPRESS_ROUTES: &[RuleDescriptor] = &[rule(
    "express.route",
    r#"\b(?:app|server|api|routes|\w*[rR]outer)\.(get|post|put|patch|delete|all)\(\s*['"`]([^'"`]+)['"`]\s*,(?:.*?([\w.]+)\s*\)\s*;?\s*$)?"#,
    InlineRoute { method: MethodSpec::Group(1), path: 2, handler: Some(3) },
)];

const EXPRESS_AUTH: &[RuleDescriptor] = &[
    rule(
        "express.auth-middleware",
        r"\b(?:authenticate|authenticateToken|isAuthenticated|ensureAuthenticated|ensureLoggedIn|requireAuth|requireLogin|verifyToken|verifyJWT|checkJwt|authMiddleware|protect|auth)\s*(?:\(\s*\))?\s*[,)]",
        AuthMarker { roles: RoleSpec::None },
    ),
    rule(
        "express.passport",
        r"passport\.authenticate\(",
        AuthMarker { roles: RoleSpec::None },
    ),
    rule(
        "express.role-middleware",
        r"\b(?:requireRole|requireRoles|authorize|hasRole|checkRole|permit|restrictTo)\(\s*([^)]*)\)",
        AuthMarker { roles: RoleSpec::List(1) },
    ),
];

pub(super) const JS_MODELS: &[RuleDescriptor] = &[
    rule(
        "mongoose.schema",
        r"(?:const|let|var)\s+(\w+?)Schema\s*=\s*new\s+(?:mongoose\.)?Schema\s*\(",
        ComponentDecl { kind: ComponentKind::Model, name: 1 },
    ),
    rule(
        "mongoose.model",
        r#"mongoose\.model\(\s*['"](\w+)['"]"#,
        ComponentDecl { kind: ComponentKind::Model, name: 1 },
    ),
    rule(
        "mongoose.field",
        r"^\s+(\w+)\s*:\s*\{?\s*(?:type\s*:\s*)?\[?\s*(String|Number|Boolean|Date|Buffer|Map|ObjectId|Mixed|(?:mongoose\.)?Schema\.Types\.\w+)\b",
        Field { name: 1, type_name: Some(2) },
    ),
    rule("mongoose.ref", r#"\bref\s*:\s*['"](\w+)['"]"#, Relation { target: 1 }),
    rule(
        "sequelize.define",
        r#"\.define\(\s*['"](\w+)['"]"#,
        ComponentDecl { kind: ComponentKind::Model, name: 1 },
    ),
    rule(
        "sequelize.field",
        r"^\s+(\w+)\s*:\s*\{?\s*(?:type\s*:\s*)?(?:DataTypes|Sequelize)\.(\w+)",
        Field { name: 1, type_name: Some(2) },
    ),
    rule(
        "js.model-class",
        r"^\s*(?:export\s+)?(?:default\s+)?class\s+(\w+)\s+extends\s+(?:Model|BaseEntity)\b",
        ComponentDecl { kind: ComponentKind::Model, name: 1 },
    ),
];

pub(super) const JS_SERVICES: &[RuleDescriptor] = &[
    rule(
        "js.service",
        r"^\s*(?:export\s+)?(?:default\s+)?class\s+(\w+Service)\b",
        ComponentDecl { kind: ComponentKind::Service("service"), name: 1 },
    ),
    rule(
        "js.repository",
        r"^\s*(?:export\s+)?(?:default\s+)?class\s+(\w+Repository)\b",
        ComponentDecl { kind: ComponentKind::Service("repository"), name: 1 },
    ),
    rule(
        "js.controller",
        r"^\s*(?:export\s+)?(?:default\s+)?class\s+(\w+Controller)\b",
        ComponentDecl { kind: ComponentKind::Service("controller"), name: 1 },
    ),
];

const JS_VIEWS: &[RuleDescriptor] = &[rule(
    "express.render",
    r#"res\.render\(\s*['"`]([^'"`]+)['"`]"#,
    ComponentDecl { kind: ComponentKind::View, name: 1 },
)];

const NEST_DECORATORS: &[RuleDescriptor] = &[
    rule(
        "nest.method",
        r#"@(Get|Post|Put|Patch|Delete|All)\(\s*(?:['"`]([^'"`]*)['"`])?\s*\)"#,
        RouteMarker { method: MethodSpec::Group(1), path: Some(2) },
    ),
    rule(
        "nest.controller-prefix",
        r#"@Controller\(\s*(?:['"`]([^'"`]*)['"`])?\s*\)"#,
        RouteMarker { method: MethodSpec::Unspecified, path: Some(1) },
    ),
    rule(
        "nest.controller",
        r"@Controller\b",
        ComponentMarker { kind: ComponentKind::Service("controller") },
    ),
    rule(
        "nest.injectable",
        r"@Injectable\(",
        ComponentMarker { kind: ComponentKind::Service("service") },
    ),
    rule("nest.guards", r"@UseGuards\(", AuthMarker { roles: RoleSpec::None }),
    rule("nest.roles", r"@Roles\(([^)]*)\)", AuthMarker { roles: RoleSpec::List(1) }),
    rule("nest.public", r"@Public\(\)", AllowAnonymous),
    rule(
        "nest.param",
        r#"@(Param|Query|Body|Headers)\(\s*(?:['"`]\w+['"`])?\s*\)\s*(\w+)"#,
        Param { name: 2, location: ParamSpec::Group(1) },
    ),
];

const TYPEORM: &[RuleDescriptor] = &[
    rule("typeorm.entity", r"@Entity\b", ComponentMarker { kind: ComponentKind::Model }),
    rule("ts.field-annotation", r"^\s*@(\w+)", FieldAnnotation { name: 1 }),
    rule(
        "ts.property",
        r"^\s*(?:(?:public|private|protected|readonly)\s+)*(\w+)[?!]?\s*:\s*([\w\[\]<>| ]+?)\s*(?:=.*)?;\s*$",
        Field { name: 1, type_name: Some(2) },
    ),
];

pub(super) const EXPRESS: &[TableDescriptor] = &[
    TableDescriptor {
        language: Language::JavaScript,
        groups: &[EXPRESS_ROUTES, EXPRESS_AUTH, JS_MODELS, JS_SERVICES, JS_VIEWS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::TypeScript,
        groups: &[
            EXPRESS_ROUTES,
            EXPRESS_AUTH,
            JS_MODELS,
            JS_SERVICES,
            JS_VIEWS,
            NEST_DECORATORS,
            TYPEORM,
        ],
        syntax: SyntaxPass::None,
    },
];
