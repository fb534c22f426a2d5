//! Django, FastAPI and Flask.

use super::{hinted, rule};
use crate::domain::extraction::HttpMethod;
use crate::domain::language::Language;
use crate::domain::rules::RuleAction::*;
use crate::domain::rules::{
    ComponentKind, MethodSpec, RoleSpec, RuleDescriptor, SyntaxPass, TableDescriptor,
};

const DECORATOR_ROUTES: &[RuleDescriptor] = &[rule(
    "py.method-decorator",
    r#"@(\w+)\.(get|post|put|patch|delete|head|options)\(\s*['"]([^'"]*)['"]"#,
    RouteMarker { method: MethodSpec::Group(2), path: Some(3) },
)];

const FLASK_ROUTES: &[RuleDescriptor] = &[
    rule(
        "flask.route",
        r#"@(\w+)\.route\(\s*['"]([^'"]*)['"](?:.*?methods\s*=\s*[\[(]([^\])]*)[\])])?"#,
        RouteMarker { method: MethodSpec::GroupOr(3, HttpMethod::Get), path: Some(2) },
    ),
    rule(
        "flask.blueprint-prefix",
        r#"Blueprint\([^)]*url_prefix\s*=\s*['"]([^'"]*)['"]"#,
        FilePrefix { path: 1 },
    ),
    rule(
        "flask.template",
        r#"render_template\(\s*['"]([^'"]+)['"]"#,
        ComponentDecl { kind: ComponentKind::View, name: 1 },
    ),
];

const FASTAPI_ROUTES: &[RuleDescriptor] = &[
    rule(
        "fastapi.api-route",
        r#"@(\w+)\.api_route\(\s*['"]([^'"]*)['"](?:.*?methods\s*=\s*\[([^\]]*)\])?"#,
        RouteMarker { method: MethodSpec::Group(3), path: Some(2) },
    ),
    rule(
        "fastapi.router-prefix",
        r#"APIRouter\([^)]*prefix\s*=\s*['"]([^'"]*)['"]"#,
        FilePrefix { path: 1 },
    ),
];

const DJANGO_ROUTES: &[RuleDescriptor] = &[
    hinted(
        "django.path",
        r#"\b(?:re_path|path|url)\(\s*r?['"]\^?([^'"$]*)\$?['"]\s*,\s*([\w.]+)"#,
        r"(^|/)urls\.py$",
        InlineRoute { method: MethodSpec::Fixed(HttpMethod::Any), path: 1, handler: Some(2) },
    ),
    hinted(
        "drf.router",
        r#"\.register\(\s*r?['"]\^?([^'"$]*)['"]\s*,\s*([\w.]+)"#,
        r"(^|/)urls\.py$",
        InlineRoute { method: MethodSpec::Fixed(HttpMethod::Any), path: 1, handler: Some(2) },
    ),
];

const DJANGO_VIEWS: &[RuleDescriptor] = &[
    rule(
        "django.class-view",
        r"^\s*class\s+(\w+)\(\s*(?:[\w.]+\s*,\s*)*(?:\w+\.)?(?:View|TemplateView|ListView|DetailView|CreateView|UpdateView|DeleteView|FormView|APIView|GenericAPIView|ViewSet|ModelViewSet|ReadOnlyModelViewSet|ListAPIView|RetrieveAPIView|ListCreateAPIView|RetrieveUpdateDestroyAPIView)\s*[,)]",
        ComponentDecl { kind: ComponentKind::View, name: 1 },
    ),
    hinted(
        "django.function-view",
        r"^(?:async\s+)?def\s+(\w+)\s*\(\s*request\b",
        r"(^|/)views\.py$",
        ComponentDecl { kind: ComponentKind::View, name: 1 },
    ),
    rule(
        "django.template",
        r#"\brender\(\s*request\s*,\s*['"]([^'"]+)['"]"#,
        ComponentDecl { kind: ComponentKind::View, name: 1 },
    ),
];

const PY_AUTH: &[RuleDescriptor] = &[
    rule(
        "py.login-required",
        r"@(?:\w+\.)?(?:login_required|jwt_required|fresh_jwt_required|token_required|auth_required|user_passes_test)\b",
        AuthMarker { roles: RoleSpec::None },
    ),
    rule(
        "py.permission-required",
        r#"@(?:\w+\.)?permission_required\(\s*(['"][^'"]+['"])"#,
        AuthMarker { roles: RoleSpec::List(1) },
    ),
    rule(
        "py.roles-required",
        r"@(?:roles_required|roles_accepted|role_required)\(([^)]*)\)",
        AuthMarker { roles: RoleSpec::List(1) },
    ),
    rule(
        "py.role-decorator",
        r"@(admin|staff|superuser)(?:_member)?_required\b",
        AuthMarker { roles: RoleSpec::List(1) },
    ),
    rule(
        "django.auth-mixin",
        r"\b(?:LoginRequiredMixin|PermissionRequiredMixin|UserPassesTestMixin)\b",
        AuthMarker { roles: RoleSpec::None },
    ),
    rule(
        "drf.permission-classes",
        r"^\s*permission_classes\s*=\s*[\[(]([^\])]*)[\])]",
        ClassAuth { roles: RoleSpec::PermissionClasses(1) },
    ),
    rule(
        "drf.permission-decorator",
        r"@permission_classes\(\s*[\[(]([^\])]*)",
        AuthMarker { roles: RoleSpec::PermissionClasses(1) },
    ),
    rule(
        "fastapi.auth-dependency",
        r"(?:Depends|Security)\(\s*(?:\w+\.)*(?:get_current_\w*|current_user|current_active_user|oauth2_scheme|verify_token|require_\w*|auth\w*)\s*[,)]",
        AuthMarker { roles: RoleSpec::None },
    ),
    rule(
        "fastapi.security-scopes",
        r"Security\([^)]*scopes\s*=\s*\[([^\]]*)\]",
        AuthMarker { roles: RoleSpec::List(1) },
    ),
];

pub(super) const PY_MODELS: &[RuleDescriptor] = &[
    rule(
        "py.model-class",
        r"^\s*class\s+(\w+)\(\s*(?:[\w.]+\s*,\s*)*(?:models\.Model|db\.Model|Base|BaseModel|SQLModel|Document|DeclarativeBase|AbstractUser|AbstractBaseUser)\b",
        ComponentDecl { kind: ComponentKind::Model, name: 1 },
    ),
    rule(
        "sqlalchemy.column",
        r"^\s+(\w+)\s*=\s*(?:db\.|sa\.)?(?:Column|mapped_column)\(\s*(?:db\.|sa\.)?(\w+)",
        Field { name: 1, type_name: Some(2) },
    ),
    rule(
        "sqlalchemy.mapped",
        r"^\s+(\w+)\s*:\s*Mapped\[\s*([^\]=]+?)\s*\]",
        Field { name: 1, type_name: Some(2) },
    ),
    rule(
        "django.field",
        r"^\s+(\w+)\s*=\s*(?:models|db|sa|sqlalchemy)\.(\w+)\(",
        Field { name: 1, type_name: Some(2) },
    ),
    rule(
        "pydantic.field",
        r"^\s+(\w+)\s*:\s*([A-Za-z_][\w\[\], .|]*?)\s*(?:=.*)?$",
        Field { name: 1, type_name: Some(2) },
    ),
    rule(
        "django.relation",
        r#"models\.(?:ForeignKey|OneToOneField|ManyToManyField)\(\s*['"]?([\w.]+)"#,
        Relation { target: 1 },
    ),
    rule(
        "sqlalchemy.relationship",
        r#"relationship\(\s*['"](\w+)['"]"#,
        Relation { target: 1 },
    ),
];

pub(super) const PY_SERVICES: &[RuleDescriptor] = &[
    rule(
        "py.repository",
        r"^\s*class\s+(\w+Repository)\b",
        ComponentDecl { kind: ComponentKind::Service("repository"), name: 1 },
    ),
    rule(
        "py.service",
        r"^\s*class\s+(\w+(?:Service|Manager|Gateway))\b",
        ComponentDecl { kind: ComponentKind::Service("service"), name: 1 },
    ),
];

const PY_PARAMS: &[RuleDescriptor] = &[rule(
    "py.signature",
    r"^\s*(?:async\s+)?def\s+\w+\s*\((.*)\)",
    ParamList { list: 1 },
)];

pub(super) const DJANGO: &[TableDescriptor] = &[TableDescriptor {
    language: Language::Python,
    groups: &[DJANGO_ROUTES, DJANGO_VIEWS, PY_AUTH, PY_MODELS, PY_SERVICES],
    syntax: SyntaxPass::None,
}];

pub(super) const FASTAPI: &[TableDescriptor] = &[TableDescriptor {
    language: Language::Python,
    groups: &[DECORATOR_ROUTES, FASTAPI_ROUTES, PY_AUTH, PY_MODELS, PY_SERVICES, PY_PARAMS],
    syntax: SyntaxPass::None,
}];

pub(super) const FLASK: &[TableDescriptor] = &[TableDescriptor {
    language: Language::Python,
    groups: &[DECORATOR_ROUTES, FLASK_ROUTES, PY_AUTH, PY_MODELS, PY_SERVICES, PY_PARAMS],
    syntax: SyntaxPass::None,
}];
