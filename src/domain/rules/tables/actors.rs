//! Evidence of who talks to the system: role declarations and outbound
//! integrations.

use super::rule;
use crate::domain::language::Language;
use crate::domain::rules::RuleAction::*;
use crate::domain::rules::{RoleSpec, RuleDescriptor, SyntaxPass, TableDescriptor};

const OUTBOUND_URLS: &[RuleDescriptor] = &[rule(
    "actors.outbound-url",
    r#"['"`]https?://([A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,})"#,
    ExternalSystem { target: 1 },
)];

const JVM_ACTORS: &[RuleDescriptor] = &[
    rule(
        "spring.security-config-role",
        r"\.(?:hasRole|hasAnyRole|hasAuthority|hasAnyAuthority)\(\s*([^)]*)\)",
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
    rule(
        "spring.role-constant",
        r#""ROLE_(\w+)""#,
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
    rule(
        "servlet.user-in-role",
        r#"isUserInRole\(\s*"([^"]+)""#,
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
    rule(
        "spring.feign-client",
        r#"@FeignClient\(\s*(?:(?:name|value)\s*=\s*)?"([^"]+)""#,
        ExternalSystem { target: 1 },
    ),
];

const PY_ACTORS: &[RuleDescriptor] = &[
    rule(
        "django.group",
        r#"Group\.objects\.(?:get_or_create|create|get)\(\s*name\s*=\s*['"]([^'"]+)['"]"#,
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
    rule(
        "django.user-flag",
        r"\buser\.is_(staff|superuser)\b",
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
    rule(
        "py.has-role",
        r#"\bhas_role\(\s*['"](\w+)['"]"#,
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
    rule(
        "py.sdk-import",
        r"^\s*(?:import|from)\s+(stripe|boto3|twilio|sendgrid|paypalrestsdk|firebase_admin|braintree|mailchimp_marketing)\b",
        ExternalSystem { target: 1 },
    ),
];

const JS_ACTORS: &[RuleDescriptor] = &[
    rule(
        "js.role-compare",
        r#"\brole\s*===?\s*['"](\w+)['"]"#,
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
    rule(
        "js.roles-includes",
        r#"\broles\.includes\(\s*['"](\w+)['"]"#,
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
    rule(
        "js.sdk-require",
        r#"require\(\s*['"](stripe|twilio|@sendgrid/mail|aws-sdk|firebase-admin|braintree|@aws-sdk/[\w-]+)['"]\s*\)"#,
        ExternalSystem { target: 1 },
    ),
    rule(
        "js.sdk-import",
        r#"\bfrom\s+['"](stripe|twilio|@sendgrid/mail|aws-sdk|firebase-admin|braintree|@aws-sdk/[\w-]+)['"]"#,
        ExternalSystem { target: 1 },
    ),
];

const CS_ACTORS: &[RuleDescriptor] = &[
    rule(
        "aspnet.is-in-role",
        r#"\.IsInRole\(\s*"([^"]+)""#,
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
    rule(
        "aspnet.require-role",
        r"\.RequireRole\(([^)]*)\)",
        RoleDeclaration { roles: RoleSpec::List(1) },
    ),
];

pub(super) const ACTORS: &[TableDescriptor] = &[
    TableDescriptor {
        language: Language::Java,
        groups: &[OUTBOUND_URLS, JVM_ACTORS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::Kotlin,
        groups: &[OUTBOUND_URLS, JVM_ACTORS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::Python,
        groups: &[OUTBOUND_URLS, PY_ACTORS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::JavaScript,
        groups: &[OUTBOUND_URLS, JS_ACTORS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::TypeScript,
        groups: &[OUTBOUND_URLS, JS_ACTORS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::CSharp,
        groups: &[OUTBOUND_URLS, CS_ACTORS],
        syntax: SyntaxPass::None,
    },
    TableDescriptor {
        language: Language::Rust,
        groups: &[OUTBOUND_URLS],
        syntax: SyntaxPass::None,
    },
];
