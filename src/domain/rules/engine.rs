//! Line Scanner
//!
//! Walks a file line by line. Marker rules (route decorators, auth
//! annotations, component stereotypes) accumulate as pending state and bind
//! to the next class or function declaration. Inline rules produce candidates
//! on the line where they match. Pending markers that are followed by an
//! unrelated statement are dropped.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{
    CompiledRule, CompiledTable, ComponentKind, Deadline, MethodSpec, ParamSpec, RoleSpec,
    RuleAction,
};
use crate::domain::extraction::{
    Candidate, EndpointCandidate, ExtractionError, ExternalCandidate, FieldCandidate,
    GuardedHandler, HttpMethod, LineRange, ModelCandidate, ParamLocation, Parameter,
    RoleCandidate, ServiceCandidate, ViewCandidate,
};
use crate::domain::language::Language;

/// Lines between cooperative deadline checks.
const DEADLINE_STRIDE: usize = 256;

static PATH_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)(?::[^}]*)?\}|<(?:\w+:)?(\w+)>|:(\w+)").unwrap());
static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"`]([^'"`]+)['"`]"#).unwrap());
static ROLE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"has(?:Any)?(?:Role|Authority)\(([^)]*)\)").unwrap());
static KEYED_ARG: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:(\w+)\s*=\s*)?"([^"]*)""#).unwrap());
static METHOD_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(get|post|put|patch|delete|head|options)\(\s*(?:\)\s*\.to\(\s*)?([\w:]+)\s*\)")
        .unwrap()
});

/// Tokens that make a declaration match a statement instead.
const NOT_DECLARATIONS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "new", "throw", "else", "case", "await",
    "yield", "using", "lock", "foreach", "synchronized", "super", "this", "import", "package",
    "typeof", "when",
];

/// Handlers that mount other route tables instead of serving requests.
const IGNORED_HANDLERS: &[&str] = &["include"];

/// Parameters frameworks inject that are not part of the HTTP contract.
const IMPLICIT_ARGS: &[&str] = &[
    "self", "cls", "request", "req", "res", "db", "session", "current_user", "response",
    "background_tasks",
];

const RELATION_ANNOTATIONS: &[&str] = &[
    "ManyToOne", "OneToMany", "OneToOne", "ManyToMany", "DBRef", "DocumentReference",
    "ForeignKey", "InverseProperty",
];

const TYPE_MODIFIERS: &[&str] = &["final", "transient", "volatile", "readonly"];

const IGNORED_HOSTS: &[&str] = &[
    "example.com", "example.org", "example.net", "w3.org", "json-schema.org", "xmlsoap.org",
    "schemas.microsoft.com", "xmlns.com", "apache.org", "springframework.org", "localhost",
];

// ═══════════════════════════════════════════════════════════════════════════
// Matches
// ═══════════════════════════════════════════════════════════════════════════

struct Hit {
    action: RuleAction,
    groups: Vec<Option<String>>,
    text: String,
}

impl Hit {
    fn new(rule: &CompiledRule, caps: &Captures<'_>) -> Self {
        Self {
            action: rule.action,
            groups: caps
                .iter()
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect(),
            text: caps.get(0).map_or("", |m| m.as_str()).trim().to_string(),
        }
    }

    /// Trimmed, non-empty capture group.
    fn group(&self, index: usize) -> Option<&str> {
        self.groups
            .get(index)
            .and_then(|g| g.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

enum AuthOutcome {
    Anonymous,
    Protected(BTreeSet<String>),
}

#[derive(Debug, Clone, Default)]
struct Guard {
    roles: BTreeSet<String>,
}

impl Guard {
    fn merged(a: Option<&Guard>, b: Option<&Guard>) -> Option<Guard> {
        match (a, b) {
            (None, None) => None,
            (a, b) => {
                let mut roles = BTreeSet::new();
                for g in [a, b].into_iter().flatten() {
                    roles.extend(g.roles.iter().cloned());
                }
                Some(Guard { roles })
            }
        }
    }
}

struct PendingRoute {
    methods: Vec<HttpMethod>,
    path: String,
}

#[derive(Debug)]
struct ClassScope {
    name: String,
    prefix: Option<String>,
    guard: Option<Guard>,
    service: Option<usize>,
}

#[derive(Default)]
struct Output {
    endpoints: Vec<EndpointCandidate>,
    models: Vec<ModelCandidate>,
    services: Vec<ServiceCandidate>,
    views: Vec<ViewCandidate>,
    guarded: Vec<GuardedHandler>,
    roles: Vec<RoleCandidate>,
    externals: Vec<ExternalCandidate>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Scanner
// ═══════════════════════════════════════════════════════════════════════════

/// Apply one compiled table to a file's text.
pub(crate) fn scan(
    table: &CompiledTable,
    relative: &str,
    stem: &str,
    text: &str,
    deadline: &Deadline,
) -> Result<Vec<Candidate>, ExtractionError> {
    let rules: Vec<&CompiledRule> = table
        .rules
        .iter()
        .filter(|rule| rule.path_hint.as_ref().map_or(true, |hint| hint.is_match(relative)))
        .collect();
    if rules.is_empty() {
        return Ok(Vec::new());
    }

    let mut scanner = Scanner::new(table.language, stem);
    for (index, line) in text.lines().enumerate() {
        let number = index + 1;
        if number % DEADLINE_STRIDE == 0 {
            deadline.check()?;
        }
        scanner.line(table, &rules, line, number);
    }
    Ok(scanner.finish())
}

struct Scanner<'a> {
    language: Language,
    stem: &'a str,
    file_prefix: Option<String>,
    class: Option<ClassScope>,
    current_model: Option<usize>,
    routes: Vec<PendingRoute>,
    guard: Option<Guard>,
    anonymous: bool,
    components: Vec<ComponentKind>,
    field_annotations: Vec<String>,
    params: Vec<Parameter>,
    first_marker_line: Option<usize>,
    open_depth: i32,
    out: Output,
}

impl<'a> Scanner<'a> {
    fn new(language: Language, stem: &'a str) -> Self {
        Self {
            language,
            stem,
            file_prefix: None,
            class: None,
            current_model: None,
            routes: Vec::new(),
            guard: None,
            anonymous: false,
            components: Vec::new(),
            field_annotations: Vec::new(),
            params: Vec::new(),
            first_marker_line: None,
            open_depth: 0,
            out: Output::default(),
        }
    }

    fn line(&mut self, table: &CompiledTable, rules: &[&CompiledRule], line: &str, number: usize) {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || self
                .language
                .comment_prefixes()
                .iter()
                .any(|prefix| trimmed.starts_with(prefix))
        {
            return;
        }
        self.close_scope(line, trimmed);

        let hits: Vec<Hit> = rules
            .iter()
            .flat_map(|rule| rule.regex.captures_iter(line).map(move |caps| Hit::new(rule, &caps)))
            .collect();

        // Auth on this line, kept apart for inline routes.
        let mut line_guard: Option<Guard> = None;
        let mut line_anonymous = false;
        for hit in &hits {
            match hit.action {
                RuleAction::AuthMarker { roles } => match resolve_roles(roles, hit) {
                    AuthOutcome::Anonymous => line_anonymous = true,
                    AuthOutcome::Protected(found) => {
                        line_guard.get_or_insert_with(Guard::default).roles.extend(found)
                    }
                },
                RuleAction::AllowAnonymous => line_anonymous = true,
                _ => {}
            }
        }
        if line_guard.is_some() || line_anonymous {
            self.mark(number);
            self.guard = Guard::merged(self.guard.as_ref(), line_guard.as_ref());
            self.anonymous |= line_anonymous;
        }

        for hit in &hits {
            self.collect_marker(hit, number);
        }

        let declared = self.declaration(table, line, number);

        for hit in &hits {
            self.apply_immediate(hit, number, line_guard.as_ref(), line_anonymous);
        }

        let annotation_like =
            trimmed.starts_with('@') || trimmed.starts_with('[') || trimmed.starts_with("#[");
        let continuing = self.open_depth > 0;
        self.open_depth = if continuing || annotation_like {
            (self.open_depth + paren_delta(line)).max(0)
        } else {
            0
        };
        if hits.is_empty() && !declared && !annotation_like && !continuing {
            self.clear_pending();
        }
    }

    /// End the enclosing class when the source leaves its body.
    fn close_scope(&mut self, line: &str, trimmed: &str) {
        let at_column_zero = !line.starts_with(char::is_whitespace);
        let leaves = match self.language {
            Language::Python => at_column_zero && !trimmed.starts_with('@'),
            Language::Rust => false,
            _ => at_column_zero && trimmed.starts_with('}'),
        };
        if leaves {
            self.class = None;
            self.current_model = None;
        }
    }

    fn collect_marker(&mut self, hit: &Hit, number: usize) {
        match hit.action {
            RuleAction::RouteMarker { method, path } => {
                self.mark(number);
                self.routes.push(PendingRoute {
                    methods: resolve_methods(method, hit),
                    path: path.and_then(|g| hit.group(g)).unwrap_or("").to_string(),
                });
            }
            RuleAction::ComponentMarker { kind } => {
                self.mark(number);
                if !self.components.contains(&kind) {
                    self.components.push(kind);
                }
            }
            RuleAction::FieldAnnotation { name } => {
                if self.current_model.is_some() {
                    if let Some(annotation) = hit.group(name) {
                        self.field_annotations.push(annotation.to_string());
                    }
                }
            }
            RuleAction::Param { name, location } => {
                if let Some(param) = hit.group(name) {
                    let location = match location {
                        ParamSpec::Fixed(location) => location,
                        ParamSpec::Group(g) => ParamLocation::from_marker(hit.group(g).unwrap_or("")),
                    };
                    push_param(&mut self.params, param, location);
                }
            }
            RuleAction::ParamList { list } => {
                for param in parse_param_list(hit.group(list).unwrap_or("")) {
                    push_param(&mut self.params, &param.name, param.location);
                }
            }
            _ => {}
        }
    }

    fn declaration(&mut self, table: &CompiledTable, line: &str, number: usize) -> bool {
        if let Some(caps) = table.class_decl.captures(line) {
            if let Some(name) = last_group(&caps) {
                self.bind_class(name.to_string(), number);
                return true;
            }
        }
        if let Some(caps) = table.fn_decl.captures(line) {
            let groups: Vec<&str> = caps.iter().skip(1).flatten().map(|m| m.as_str()).collect();
            if groups.iter().any(|g| NOT_DECLARATIONS.contains(g)) {
                return false;
            }
            if let Some(name) = groups.last() {
                self.bind_function(name.to_string(), number);
                return true;
            }
        }
        false
    }

    fn bind_class(&mut self, name: String, number: usize) {
        let start = self.first_marker_line.unwrap_or(number);
        let prefix = self
            .routes
            .iter()
            .find(|r| !r.path.is_empty())
            .map(|r| controller_path(&r.path, &name));
        let guard = if self.anonymous { None } else { self.guard.take() };

        let mut scope = ClassScope {
            name: name.clone(),
            prefix,
            guard: guard.clone(),
            service: None,
        };
        self.current_model = None;
        for kind in std::mem::take(&mut self.components) {
            match kind {
                ComponentKind::Model => self.current_model = Some(self.add_model(&name, start)),
                ComponentKind::Service(stereotype) => {
                    scope.service = Some(self.add_service(&name, stereotype, start))
                }
                ComponentKind::View => self.add_view(&name, start),
            }
        }
        if let Some(guard) = guard {
            self.out.guarded.push(GuardedHandler {
                name: name.clone(),
                roles: guard.roles.into_iter().collect(),
                lines: LineRange::span(start, number),
            });
        }
        self.class = Some(scope);
        self.clear_pending();
    }

    fn bind_function(&mut self, name: String, number: usize) {
        let start = self.first_marker_line.unwrap_or(number);
        let routes = std::mem::take(&mut self.routes);
        let own_guard = self.guard.take();

        if !routes.is_empty() {
            let guard = if self.anonymous {
                None
            } else {
                Guard::merged(
                    own_guard.as_ref(),
                    self.class.as_ref().and_then(|c| c.guard.as_ref()),
                )
            };
            let params = std::mem::take(&mut self.params);
            self.emit_endpoints(routes, &name, guard, params, LineRange::span(start, number));
        } else if let Some(guard) = own_guard {
            self.out.guarded.push(GuardedHandler {
                name: name.clone(),
                roles: guard.roles.into_iter().collect(),
                lines: LineRange::span(start, number),
            });
        }

        if let Some(index) = self.class.as_ref().and_then(|c| c.service) {
            let service = &mut self.out.services[index];
            if !service.operations.contains(&name) {
                service.operations.push(name);
            }
            service.lines.end = number;
        }
        self.clear_pending();
    }

    fn emit_endpoints(
        &mut self,
        routes: Vec<PendingRoute>,
        handler: &str,
        guard: Option<Guard>,
        params: Vec<Parameter>,
        lines: LineRange,
    ) {
        let (explicit, bare): (Vec<PendingRoute>, Vec<PendingRoute>) =
            routes.into_iter().partition(|r| !r.methods.is_empty());

        let mut resolved: Vec<(HttpMethod, String)> = Vec::new();
        if explicit.is_empty() {
            resolved.extend(bare.into_iter().map(|r| (HttpMethod::Any, r.path)));
        } else {
            let fallback = bare.iter().find(|r| !r.path.is_empty()).map(|r| r.path.clone());
            for route in explicit {
                let path = if route.path.is_empty() {
                    fallback.clone().unwrap_or_default()
                } else {
                    route.path
                };
                for method in route.methods {
                    resolved.push((method, path.clone()));
                }
            }
        }

        let class_prefix = self.class.as_ref().and_then(|c| c.prefix.clone());
        let component = self.component();
        for (method, path) in resolved {
            let path = path.replace("[action]", &handler.to_lowercase());
            let full = join_paths(&[
                self.file_prefix.as_deref(),
                class_prefix.as_deref(),
                Some(path.as_str()),
            ]);
            self.push_endpoint(
                method,
                full,
                component.clone(),
                Some(handler.to_string()),
                guard.as_ref(),
                &params,
                lines,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_endpoint(
        &mut self,
        method: HttpMethod,
        path: String,
        component: String,
        handler: Option<String>,
        guard: Option<&Guard>,
        extra: &[Parameter],
        lines: LineRange,
    ) {
        let mut parameters = path_parameters(&path);
        for param in extra {
            push_param(&mut parameters, &param.name, param.location);
        }
        self.out.endpoints.push(EndpointCandidate {
            method,
            path,
            component,
            handler,
            authenticated: guard.is_some(),
            roles: guard.map(|g| g.roles.iter().cloned().collect()).unwrap_or_default(),
            parameters,
            lines,
        });
    }

    fn apply_immediate(
        &mut self,
        hit: &Hit,
        number: usize,
        line_guard: Option<&Guard>,
        line_anonymous: bool,
    ) {
        let guard = if line_anonymous { None } else { line_guard };
        match hit.action {
            RuleAction::InlineRoute { method, path, handler } => {
                let path = hit.group(path).unwrap_or("");
                let handler = handler
                    .and_then(|g| hit.group(g))
                    .map(|h| h.trim_end_matches(".as_view").to_string());
                if handler
                    .as_deref()
                    .map_or(false, |h| IGNORED_HANDLERS.contains(&last_segment(h)))
                {
                    return;
                }
                let mut methods = resolve_methods(method, hit);
                if methods.is_empty() {
                    methods.push(HttpMethod::Any);
                }
                let full = join_paths(&[self.file_prefix.as_deref(), Some(path)]);
                let component = self.component();
                for method in methods {
                    self.push_endpoint(
                        method,
                        full.clone(),
                        component.clone(),
                        handler.clone(),
                        guard,
                        &[],
                        LineRange::line(number),
                    );
                }
            }
            RuleAction::MethodRouter { path, routes } => {
                let (Some(path), Some(routes)) = (hit.group(path), hit.group(routes)) else {
                    return;
                };
                let full = join_paths(&[self.file_prefix.as_deref(), Some(path)]);
                let component = self.component();
                let pairs: Vec<(HttpMethod, String)> = METHOD_ROUTE
                    .captures_iter(routes)
                    .filter_map(|caps| {
                        let method = HttpMethod::parse(caps.get(1)?.as_str())?;
                        let handler = caps.get(2)?.as_str().rsplit("::").next()?.to_string();
                        Some((method, handler))
                    })
                    .collect();
                for (method, handler) in pairs {
                    self.push_endpoint(
                        method,
                        full.clone(),
                        component.clone(),
                        Some(handler),
                        guard,
                        &[],
                        LineRange::line(number),
                    );
                }
            }
            RuleAction::FilePrefix { path } => {
                if let Some(prefix) = hit.group(path) {
                    self.file_prefix = Some(prefix.to_string());
                }
            }
            RuleAction::ClassAuth { roles } => {
                let outcome = resolve_roles(roles, hit);
                self.guard_class(outcome, number);
            }
            RuleAction::ComponentDecl { kind, name } => {
                if let Some(name) = hit.group(name) {
                    self.declare_component(kind, name, number);
                }
            }
            RuleAction::Field { name, type_name } => {
                if let Some(field) = hit.group(name) {
                    let type_name = type_name.and_then(|g| hit.group(g)).unwrap_or("");
                    self.add_field(field, type_name, number);
                }
            }
            RuleAction::Relation { target } => {
                let Some(index) = self.current_model else { return };
                let Some(target) = hit.group(target).map(last_segment) else { return };
                if target == "self" || target.is_empty() {
                    return;
                }
                let model = &mut self.out.models[index];
                if !model.relations.iter().any(|r| r == target) {
                    model.relations.push(target.to_string());
                }
            }
            RuleAction::RoleDeclaration { roles } => {
                if let AuthOutcome::Protected(found) = resolve_roles(roles, hit) {
                    for role in found {
                        self.out.roles.push(RoleCandidate {
                            role,
                            evidence: hit.text.clone(),
                            lines: LineRange::line(number),
                        });
                    }
                }
            }
            RuleAction::ExternalSystem { target } => {
                if let Some(target) = hit.group(target) {
                    if !is_ignored_host(target) {
                        self.out.externals.push(ExternalCandidate {
                            target: target.to_lowercase(),
                            evidence: hit.text.clone(),
                            lines: LineRange::line(number),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    fn guard_class(&mut self, outcome: AuthOutcome, number: usize) {
        let AuthOutcome::Protected(roles) = outcome else { return };
        let Some(scope) = self.class.as_mut() else { return };
        scope
            .guard
            .get_or_insert_with(Guard::default)
            .roles
            .extend(roles.iter().cloned());
        let name = scope.name.clone();
        match self.out.guarded.iter_mut().find(|g| g.name == name) {
            Some(existing) => {
                let mut merged: BTreeSet<String> = existing.roles.drain(..).collect();
                merged.extend(roles);
                existing.roles = merged.into_iter().collect();
            }
            None => self.out.guarded.push(GuardedHandler {
                name,
                roles: roles.into_iter().collect(),
                lines: LineRange::line(number),
            }),
        }
    }

    fn declare_component(&mut self, kind: ComponentKind, name: &str, number: usize) {
        match kind {
            ComponentKind::Model => {
                let index = self.add_model(&capitalize(name), number);
                self.current_model = Some(index);
            }
            ComponentKind::Service(stereotype) => {
                let index = self.add_service(name, stereotype, number);
                if let Some(scope) = self.class.as_mut() {
                    if scope.name == name {
                        scope.service = Some(index);
                    }
                }
            }
            ComponentKind::View => self.add_view(name, number),
        }
    }

    fn add_field(&mut self, name: &str, raw_type: &str, number: usize) {
        let Some(index) = self.current_model else { return };
        let words: Vec<&str> = raw_type.split_whitespace().collect();
        if words.contains(&"static") {
            return;
        }
        let type_name = words
            .into_iter()
            .filter(|w| !TYPE_MODIFIERS.contains(w))
            .collect::<Vec<_>>()
            .join(" ");
        let annotations = std::mem::take(&mut self.field_annotations);

        let model = &mut self.out.models[index];
        if model.fields.iter().any(|f| f.name == name) {
            return;
        }
        if annotations.iter().any(|a| RELATION_ANNOTATIONS.contains(&a.as_str())) {
            if let Some(target) = base_type(&type_name) {
                if !model.relations.iter().any(|r| r == target) {
                    model.relations.push(target.to_string());
                }
            }
        }
        model.fields.push(FieldCandidate {
            name: name.to_string(),
            type_name,
            annotations,
        });
        model.lines.end = number;
    }

    fn add_model(&mut self, name: &str, line: usize) -> usize {
        if let Some(index) = self.out.models.iter().position(|m| m.name == name) {
            return index;
        }
        self.out.models.push(ModelCandidate {
            name: name.to_string(),
            fields: Vec::new(),
            relations: Vec::new(),
            lines: LineRange::line(line),
        });
        self.out.models.len() - 1
    }

    fn add_service(&mut self, name: &str, stereotype: &str, line: usize) -> usize {
        if let Some(index) = self.out.services.iter().position(|s| s.name == name) {
            return index;
        }
        self.out.services.push(ServiceCandidate {
            name: name.to_string(),
            stereotype: stereotype.to_string(),
            operations: Vec::new(),
            lines: LineRange::line(line),
        });
        self.out.services.len() - 1
    }

    fn add_view(&mut self, name: &str, line: usize) {
        if !self.out.views.iter().any(|v| v.name == name) {
            self.out.views.push(ViewCandidate {
                name: name.to_string(),
                lines: LineRange::line(line),
            });
        }
    }

    fn component(&self) -> String {
        match (&self.class, self.language) {
            (Some(scope), language) if language != Language::Rust => scope.name.clone(),
            _ => self.stem.to_string(),
        }
    }

    fn mark(&mut self, number: usize) {
        self.first_marker_line.get_or_insert(number);
    }

    fn clear_pending(&mut self) {
        self.routes.clear();
        self.guard = None;
        self.anonymous = false;
        self.components.clear();
        self.field_annotations.clear();
        self.params.clear();
        self.first_marker_line = None;
    }

    fn finish(self) -> Vec<Candidate> {
        let out = self.out;
        let mut candidates: Vec<Candidate> = Vec::new();
        candidates.extend(out.endpoints.into_iter().map(Candidate::Endpoint));
        candidates.extend(out.models.into_iter().map(Candidate::Model));
        candidates.extend(out.services.into_iter().map(Candidate::Service));
        candidates.extend(out.views.into_iter().map(Candidate::View));
        candidates.extend(out.guarded.into_iter().map(Candidate::GuardedHandler));
        candidates.extend(out.roles.into_iter().map(Candidate::Role));
        candidates.extend(out.externals.into_iter().map(Candidate::ExternalSystem));
        candidates.sort_by_key(Candidate::first_line);
        candidates
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

fn resolve_methods(spec: MethodSpec, hit: &Hit) -> Vec<HttpMethod> {
    match spec {
        MethodSpec::Fixed(method) => vec![method],
        MethodSpec::Group(g) => hit.group(g).map(HttpMethod::parse_list).unwrap_or_default(),
        MethodSpec::GroupOr(g, default) => {
            let methods = hit.group(g).map(HttpMethod::parse_list).unwrap_or_default();
            if methods.is_empty() {
                vec![default]
            } else {
                methods
            }
        }
        MethodSpec::Unspecified => Vec::new(),
    }
}

fn resolve_roles(spec: RoleSpec, hit: &Hit) -> AuthOutcome {
    let raw = match spec {
        RoleSpec::None => return AuthOutcome::Protected(BTreeSet::new()),
        RoleSpec::List(g)
        | RoleSpec::Expression(g)
        | RoleSpec::PermissionClasses(g)
        | RoleSpec::Keyed(g) => hit.group(g).unwrap_or(""),
    };
    match spec {
        RoleSpec::Expression(_) => {
            if raw.contains("permitAll") {
                return AuthOutcome::Anonymous;
            }
            let roles = ROLE_CALL
                .captures_iter(raw)
                .filter_map(|c| c.get(1))
                .flat_map(|m| parse_role_list(m.as_str()))
                .collect();
            AuthOutcome::Protected(roles)
        }
        RoleSpec::PermissionClasses(_) => {
            let classes: Vec<&str> = raw
                .split(',')
                .map(|c| last_segment(c.trim()))
                .filter(|c| !c.is_empty())
                .collect();
            if !classes.is_empty() && classes.iter().all(|c| *c == "AllowAny") {
                return AuthOutcome::Anonymous;
            }
            let mut roles = BTreeSet::new();
            if classes.contains(&"IsAdminUser") {
                roles.insert("admin".to_string());
            }
            AuthOutcome::Protected(roles)
        }
        RoleSpec::Keyed(_) => {
            let roles = KEYED_ARG
                .captures_iter(raw)
                .filter(|c| {
                    c.get(1)
                        .map_or(true, |key| matches!(key.as_str(), "Roles" | "Policy"))
                })
                .filter_map(|c| c.get(2))
                .flat_map(|m| split_list(m.as_str()))
                .collect();
            AuthOutcome::Protected(roles)
        }
        _ => AuthOutcome::Protected(parse_role_list(raw).into_iter().collect()),
    }
}

/// Roles out of a list like `'ADMIN', 'STAFF'`, `{"A,B"}` or `Roles.ADMIN`.
fn parse_role_list(raw: &str) -> Vec<String> {
    let quoted: Vec<&str> = QUOTED
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    if !quoted.is_empty() {
        return quoted.into_iter().flat_map(split_list).collect();
    }
    raw.split(|c: char| c == ',' || c == '|' || c.is_whitespace() || "{}[]()".contains(c))
        .map(|token| last_segment(token.trim()))
        .filter(|token| is_identifier(token))
        .map(str::to_string)
        .collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split on commas outside brackets.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Parameters of a Python signature, minus injected ones.
fn parse_param_list(raw: &str) -> Vec<Parameter> {
    split_top_level(raw)
        .into_iter()
        .filter_map(|arg| {
            let arg = arg.trim().trim_start_matches('*');
            if arg.contains("Depends(") || arg.contains("Security(") {
                return None;
            }
            let name = arg.split(|c: char| c == ':' || c == '=').next()?.trim();
            if !is_identifier(name) || IMPLICIT_ARGS.contains(&name) {
                return None;
            }
            let annotation = arg
                .split_once(':')
                .map(|(_, rest)| rest.split('=').next().unwrap_or("").trim())
                .unwrap_or("");
            let location = if arg.contains("Body(") {
                ParamLocation::Body
            } else if arg.contains("Header(") {
                ParamLocation::Header
            } else if arg.contains("Path(") {
                ParamLocation::Path
            } else if annotation.starts_with(char::is_uppercase)
                && !["Optional", "List", "Dict", "Union", "Annotated"]
                    .iter()
                    .any(|t| annotation.starts_with(t))
            {
                ParamLocation::Body
            } else {
                ParamLocation::Query
            };
            Some(Parameter {
                name: name.to_string(),
                location,
            })
        })
        .collect()
}

fn push_param(params: &mut Vec<Parameter>, name: &str, location: ParamLocation) {
    if !params.iter().any(|p| p.name == name) {
        params.push(Parameter {
            name: name.to_string(),
            location,
        });
    }
}

pub(crate) fn path_parameters(path: &str) -> Vec<Parameter> {
    let mut params = Vec::new();
    for caps in PATH_PARAM.captures_iter(path) {
        if let Some(name) = caps.iter().skip(1).flatten().next() {
            push_param(&mut params, name.as_str(), ParamLocation::Path);
        }
    }
    params
}

/// Join route fragments into one absolute path without a trailing slash.
pub(crate) fn join_paths(parts: &[Option<&str>]) -> String {
    let segments: Vec<&str> = parts
        .iter()
        .flatten()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty() && *segment != "~")
        .collect();
    format!("/{}", segments.join("/"))
}

fn controller_path(path: &str, class: &str) -> String {
    let short = class.strip_suffix("Controller").unwrap_or(class).to_lowercase();
    path.replace("[controller]", &short)
}

fn last_group<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.iter().skip(1).flatten().last().map(|m| m.as_str())
}

fn last_segment(s: &str) -> &str {
    s.rsplit('.').next().unwrap_or(s)
}

/// Innermost type name of `List<Order>`, `Mapped[list["Order"]]` or `Order[]`.
fn base_type(type_name: &str) -> Option<&str> {
    type_name
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .last()
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

fn is_ignored_host(host: &str) -> bool {
    let host = host.to_lowercase();
    IGNORED_HOSTS
        .iter()
        .any(|ignored| host == *ignored || host.ends_with(&format!(".{}", ignored)))
}

fn paren_delta(line: &str) -> i32 {
    line.chars().fold(0, |depth, c| match c {
        '(' => depth + 1,
        ')' => depth - 1,
        _ => depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::framework::Framework;
    use crate::domain::rules::{ExtractorRegistry, RulePhase};
    use std::time::Duration;

    fn scan_with(framework: Framework, phase: RulePhase, language: Language, relative: &str, text: &str) -> Vec<Candidate> {
        let set = ExtractorRegistry::with_defaults().rule_set(framework, phase).unwrap();
        let table = set.tables.get(&language).unwrap();
        let stem = relative.rsplit('/').next().unwrap().split('.').next().unwrap();
        scan(table, relative, stem, text, &Deadline::after(Duration::from_secs(5))).unwrap()
    }

    fn endpoints(candidates: &[Candidate]) -> Vec<&EndpointCandidate> {
        candidates
            .iter()
            .filter_map(|c| match c {
                Candidate::Endpoint(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_flask_routes_bind_decorators() {
        let source = "\
from flask import Blueprint
bp = Blueprint('users', __name__, url_prefix='/api')

@bp.route('/users', methods=['GET', 'POST'])
@login_required
def users():
    return []

@bp.route('/users/<int:user_id>')
def user(user_id):
    return {}
";
        let found = scan_with(Framework::Flask, RulePhase::Structure, Language::Python, "app/users.py", source);
        let eps = endpoints(&found);
        assert_eq!(eps.len(), 3);
        assert_eq!(eps[0].method, HttpMethod::Get);
        assert_eq!(eps[0].path, "/api/users");
        assert!(eps[0].authenticated);
        assert_eq!(eps[1].method, HttpMethod::Post);
        assert_eq!(eps[2].path, "/api/users/<int:user_id>");
        assert!(!eps[2].authenticated);
        assert_eq!(eps[2].parameters[0].name, "user_id");
        assert_eq!(eps[2].parameters[0].location, ParamLocation::Path);
        assert_eq!(eps[2].component, "users");
    }

    #[test]
    fn test_stacked_flask_routes_share_declaration() {
        let source = "\
@app.route('/')
@app.route('/index')
def index():
    return 'home'
";
        let found = scan_with(Framework::Flask, RulePhase::Structure, Language::Python, "app.py", source);
        let eps = endpoints(&found);
        let paths: Vec<&str> = eps.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/index"]);
        assert_eq!(eps[0].lines.start, eps[1].lines.start);
        assert_eq!(eps[0].method, eps[1].method);
    }

    #[test]
    fn test_spring_controller_prefix_and_roles() {
        let source = r#"
@RestController
@RequestMapping("/api/orders")
public class OrderController {

    @GetMapping("/{id}")
    public Order get(@PathVariable Long id) {
        return service.find(id);
    }

    @PreAuthorize("hasRole('ADMIN')")
    @DeleteMapping("/{id}")
    public void delete(@PathVariable("id") Long id) {
        service.delete(id);
    }
}
"#;
        let found = scan_with(Framework::Spring, RulePhase::Structure, Language::Java, "src/main/java/OrderController.java", source);
        let eps = endpoints(&found);
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].path, "/api/orders/{id}");
        assert_eq!(eps[0].component, "OrderController");
        assert!(!eps[0].authenticated);
        assert_eq!(eps[1].method, HttpMethod::Delete);
        assert_eq!(eps[1].roles, vec!["ADMIN".to_string()]);

        let service = found.iter().find_map(|c| match c {
            Candidate::Service(s) => Some(s),
            _ => None,
        });
        let service = service.unwrap();
        assert_eq!(service.stereotype, "controller");
        assert_eq!(service.operations, vec!["get".to_string(), "delete".to_string()]);
    }

    #[test]
    fn test_express_inline_routes_use_line_auth_only() {
        let source = "\
const router = express.Router();
router.get('/items', listItems);
router.post('/items/:id', authenticate, updateItem);
const total = cache.get('items');
";
        let found = scan_with(Framework::Express, RulePhase::Structure, Language::JavaScript, "routes/items.js", source);
        let eps = endpoints(&found);
        assert_eq!(eps.len(), 2);
        assert!(!eps[0].authenticated);
        assert_eq!(eps[0].handler.as_deref(), Some("listItems"));
        assert!(eps[1].authenticated);
        assert_eq!(eps[1].parameters[0].name, "id");
    }

    #[test]
    fn test_django_models_fields_and_relations() {
        let source = "\
from django.db import models

class Customer(models.Model):
    name = models.CharField(max_length=100)

class Order(models.Model):
    customer = models.ForeignKey('Customer', on_delete=models.CASCADE)
    total = models.DecimalField(max_digits=8, decimal_places=2)
";
        let found = scan_with(Framework::Django, RulePhase::Structure, Language::Python, "shop/models.py", source);
        let models: Vec<&ModelCandidate> = found
            .iter()
            .filter_map(|c| match c {
                Candidate::Model(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(models.len(), 2);
        assert_eq!(models[1].name, "Order");
        assert_eq!(models[1].fields.len(), 2);
        assert_eq!(models[1].relations, vec!["Customer".to_string()]);
    }

    #[test]
    fn test_stale_markers_are_dropped() {
        let source = "\
@app.route('/ghost')
x = compute()
def helper():
    pass
";
        let found = scan_with(Framework::Flask, RulePhase::Structure, Language::Python, "app.py", source);
        assert!(endpoints(&found).is_empty());
    }

    #[test]
    fn test_external_hosts_filter_placeholders() {
        let source = "\
API = 'https://api.stripe.com/v1'
DOCS = 'https://docs.example.com/x'
";
        let found = scan_with(Framework::Flask, RulePhase::Actors, Language::Python, "billing.py", source);
        let targets: Vec<&str> = found
            .iter()
            .filter_map(|c| match c {
                Candidate::ExternalSystem(e) => Some(e.target.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec!["api.stripe.com"]);
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths(&[Some("/api/"), None, Some("users/")]), "/api/users");
        assert_eq!(join_paths(&[None, Some("")]), "/");
        assert_eq!(join_paths(&[Some("~/v1"), Some("/x")]), "/v1/x");
    }

    #[test]
    fn test_role_lists() {
        assert_eq!(parse_role_list("'ADMIN', 'STAFF'"), vec!["ADMIN", "STAFF"]);
        assert_eq!(parse_role_list("{\"ROLE_A,ROLE_B\"}"), vec!["ROLE_A", "ROLE_B"]);
        assert_eq!(parse_role_list("Roles.MANAGER"), vec!["MANAGER"]);
    }

    #[test]
    fn test_python_params_skip_injected_arguments() {
        let params = parse_param_list("item_id: int, item: Item, q: Optional[str] = None, db: Session = Depends(get_db)");
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["item_id", "item", "q"]);
        assert_eq!(params[1].location, ParamLocation::Body);
        assert_eq!(params[2].location, ParamLocation::Query);
    }
}
