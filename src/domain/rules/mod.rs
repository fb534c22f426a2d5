//! Extraction Rules
//!
//! Rules are data: every framework variant carries static tables of
//! [`RuleDescriptor`]s (pattern, action, capture mapping). The
//! [`ExtractorRegistry`] selects tables by (framework, phase), compiles them
//! into a [`RuleSet`], and accepts extra tables registered at startup.
//!
//! A [`RuleSet`] is the unit the worker pool applies to a file. Its name is
//! also the cache namespace, so results produced by one rule set are never
//! served to another. The name ends in a digest of every compiled rule, so
//! registering extra tables moves the set to a fresh namespace.

pub mod engine;
pub mod metrics;
pub mod syntax;
pub mod tables;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::extraction::{
    Candidate, ExtractionError, ExtractionResult, HttpMethod, ParamLocation,
};
use crate::domain::framework::Framework;
use crate::domain::language::Language;
use crate::domain::source::SourceFile;

/// Bumped whenever table semantics change; part of every cache namespace.
pub const RULES_VERSION: u32 = 1;

/// Hex chars of the rule digest kept in a rule set name.
const RULES_DIGEST_LEN: usize = 12;

// ═══════════════════════════════════════════════════════════════════════════
// Descriptors (static data)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RulePhase {
    Structure,
    Actors,
    Quality,
}

impl RulePhase {
    pub fn name(&self) -> &'static str {
        match self {
            RulePhase::Structure => "structure",
            RulePhase::Actors => "actors",
            RulePhase::Quality => "quality",
        }
    }
}

/// Where a route's HTTP method comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodSpec {
    Fixed(HttpMethod),
    /// Capture group holding one method or a list; empty if absent.
    Group(usize),
    /// Capture group, falling back to a default when absent.
    GroupOr(usize, HttpMethod),
    /// No method information; resolved at binding time.
    Unspecified,
}

/// How roles are read out of an auth marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSpec {
    None,
    /// A list such as `'ADMIN', 'STAFF'` or `{"ROLE_A", "ROLE_B"}`.
    List(usize),
    /// A Spring security expression (`hasRole('X') and ...`).
    Expression(usize),
    /// A Django REST framework permission-class list.
    PermissionClasses(usize),
    /// Keyed arguments (`Roles = "A,B"`, `Policy = "P"`) or a positional string.
    Keyed(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSpec {
    Fixed(ParamLocation),
    /// Group holding a marker such as `PathVariable` or `FromBody`.
    Group(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Model,
    Service(&'static str),
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Binds to the next declaration: an endpoint on a function, a path prefix on a class.
    RouteMarker { method: MethodSpec, path: Option<usize> },
    /// An endpoint declared in one statement (`router.get('/x', h)`, `path('x/', v)`).
    InlineRoute { method: MethodSpec, path: usize, handler: Option<usize> },
    /// A route plus a method-router expression (`get(list).post(create)`).
    MethodRouter { path: usize, routes: usize },
    /// Prefix for every route declared later in the file.
    FilePrefix { path: usize },
    /// Binds to the next declaration.
    AuthMarker { roles: RoleSpec },
    /// Applies to the enclosing class.
    ClassAuth { roles: RoleSpec },
    AllowAnonymous,
    /// Binds to the next class declaration.
    ComponentMarker { kind: ComponentKind },
    /// Declares a component on the spot.
    ComponentDecl { kind: ComponentKind, name: usize },
    /// A field of the model currently open.
    Field { name: usize, type_name: Option<usize> },
    /// Annotation attached to the next field of the open model.
    FieldAnnotation { name: usize },
    /// Relationship of the model currently open.
    Relation { target: usize },
    Param { name: usize, location: ParamSpec },
    /// A whole parameter list (Python signatures).
    ParamList { list: usize },
    RoleDeclaration { roles: RoleSpec },
    ExternalSystem { target: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct RuleDescriptor {
    pub id: &'static str,
    pub pattern: &'static str,
    pub action: RuleAction,
    /// Only apply to files whose relative path matches this pattern.
    pub path_hint: Option<&'static str>,
}

/// Extra whole-file passes that run before the line scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxPass {
    None,
    /// Parse with `syn` and read route attributes, model derives and services.
    RustItems,
}

#[derive(Debug, Clone, Copy)]
pub struct TableDescriptor {
    pub language: Language,
    pub groups: &'static [&'static [RuleDescriptor]],
    pub syntax: SyntaxPass,
}

// ═══════════════════════════════════════════════════════════════════════════
// Compiled form
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("rule `{id}` has an invalid pattern: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug)]
pub struct CompiledRule {
    pub id: &'static str,
    pub regex: Regex,
    pub action: RuleAction,
    pub path_hint: Option<Regex>,
}

#[derive(Debug)]
pub struct CompiledTable {
    pub language: Language,
    pub rules: Vec<CompiledRule>,
    pub syntax: SyntaxPass,
    pub class_decl: Regex,
    pub fn_decl: Regex,
}

fn compile(id: &str, pattern: &str) -> Result<Regex, RegistryError> {
    Regex::new(pattern).map_err(|source| RegistryError::InvalidPattern {
        id: id.to_string(),
        source,
    })
}

impl CompiledTable {
    fn empty(language: Language) -> Result<Self, RegistryError> {
        Ok(Self {
            language,
            rules: Vec::new(),
            syntax: SyntaxPass::None,
            class_decl: compile("class-decl", language.class_pattern())?,
            fn_decl: compile("fn-decl", language.function_pattern())?,
        })
    }

    fn extend(&mut self, descriptor: &TableDescriptor) -> Result<(), RegistryError> {
        for group in descriptor.groups {
            for rule in group.iter() {
                self.rules.push(CompiledRule {
                    id: rule.id,
                    regex: compile(rule.id, rule.pattern)?,
                    action: rule.action,
                    path_hint: rule.path_hint.map(|hint| compile(rule.id, hint)).transpose()?,
                });
            }
        }
        if descriptor.syntax != SyntaxPass::None {
            self.syntax = descriptor.syntax;
        }
        Ok(())
    }
}

/// Soft deadline checked cooperatively while scanning a file.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            expires: Instant::now() + limit,
            limit,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.expires
    }

    pub fn check(&self) -> Result<(), ExtractionError> {
        if self.expired() {
            Err(ExtractionError::Timeout {
                limit_ms: self.limit.as_millis() as u64,
            })
        } else {
            Ok(())
        }
    }
}

/// Compiled tables for one (framework, phase) pair.
#[derive(Debug)]
pub struct RuleSet {
    name: String,
    phase: RulePhase,
    framework: Framework,
    tables: BTreeMap<Language, CompiledTable>,
}

impl RuleSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> RulePhase {
        self.phase
    }

    pub fn framework(&self) -> Framework {
        self.framework
    }

    pub fn languages(&self) -> Vec<Language> {
        self.tables.keys().copied().collect()
    }

    pub fn applies_to(&self, file: &SourceFile) -> bool {
        self.tables.contains_key(&file.language)
    }

    pub fn rule_count(&self) -> usize {
        self.tables.values().map(|t| t.rules.len()).sum()
    }

    /// Apply the rules to one file's bytes.
    ///
    /// Structure extraction requires valid UTF-8; the actor and quality scans
    /// read lossily since they only look for markers and count lines.
    pub fn extract(
        &self,
        file: &SourceFile,
        bytes: &[u8],
        deadline: &Deadline,
    ) -> Result<ExtractionResult, ExtractionError> {
        let text = match self.phase {
            RulePhase::Structure => std::str::from_utf8(bytes)
                .map(std::borrow::Cow::Borrowed)
                .map_err(|e| ExtractionError::Encoding {
                    offset: e.valid_up_to(),
                })?,
            _ => String::from_utf8_lossy(bytes),
        };

        let mut result = ExtractionResult::new(file.relative.clone());
        let Some(table) = self.tables.get(&file.language) else {
            return Ok(result);
        };

        if self.phase == RulePhase::Quality {
            result
                .candidates
                .push(Candidate::Metrics(metrics::measure(&text, file.language)));
            deadline.check()?;
            return Ok(result);
        }

        if table.syntax == SyntaxPass::RustItems {
            result
                .candidates
                .extend(syntax::extract_rust_items(&text, file.stem())?);
        }
        result
            .candidates
            .extend(engine::scan(table, &file.relative, file.stem(), &text, deadline)?);
        result.candidates.sort_by_key(Candidate::first_line);
        deadline.check()?;
        Ok(result)
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} rules)", self.name, self.rule_count())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════

/// Maps (framework, phase) to the tables to apply.
#[derive(Debug, Clone, Default)]
pub struct ExtractorRegistry {
    tables: HashMap<(Framework, RulePhase), Vec<&'static [TableDescriptor]>>,
}

impl ExtractorRegistry {
    /// Registry holding the built-in tables for every framework.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        for framework in Framework::KNOWN.iter().copied().chain([Framework::Unknown]) {
            registry.register(framework, RulePhase::Structure, tables::structure_tables(framework));
            registry.register(framework, RulePhase::Actors, tables::actor_tables(framework));
        }
        registry
    }

    /// Add tables for a (framework, phase); later registrations append rules.
    pub fn register(
        &mut self,
        framework: Framework,
        phase: RulePhase,
        tables: &'static [TableDescriptor],
    ) {
        self.tables.entry((framework, phase)).or_default().push(tables);
    }

    /// Compile the rule set for a framework and phase.
    ///
    /// Quality uses no patterns: it covers every language regardless of
    /// framework.
    pub fn rule_set(&self, framework: Framework, phase: RulePhase) -> Result<RuleSet, RegistryError> {
        let mut tables: BTreeMap<Language, CompiledTable> = BTreeMap::new();

        if phase == RulePhase::Quality {
            for language in Language::ALL {
                tables.insert(language, CompiledTable::empty(language)?);
            }
            return Ok(RuleSet {
                name: format!("quality-v{}", RULES_VERSION),
                phase,
                framework,
                tables,
            });
        }

        for language in framework.languages() {
            tables.insert(*language, CompiledTable::empty(*language)?);
        }
        let mut hasher = Sha256::new();
        for group in self.tables.get(&(framework, phase)).into_iter().flatten() {
            for descriptor in group.iter() {
                if let Some(table) = tables.get_mut(&descriptor.language) {
                    table.extend(descriptor)?;
                    digest_descriptor(&mut hasher, descriptor);
                }
            }
        }
        let digest = format!("{:x}", hasher.finalize());

        Ok(RuleSet {
            name: format!(
                "{}-{}-v{}-{}",
                phase.name(),
                framework.name(),
                RULES_VERSION,
                &digest[..RULES_DIGEST_LEN]
            ),
            phase,
            framework,
            tables,
        })
    }
}

/// Feed everything that changes extraction output into the namespace digest.
fn digest_descriptor(hasher: &mut Sha256, descriptor: &TableDescriptor) {
    hasher.update(descriptor.language.name().as_bytes());
    hasher.update(format!("{:?}", descriptor.syntax).as_bytes());
    for rule in descriptor.groups.iter().flat_map(|group| group.iter()) {
        hasher.update([0u8]);
        hasher.update(rule.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(rule.pattern.as_bytes());
        hasher.update([0u8]);
        hasher.update(rule.path_hint.unwrap_or_default().as_bytes());
        hasher.update(format!("{:?}", rule.action).as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_table_compiles() {
        let registry = ExtractorRegistry::with_defaults();
        for framework in Framework::KNOWN.iter().copied().chain([Framework::Unknown]) {
            for phase in [RulePhase::Structure, RulePhase::Actors, RulePhase::Quality] {
                let set = registry.rule_set(framework, phase);
                assert!(set.is_ok(), "{framework} {phase:?}: {:?}", set.err());
            }
        }
    }

    #[test]
    fn test_rule_set_names_are_distinct_namespaces() {
        let registry = ExtractorRegistry::with_defaults();
        let flask = registry.rule_set(Framework::Flask, RulePhase::Structure).unwrap();
        let django = registry.rule_set(Framework::Django, RulePhase::Structure).unwrap();
        let actors = registry.rule_set(Framework::Flask, RulePhase::Actors).unwrap();
        assert_ne!(flask.name(), django.name());
        assert_ne!(flask.name(), actors.name());
        assert_eq!(flask.languages(), vec![Language::Python]);
    }

    #[test]
    fn test_registered_tables_extend_defaults() {
        const EXTRA_RULES: &[RuleDescriptor] = &[RuleDescriptor {
            id: "test.health",
            pattern: r"HEALTHCHECK\s+(\S+)",
            action: RuleAction::InlineRoute {
                method: MethodSpec::Fixed(HttpMethod::Get),
                path: 1,
                handler: None,
            },
            path_hint: None,
        }];
        const EXTRA: &[TableDescriptor] = &[TableDescriptor {
            language: Language::Python,
            groups: &[EXTRA_RULES],
            syntax: SyntaxPass::None,
        }];

        let mut registry = ExtractorRegistry::with_defaults();
        let before = registry.rule_set(Framework::Flask, RulePhase::Structure).unwrap().rule_count();
        registry.register(Framework::Flask, RulePhase::Structure, EXTRA);
        let after = registry.rule_set(Framework::Flask, RulePhase::Structure).unwrap().rule_count();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_registered_tables_change_namespace() {
        const EXTRA_RULES: &[RuleDescriptor] = &[RuleDescriptor {
            id: "test.ping",
            pattern: r"PING\s+(\S+)",
            action: RuleAction::InlineRoute {
                method: MethodSpec::Fixed(HttpMethod::Get),
                path: 1,
                handler: None,
            },
            path_hint: None,
        }];
        const EXTRA: &[TableDescriptor] = &[TableDescriptor {
            language: Language::Python,
            groups: &[EXTRA_RULES],
            syntax: SyntaxPass::None,
        }];
        // Java rules never reach a Flask set, so they leave its name alone.
        const UNUSED: &[TableDescriptor] = &[TableDescriptor {
            language: Language::Java,
            groups: &[EXTRA_RULES],
            syntax: SyntaxPass::None,
        }];

        let mut registry = ExtractorRegistry::with_defaults();
        let defaults = registry.rule_set(Framework::Flask, RulePhase::Structure).unwrap();
        assert!(defaults.name().starts_with(&format!("structure-flask-v{}-", RULES_VERSION)));
        assert_eq!(
            defaults.name(),
            ExtractorRegistry::with_defaults()
                .rule_set(Framework::Flask, RulePhase::Structure)
                .unwrap()
                .name()
        );

        registry.register(Framework::Flask, RulePhase::Structure, UNUSED);
        let unchanged = registry.rule_set(Framework::Flask, RulePhase::Structure).unwrap();
        assert_eq!(unchanged.name(), defaults.name());

        registry.register(Framework::Flask, RulePhase::Structure, EXTRA);
        let extended = registry.rule_set(Framework::Flask, RulePhase::Structure).unwrap();
        assert_ne!(extended.name(), defaults.name());
        let actors = registry.rule_set(Framework::Flask, RulePhase::Actors).unwrap();
        assert_eq!(
            actors.name(),
            ExtractorRegistry::with_defaults()
                .rule_set(Framework::Flask, RulePhase::Actors)
                .unwrap()
                .name()
        );
    }

    #[test]
    fn test_deadline_zero_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(matches!(deadline.check(), Err(ExtractionError::Timeout { limit_ms: 0 })));
    }
}
