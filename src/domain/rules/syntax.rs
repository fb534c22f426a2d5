//! Rust items via `syn`.
//!
//! Route attributes (`#[get("/x")]`), serde/ORM derives and `*Service`
//! structs carry enough structure that parsing beats pattern matching. A file
//! that does not parse is reported as a parse failure with the line `syn`
//! points at.

use std::collections::BTreeMap;

use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Attribute, Expr, Fields, FnArg, ImplItem, Item, Lit, Pat, Signature, Token, Type};

use super::engine::path_parameters;
use crate::domain::extraction::{
    Candidate, EndpointCandidate, ExtractionError, FieldCandidate, HttpMethod, LineRange,
    ModelCandidate, ParamLocation, Parameter, ServiceCandidate,
};

const ROUTE_ATTRS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options", "route"];
const ROLE_ATTRS: &[&str] = &[
    "protect", "has_roles", "has_any_role", "has_role", "has_permissions", "has_any_permission",
];
const AUTH_TYPES: &[&str] = &[
    "Auth", "AuthUser", "AuthenticatedUser", "Authenticated", "BearerAuth", "CurrentUser",
    "Identity", "JwtAuth",
];
const MODEL_DERIVES: &[&str] = &[
    "Serialize", "Deserialize", "Queryable", "Insertable", "Identifiable", "Selectable",
    "AsChangeset", "FromRow", "DeriveEntityModel",
];

pub(crate) fn extract_rust_items(text: &str, stem: &str) -> Result<Vec<Candidate>, ExtractionError> {
    let file = syn::parse_file(text).map_err(|e| ExtractionError::Parse {
        line: e.span().start().line,
        message: e.to_string(),
    })?;

    let mut collector = ItemCollector {
        stem,
        endpoints: Vec::new(),
        models: Vec::new(),
        services: BTreeMap::new(),
        methods: Vec::new(),
    };
    collector.items(&file.items);
    Ok(collector.finish())
}

struct ItemCollector<'a> {
    stem: &'a str,
    endpoints: Vec<EndpointCandidate>,
    models: Vec<ModelCandidate>,
    services: BTreeMap<String, ServiceCandidate>,
    /// (self type, method name, line) for every inherent method.
    methods: Vec<(String, String, usize)>,
}

impl<'a> ItemCollector<'a> {
    fn items(&mut self, items: &[Item]) {
        for item in items {
            match item {
                Item::Fn(func) => self.function(&func.attrs, &func.sig, None),
                Item::Struct(item) => {
                    let name = item.ident.to_string();
                    let line = item.ident.span().start().line;
                    let derives = derive_names(&item.attrs);
                    if derives.iter().any(|d| MODEL_DERIVES.contains(&d.as_str())) {
                        self.models.push(ModelCandidate {
                            name: name.clone(),
                            fields: struct_fields(&item.fields),
                            relations: Vec::new(),
                            lines: LineRange::line(line),
                        });
                    }
                    if let Some(stereotype) = service_stereotype(&name) {
                        self.services.insert(
                            name.clone(),
                            ServiceCandidate {
                                name,
                                stereotype: stereotype.to_string(),
                                operations: Vec::new(),
                                lines: LineRange::line(line),
                            },
                        );
                    }
                }
                Item::Impl(block) => {
                    let Some(owner) = type_name(&block.self_ty) else { continue };
                    for impl_item in &block.items {
                        if let ImplItem::Fn(method) = impl_item {
                            let line = method.sig.ident.span().start().line;
                            self.methods.push((owner.clone(), method.sig.ident.to_string(), line));
                            self.function(&method.attrs, &method.sig, Some(owner.as_str()));
                        }
                    }
                }
                Item::Mod(module) => {
                    if let Some((_, items)) = &module.content {
                        self.items(items);
                    }
                }
                _ => {}
            }
        }
    }

    fn function(&mut self, attrs: &[Attribute], sig: &Signature, owner: Option<&str>) {
        let mut routes: Vec<(HttpMethod, String)> = Vec::new();
        let mut roles: Vec<String> = Vec::new();
        let mut protected = false;
        let mut start = sig.ident.span().start().line;

        for attr in attrs {
            let Some(name) = attr.path().segments.last().map(|s| s.ident.to_string()) else {
                continue;
            };
            if ROUTE_ATTRS.contains(&name.as_str()) {
                if let Some((path, methods)) = route_args(attr, &name) {
                    start = start.min(attr.span().start().line);
                    routes.extend(methods.into_iter().map(|m| (m, path.clone())));
                }
            } else if ROLE_ATTRS.contains(&name.as_str()) {
                protected = true;
                roles.extend(string_args(attr));
            }
        }
        if routes.is_empty() {
            return;
        }

        let mut extra = Vec::new();
        for input in &sig.inputs {
            let FnArg::Typed(arg) = input else { continue };
            let tokens = type_tokens(&arg.ty);
            if tokens.iter().any(|t| AUTH_TYPES.contains(&t.as_str()) || t.ends_with("Claims")) {
                protected = true;
            }
            let location = tokens.iter().find_map(|t| match t.as_str() {
                "Json" | "Form" => Some(ParamLocation::Body),
                "Query" => Some(ParamLocation::Query),
                _ => None,
            });
            if let (Some(location), Some(name)) = (location, binding_name(&arg.pat)) {
                extra.push(Parameter { name, location });
            }
        }

        let end = sig.ident.span().start().line;
        let component = owner.unwrap_or(self.stem).to_string();
        for (method, path) in routes {
            let mut parameters = path_parameters(&path);
            parameters.extend(extra.iter().cloned());
            self.endpoints.push(EndpointCandidate {
                method,
                path,
                component: component.clone(),
                handler: Some(sig.ident.to_string()),
                authenticated: protected,
                roles: roles.clone(),
                parameters,
                lines: LineRange::span(start, end),
            });
        }
    }

    fn finish(mut self) -> Vec<Candidate> {
        for (owner, method, line) in std::mem::take(&mut self.methods) {
            if let Some(service) = self.services.get_mut(&owner) {
                if !service.operations.contains(&method) {
                    service.operations.push(method);
                }
                service.lines.end = service.lines.end.max(line);
            }
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        candidates.extend(self.endpoints.into_iter().map(Candidate::Endpoint));
        candidates.extend(self.models.into_iter().map(Candidate::Model));
        candidates.extend(self.services.into_values().map(Candidate::Service));
        candidates
    }
}

/// Path and methods of `#[get("/x")]` or `#[route("/x", method = "GET")]`.
fn route_args(attr: &Attribute, name: &str) -> Option<(String, Vec<HttpMethod>)> {
    let args = attr
        .parse_args_with(Punctuated::<Expr, Token![,]>::parse_terminated)
        .ok()?;
    let mut path = None;
    let mut methods = Vec::new();
    for arg in args {
        match arg {
            Expr::Lit(lit) => {
                if let Lit::Str(s) = lit.lit {
                    path.get_or_insert(s.value());
                }
            }
            Expr::Assign(assign) => {
                let key = assign.left.to_token_stream().to_string();
                if key == "method" {
                    if let Expr::Lit(lit) = *assign.right {
                        if let Lit::Str(s) = lit.lit {
                            methods.extend(HttpMethod::parse(&s.value()));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    if name != "route" {
        methods = HttpMethod::parse(name).into_iter().collect();
    } else if methods.is_empty() {
        methods.push(HttpMethod::Any);
    }
    Some((path?, methods))
}

fn string_args(attr: &Attribute) -> Vec<String> {
    attr.parse_args_with(Punctuated::<Expr, Token![,]>::parse_terminated)
        .map(|args| {
            args.into_iter()
                .filter_map(|arg| match arg {
                    Expr::Lit(lit) => match lit.lit {
                        Lit::Str(s) => Some(s.value()),
                        _ => None,
                    },
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn derive_names(attrs: &[Attribute]) -> Vec<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("derive"))
        .filter_map(|attr| {
            attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
                .ok()
        })
        .flat_map(|paths| {
            paths
                .into_iter()
                .filter_map(|p| p.segments.last().map(|s| s.ident.to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn struct_fields(fields: &Fields) -> Vec<FieldCandidate> {
    let Fields::Named(named) = fields else {
        return Vec::new();
    };
    named
        .named
        .iter()
        .filter_map(|field| {
            let name = field.ident.as_ref()?.to_string();
            let annotations = field
                .attrs
                .iter()
                .filter_map(|a| a.path().segments.last().map(|s| s.ident.to_string()))
                .collect();
            Some(FieldCandidate {
                name,
                type_name: field.ty.to_token_stream().to_string().replace(' ', ""),
                annotations,
            })
        })
        .collect()
}

fn service_stereotype(name: &str) -> Option<&'static str> {
    if name.ends_with("Repository") || name.ends_with("Repo") {
        Some("repository")
    } else if name.ends_with("Service") {
        Some("service")
    } else {
        None
    }
}

fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn type_tokens(ty: &Type) -> Vec<String> {
    ty.to_token_stream()
        .to_string()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// `body` in `body: Json<T>`, `payload` in `Json(payload): Json<T>`.
fn binding_name(pat: &Pat) -> Option<String> {
    match pat {
        Pat::Ident(ident) => Some(ident.ident.to_string()),
        Pat::TupleStruct(tuple) => tuple.elems.iter().find_map(binding_name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_actix_route_attributes() {
        let source = r#"
use actix_web::{get, post, web, HttpResponse};

#[get("/users/{id}")]
async fn get_user(path: web::Path<u32>) -> HttpResponse {
    HttpResponse::Ok().finish()
}

#[post("/users")]
#[has_roles("ADMIN")]
async fn create_user(body: web::Json<NewUser>) -> HttpResponse {
    HttpResponse::Created().finish()
}

#[route("/health", method = "GET", method = "HEAD")]
async fn health() -> &'static str { "ok" }
"#;
        let found = extract_rust_items(source, "users").unwrap();
        let eps = endpoints(&found);
        assert_eq!(eps.len(), 4);
        assert_eq!(eps[0].path, "/users/{id}");
        assert_eq!(eps[0].parameters[0].name, "id");
        assert!(!eps[0].authenticated);
        assert_eq!(eps[1].method, HttpMethod::Post);
        assert!(eps[1].authenticated);
        assert_eq!(eps[1].roles, vec!["ADMIN".to_string()]);
        assert_eq!(eps[1].parameters[0].location, ParamLocation::Body);
        assert_eq!(eps[1].lines.start, 9);
        assert_eq!(eps[2].method, HttpMethod::Get);
        assert_eq!(eps[3].method, HttpMethod::Head);
    }

    #[test]
    fn test_stacked_route_attributes() {
        let source = r#"
#[get("/a")]
#[get("/b")]
async fn both() -> HttpResponse {
    HttpResponse::Ok().finish()
}
"#;
        let found = extract_rust_items(source, "routes").unwrap();
        let eps = endpoints(&found);
        let paths: Vec<&str> = eps.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b"]);
        assert_eq!(eps[0].lines.start, 2);
        assert_eq!(eps[1].lines.start, 2);
    }

    #[test]
    fn test_models_and_services() {
        let source = r#"
#[derive(Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer: Option<Customer>,
}

pub struct OrderService;

impl OrderService {
    pub fn place(&self) {}
    pub fn cancel(&self) {}
}
"#;
        let found = extract_rust_items(source, "orders").unwrap();
        let model = found
            .iter()
            .find_map(|c| match c {
                Candidate::Model(m) => Some(m),
                _ => None,
            })
            .unwrap();
        assert_eq!(model.fields.len(), 2);
        assert_eq!(model.fields[1].type_name, "Option<Customer>");

        let service = found
            .iter()
            .find_map(|c| match c {
                Candidate::Service(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(service.operations, vec!["place".to_string(), "cancel".to_string()]);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = extract_rust_items("fn ok() {}\nfn broken(x: ) {}\n", "broken").unwrap_err();
        assert!(matches!(err, ExtractionError::Parse { .. }));
    }
}
