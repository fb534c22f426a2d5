//! Relationship Inference
//!
//! Deterministic heuristics run after each phase's merge. Every function here
//! reads the model in id order and writes through the public `DomainModel`
//! accessors, so the same input always yields the same entities regardless of
//! the order in which workers finished.

pub mod actors;
pub mod boundaries;
pub mod quality;
pub mod structure;
pub mod use_cases;

/// Normalize a role or identity string.
///
/// Trims, lowercases, collapses runs of `_`, `-` and whitespace into one
/// space, and strips a leading `role ` (so `ROLE_ADMIN` and `admin` meet).
pub fn normalize_identity(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.trim().chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.extend(c.to_lowercase());
    }
    match out.strip_prefix("role ") {
        Some(rest) => rest.to_string(),
        None => out,
    }
}

/// `order items` → `Order Items`.
pub fn title_case(s: &str) -> String {
    s.split(|c: char| c == ' ' || c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase alphanumeric words of a phrase.
pub(crate) fn words(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}
