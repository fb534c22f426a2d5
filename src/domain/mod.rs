// Domain types, extraction rules, inference and the extraction cache.

pub mod extraction;
pub mod framework;
pub mod inference;
pub mod language;
pub mod model;
pub mod rules;
pub mod source;
pub mod store;
