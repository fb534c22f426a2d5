// Main library entry point for archlens.

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use application::{AnalysisConfig, AnalysisRun, RunReport};
pub use domain::model::DomainModel;
