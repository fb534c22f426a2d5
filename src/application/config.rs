//! Run configuration.
//!
//! `archlens.toml` (or any TOML document) deserializes into [`RawConfig`],
//! which is validated into [`AnalysisConfig`]. Every check happens here, so
//! an invalid configuration is rejected before the repository is touched.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::application::phase::Phase;
use crate::domain::framework::Framework;

pub const CONFIG_FILE_NAME: &str = "archlens.toml";
pub const DEFAULT_FILE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SAMPLE_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_workers must be at least 1 (got {0})")]
    InvalidWorkerCount(i64),
    #[error("unknown phase `{0}` (expected structure, actors, boundaries, use-cases or quality)")]
    UnknownPhase(String),
    #[error("unknown framework `{0}`")]
    UnknownFramework(String),
    #[error("file_timeout_ms must be at least 1 (got {0})")]
    InvalidTimeout(i64),
    #[error("sample_limit must be at least 1 (got {0})")]
    InvalidSampleLimit(i64),
    #[error("max_entities must not be negative (got {0})")]
    InvalidCapacity(i64),
    #[error("repository root {0} is not a directory")]
    InvalidRoot(PathBuf),
    #[error("invalid configuration syntax: {0}")]
    Syntax(#[from] toml::de::Error),
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration as written by the user. Integers are signed so negative
/// values reach validation instead of failing as type errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub incremental: Option<bool>,
    pub parallel: Option<bool>,
    pub max_workers: Option<i64>,
    /// `auto` or a framework name.
    pub framework: Option<String>,
    pub disabled_phases: Vec<String>,
    pub file_timeout_ms: Option<i64>,
    pub cache_dir: Option<PathBuf>,
    pub max_entities: Option<i64>,
    pub sample_limit: Option<i64>,
}

impl RawConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(self) -> Result<AnalysisConfig, ConfigError> {
        let max_workers = match self.max_workers {
            Some(n) if n < 1 => return Err(ConfigError::InvalidWorkerCount(n)),
            Some(n) => Some(n as usize),
            None => None,
        };

        let framework = match self.framework.as_deref().map(str::trim) {
            None | Some("") => FrameworkChoice::Auto,
            Some(name) if name.eq_ignore_ascii_case("auto") => FrameworkChoice::Auto,
            Some(name) => FrameworkChoice::Fixed(
                Framework::from_name(name).ok_or_else(|| ConfigError::UnknownFramework(name.to_string()))?,
            ),
        };

        let disabled_phases = self
            .disabled_phases
            .iter()
            .map(|name| Phase::from_name(name).ok_or_else(|| ConfigError::UnknownPhase(name.clone())))
            .collect::<Result<BTreeSet<Phase>, _>>()?;

        let file_timeout = match self.file_timeout_ms {
            Some(ms) if ms < 1 => return Err(ConfigError::InvalidTimeout(ms)),
            Some(ms) => Duration::from_millis(ms as u64),
            None => Duration::from_millis(DEFAULT_FILE_TIMEOUT_MS),
        };

        let sample_limit = match self.sample_limit {
            Some(n) if n < 1 => return Err(ConfigError::InvalidSampleLimit(n)),
            Some(n) => n as usize,
            None => DEFAULT_SAMPLE_LIMIT,
        };

        let max_entities = match self.max_entities {
            Some(n) if n < 0 => return Err(ConfigError::InvalidCapacity(n)),
            Some(n) => Some(n as usize),
            None => None,
        };

        Ok(AnalysisConfig {
            incremental: self.incremental.unwrap_or(true),
            parallel: self.parallel.unwrap_or(true),
            max_workers,
            framework,
            disabled_phases,
            file_timeout,
            cache_dir: self.cache_dir,
            max_entities,
            sample_limit,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameworkChoice {
    Auto,
    Fixed(Framework),
}

/// Validated configuration for one [`AnalysisRun`](crate::application::AnalysisRun).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Reuse the on-disk cache across runs.
    pub incremental: bool,
    pub parallel: bool,
    /// `None` means one worker per core.
    pub max_workers: Option<usize>,
    pub framework: FrameworkChoice,
    pub disabled_phases: BTreeSet<Phase>,
    /// Soft per-file extraction timeout.
    pub file_timeout: Duration,
    pub cache_dir: Option<PathBuf>,
    /// Upper bound on entities in the model; exceeding it fails the phase.
    pub max_entities: Option<usize>,
    pub sample_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            incremental: true,
            parallel: true,
            max_workers: None,
            framework: FrameworkChoice::Auto,
            disabled_phases: BTreeSet::new(),
            file_timeout: Duration::from_millis(DEFAULT_FILE_TIMEOUT_MS),
            cache_dir: None,
            max_entities: None,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }
}

impl AnalysisConfig {
    /// Load `<root>/archlens.toml` if present, defaults otherwise.
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            debug!("Loading configuration from {}", path.display());
            RawConfig::from_file(&path)?.validate()
        } else {
            Ok(Self::default())
        }
    }

    /// Re-check values set programmatically.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == Some(0) {
            return Err(ConfigError::InvalidWorkerCount(0));
        }
        if self.file_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(0));
        }
        if self.sample_limit == 0 {
            return Err(ConfigError::InvalidSampleLimit(0));
        }
        Ok(())
    }

    pub fn is_enabled(&self, phase: Phase) -> bool {
        !self.disabled_phases.contains(&phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = RawConfig::from_toml_str("").unwrap().validate().unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert!(config.incremental);
        assert!(config.parallel);
    }

    #[test]
    fn test_full_document() {
        let config = RawConfig::from_toml_str(
            r#"
            incremental = false
            parallel = true
            max_workers = 3
            framework = "Django"
            disabled_phases = ["use_cases", "Quality"]
            file_timeout_ms = 250
            max_entities = 10000
            sample_limit = 50
            "#,
        )
        .unwrap()
        .validate()
        .unwrap();
        assert!(!config.incremental);
        assert_eq!(config.max_workers, Some(3));
        assert_eq!(config.framework, FrameworkChoice::Fixed(Framework::Django));
        assert!(!config.is_enabled(Phase::UseCases));
        assert!(!config.is_enabled(Phase::Quality));
        assert!(config.is_enabled(Phase::Actors));
        assert_eq!(config.file_timeout, Duration::from_millis(250));
        assert_eq!(config.sample_limit, 50);
    }

    #[test]
    fn test_rejections() {
        let bad = |doc: &str| RawConfig::from_toml_str(doc).and_then(RawConfig::validate);
        assert!(matches!(bad("max_workers = -2"), Err(ConfigError::InvalidWorkerCount(-2))));
        assert!(matches!(bad("max_workers = 0"), Err(ConfigError::InvalidWorkerCount(0))));
        assert!(matches!(bad("disabled_phases = [\"render\"]"), Err(ConfigError::UnknownPhase(_))));
        assert!(matches!(bad("framework = \"rails\""), Err(ConfigError::UnknownFramework(_))));
        assert!(matches!(bad("file_timeout_ms = 0"), Err(ConfigError::InvalidTimeout(0))));
        assert!(matches!(bad("sample_limit = 0"), Err(ConfigError::InvalidSampleLimit(0))));
        assert!(matches!(bad("max_workers = "), Err(ConfigError::Syntax(_))));
        assert!(matches!(bad("colour = true"), Err(ConfigError::Syntax(_))));
    }

    #[test]
    fn test_discover_reads_repository_file() {
        let dir = tempdir().unwrap();
        assert_eq!(AnalysisConfig::discover(dir.path()).unwrap(), AnalysisConfig::default());

        fs::write(dir.path().join(CONFIG_FILE_NAME), "parallel = false\n").unwrap();
        let config = AnalysisConfig::discover(dir.path()).unwrap();
        assert!(!config.parallel);
    }
}
