//! Phase Orchestrator
//!
//! An [`AnalysisRun`] owns the domain model for one invocation. It discovers
//! the repository, detects the framework, then walks the phases in order.
//! Each phase works on a staged copy of the model: worker outcomes are merged
//! into it on this thread as they arrive, phase inference runs on it, and
//! only then does it replace the committed model. A phase that fails leaves
//! the committed model exactly as the previous phase left it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::config::{AnalysisConfig, ConfigError, FrameworkChoice};
use crate::application::phase::{Phase, PhaseReport, PhaseStatus, RunState};
use crate::application::progress::{PhaseProgress, ProgressHandle};
use crate::domain::extraction::{Candidate, ExtractionError, ExtractionResult};
use crate::domain::framework::{Detection, Framework, FrameworkDetector};
use crate::domain::inference::quality::FailedFile;
use crate::domain::inference::structure::StructureMerge;
use crate::domain::inference::{actors, boundaries, quality, use_cases};
use crate::domain::language::Language;
use crate::domain::model::{DomainModel, FileQuality, ModelError, ProjectInfo};
use crate::domain::rules::{ExtractorRegistry, RegistryError, RulePhase, RuleSet};
use crate::domain::source::{normalize_path, FileInventory, SourceFile};
use crate::domain::store::CacheStore;
use crate::infrastructure::cache::{CacheDb, CacheLocation};
use crate::infrastructure::concurrency::{CancellationToken, FileOutcome, PoolStats, WorkerPool};
use crate::infrastructure::project_loader::ProjectLoader;
use crate::ports::PhaseObserver;

/// A file that could not be extracted. Recorded once per file, for the first
/// phase that failed on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: String,
    pub phase: Phase,
    pub error: ExtractionError,
}

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("{phase} phase would grow the model to {attempted} entities (limit {limit})")]
    CapacityExceeded {
        phase: Phase,
        limit: usize,
        attempted: usize,
    },
    #[error("{phase} phase could not update the model: {source}")]
    Model {
        phase: Phase,
        #[source]
        source: ModelError,
    },
    #[error("run cancelled")]
    Cancelled,
    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),
    #[error("repository discovery failed: {0}")]
    Discovery(String),
    #[error(transparent)]
    Rules(#[from] RegistryError),
}

/// Everything a run produced. The model is always present, even when the run
/// failed part way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    pub model: DomainModel,
    pub errors: Vec<FileError>,
    pub phases: Vec<PhaseReport>,
    pub detection: Option<Detection>,
    pub failure: Option<String>,
    pub complete: bool,
}

impl RunReport {
    /// Cache hits and misses summed over every phase.
    pub fn totals(&self) -> PoolStats {
        self.phases.iter().fold(PoolStats::default(), |mut acc, p| {
            acc.dispatched += p.stats.dispatched;
            acc.cache_hits += p.stats.cache_hits;
            acc.cache_misses += p.stats.cache_misses;
            acc.failed += p.stats.failed;
            acc.skipped += p.stats.skipped;
            acc
        })
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// Shared, read-only inputs of every phase.
struct PhaseInputs<'a> {
    inventory: &'a FileInventory,
    detection: &'a Detection,
    pool: &'a WorkerPool,
    cache: &'a CacheDb,
}

/// What a successful phase hands back for commit.
struct StagedPhase {
    model: DomainModel,
    stats: PoolStats,
    entities_added: usize,
}

pub struct AnalysisRun {
    root: PathBuf,
    config: AnalysisConfig,
    registry: ExtractorRegistry,
    cancel: CancellationToken,
    progress: ProgressHandle,
    observer: Option<Box<dyn PhaseObserver>>,
    model: DomainModel,
    errors: Vec<FileError>,
    failed_paths: BTreeSet<String>,
    phases: Vec<PhaseReport>,
    state: RunState,
}

impl AnalysisRun {
    /// Validate the configuration and root. Nothing is read or written yet.
    pub fn new(root: impl AsRef<Path>, config: AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ConfigError::InvalidRoot(root));
        }
        Ok(Self {
            root,
            config,
            registry: ExtractorRegistry::with_defaults(),
            cancel: CancellationToken::new(),
            progress: ProgressHandle::default(),
            observer: None,
            model: DomainModel::new(),
            errors: Vec::new(),
            failed_paths: BTreeSet::new(),
            phases: Vec::new(),
            state: RunState::NotStarted,
        })
    }

    /// Replace the built-in rule tables (e.g. with extra registrations).
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn PhaseObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Use an externally owned token, e.g. one wired to Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════════

    pub fn execute(mut self) -> RunReport {
        let started = Instant::now();
        info!("Analyzing {}", self.root.display());

        let pool = match WorkerPool::new(
            self.config.parallel,
            self.config.max_workers,
            self.config.file_timeout,
        ) {
            Ok(pool) => pool,
            Err(e) => return self.abort(PhaseError::WorkerPool(format!("{:#}", e)), None),
        };

        let inventory = match ProjectLoader::discover(&self.root, pool.thread_pool()) {
            Ok(inventory) => inventory,
            Err(e) => return self.abort(PhaseError::Discovery(format!("{:#}", e)), None),
        };

        let detection = match self.config.framework {
            FrameworkChoice::Fixed(framework) => {
                info!("Using configured framework {}", framework);
                Detection::forced(framework)
            }
            FrameworkChoice::Auto => FrameworkDetector::new(self.config.sample_limit).detect(&inventory),
        };

        let cache = if self.config.incremental {
            let location = CacheLocation::for_repository(&inventory.root, self.config.cache_dir.as_deref());
            CacheDb::open_or_memory(&location)
        } else {
            CacheDb::in_memory()
        };

        let mut languages: BTreeMap<Language, usize> = BTreeMap::new();
        for file in &inventory.sources {
            *languages.entry(file.language).or_insert(0) += 1;
        }
        self.model.set_project(ProjectInfo {
            root: normalize_path(&inventory.root),
            framework: detection.framework,
            confidence: detection.confidence,
            scores: detection.scores.clone(),
            inventory_files: inventory.total_files(),
            source_files: inventory.sources.len(),
            analyzed_files: 0,
            failed_files: 0,
            languages,
            complete: false,
        });

        let inputs = PhaseInputs {
            inventory: &inventory,
            detection: &detection,
            pool: &pool,
            cache: &cache,
        };

        let mut failure = None;
        for phase in Phase::ALL {
            if self.cancel.is_cancelled() {
                failure = Some(PhaseError::Cancelled);
                break;
            }
            if !self.config.is_enabled(phase) {
                info!("Phase {} disabled, skipping", phase);
                self.phases.push(PhaseReport::skipped(phase));
                self.progress.finish_phase(
                    phase,
                    PhaseProgress {
                        status: PhaseStatus::Skipped,
                        stats: PoolStats::default(),
                        counts: self.model.counts(),
                    },
                );
                continue;
            }

            self.state = RunState::running(phase);
            let phase_started = Instant::now();
            info!("Phase {} started", phase);

            match self.run_phase(phase, &inputs) {
                Ok(staged) => {
                    self.model = staged.model;
                    let report = PhaseReport {
                        phase,
                        status: PhaseStatus::Completed,
                        stats: staged.stats,
                        entities_added: staged.entities_added,
                        duration_ms: phase_started.elapsed().as_millis() as u64,
                    };
                    info!(
                        "Phase {} committed: {} entities added, {} cache hits, {} extracted, {} failed",
                        phase,
                        report.entities_added,
                        report.stats.cache_hits,
                        report.stats.cache_misses,
                        report.stats.failed
                    );
                    self.progress.finish_phase(
                        phase,
                        PhaseProgress {
                            status: PhaseStatus::Completed,
                            stats: report.stats,
                            counts: self.model.counts(),
                        },
                    );
                    self.phases.push(report);
                    if let Some(observer) = self.observer.as_mut() {
                        observer.phase_committed(phase, &self.model);
                    }
                }
                Err((e, stats)) => {
                    self.phases.push(PhaseReport {
                        phase,
                        status: PhaseStatus::Failed,
                        stats,
                        entities_added: 0,
                        duration_ms: phase_started.elapsed().as_millis() as u64,
                    });
                    self.progress.finish_phase(
                        phase,
                        PhaseProgress {
                            status: PhaseStatus::Failed,
                            stats,
                            counts: self.model.counts(),
                        },
                    );
                    failure = Some(e);
                    break;
                }
            }
        }

        self.prune_cache(&cache, &inventory, detection.framework);
        cache.flush();
        let report = match failure {
            Some(e) => self.abort(e, Some(detection)),
            None => {
                self.state = RunState::Done;
                self.finish(Some(detection), None)
            }
        };
        info!(
            "Run finished in {} ms: {:?}, {} entities, {} file errors",
            started.elapsed().as_millis(),
            report.state,
            report.model.counts().total(),
            report.errors.len()
        );
        report
    }

    /// Forget files that left the repository and namespaces no current rule
    /// set writes to, so the on-disk cache tracks the repository.
    fn prune_cache(&self, cache: &CacheDb, inventory: &FileInventory, framework: Framework) {
        if !cache.is_persistent() {
            return;
        }
        let mut namespaces = Vec::new();
        for phase in [RulePhase::Structure, RulePhase::Actors, RulePhase::Quality] {
            match self.registry.rule_set(framework, phase) {
                Ok(rules) => namespaces.push(rules.name().to_string()),
                Err(e) => {
                    debug!("Keeping cache as is, rule set unavailable: {}", e);
                    return;
                }
            }
        }

        let live: HashSet<String> = inventory.sources.iter().map(SourceFile::cache_key).collect();
        let dropped = cache.retain_namespaces(&namespaces);
        let removed: usize = namespaces
            .iter()
            .map(|namespace| cache.store(namespace).retain_keys(&live))
            .sum();
        if dropped > 0 || removed > 0 {
            info!(
                "Pruned cache: {} stale namespaces, {} records of departed files",
                dropped, removed
            );
        }
    }

    fn abort(mut self, e: PhaseError, detection: Option<Detection>) -> RunReport {
        match &e {
            PhaseError::Cancelled => warn!("Run cancelled; keeping results of completed phases"),
            other => error!("Run failed: {}", other),
        }
        self.state = RunState::Failed;
        self.finish(detection, Some(e.to_string()))
    }

    fn finish(mut self, detection: Option<Detection>, failure: Option<String>) -> RunReport {
        self.progress.set_state(self.state);
        self.errors.sort_by(|a, b| a.path.cmp(&b.path));
        let complete = self.state == RunState::Done;

        let project = self.model.project_mut();
        project.failed_files = self.failed_paths.len();
        project.analyzed_files = project.source_files.saturating_sub(project.failed_files);
        project.complete = complete;

        RunReport {
            state: self.state,
            model: self.model,
            errors: self.errors,
            phases: self.phases,
            detection,
            failure,
            complete,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Phases
    // ═══════════════════════════════════════════════════════════════════════

    fn run_phase(
        &mut self,
        phase: Phase,
        inputs: &PhaseInputs<'_>,
    ) -> Result<StagedPhase, (PhaseError, PoolStats)> {
        let mut staged = self.model.clone();
        let before = staged.counts().total();

        let stats = match phase {
            Phase::Structure => self.structure_phase(&mut staged, inputs)?,
            Phase::Actors => self.actors_phase(&mut staged, inputs)?,
            Phase::Boundaries => {
                boundaries::infer(&mut staged).map_err(|e| model_error(phase, e))?;
                PoolStats::default()
            }
            Phase::UseCases => {
                use_cases::infer(&mut staged).map_err(|e| model_error(phase, e))?;
                PoolStats::default()
            }
            Phase::Quality => self.quality_phase(&mut staged, inputs)?,
        };

        self.check_capacity(phase, &staged).map_err(|e| (e, stats))?;
        let entities_added = staged.counts().total().saturating_sub(before);
        Ok(StagedPhase {
            model: staged,
            stats,
            entities_added,
        })
    }

    fn structure_phase(
        &mut self,
        staged: &mut DomainModel,
        inputs: &PhaseInputs<'_>,
    ) -> Result<PoolStats, (PhaseError, PoolStats)> {
        let phase = Phase::Structure;
        let rules = self
            .registry
            .rule_set(inputs.detection.framework, RulePhase::Structure)
            .map_err(|e| (PhaseError::from(e), PoolStats::default()))?;
        let files: Vec<SourceFile> = inputs
            .inventory
            .sources
            .iter()
            .filter(|f| rules.applies_to(f))
            .cloned()
            .collect();
        info!("Structure phase: {} on {} files", rules, files.len());

        let store = inputs.cache.store(rules.name());
        let mut merge = StructureMerge::new();
        let mut merge_error: Option<PhaseError> = None;

        let stats = self.dispatch(phase, &files, inputs, &rules, store.as_ref(), |run, result| {
            if merge_error.is_some() {
                return;
            }
            match merge.merge(staged, &result) {
                Ok(_) => {
                    if let Err(e) = run.check_capacity(phase, staged) {
                        merge_error = Some(e);
                    }
                }
                Err(e) => merge_error = Some(model_error(phase, e).0),
            }
        });

        if let Some(e) = merge_error {
            return Err((e, stats));
        }
        self.ensure_not_cancelled(&stats)?;
        merge.finish(staged).map_err(|e| (model_error(phase, e).0, stats))?;
        Ok(stats)
    }

    fn actors_phase(
        &mut self,
        staged: &mut DomainModel,
        inputs: &PhaseInputs<'_>,
    ) -> Result<PoolStats, (PhaseError, PoolStats)> {
        let phase = Phase::Actors;
        let rules = self
            .registry
            .rule_set(inputs.detection.framework, RulePhase::Actors)
            .map_err(|e| (PhaseError::from(e), PoolStats::default()))?;
        let files: Vec<SourceFile> = inputs
            .inventory
            .sources
            .iter()
            .filter(|f| rules.applies_to(f))
            .cloned()
            .collect();
        info!("Actors phase: {} on {} files", rules, files.len());

        let store = inputs.cache.store(rules.name());
        let mut scans: Vec<ExtractionResult> = Vec::new();
        let stats = self.dispatch(phase, &files, inputs, &rules, store.as_ref(), |_, result| {
            if !result.is_empty() {
                scans.push(result);
            }
        });
        self.ensure_not_cancelled(&stats)?;

        scans.sort_by(|a, b| a.file.cmp(&b.file));
        actors::infer(staged, &scans).map_err(|e| (model_error(phase, e).0, stats))?;
        Ok(stats)
    }

    fn quality_phase(
        &mut self,
        staged: &mut DomainModel,
        inputs: &PhaseInputs<'_>,
    ) -> Result<PoolStats, (PhaseError, PoolStats)> {
        let phase = Phase::Quality;
        let rules = self
            .registry
            .rule_set(inputs.detection.framework, RulePhase::Quality)
            .map_err(|e| (PhaseError::from(e), PoolStats::default()))?;
        let files: Vec<SourceFile> = inputs.inventory.sources.clone();
        let languages: BTreeMap<&str, Language> =
            files.iter().map(|f| (f.relative.as_str(), f.language)).collect();
        info!("Quality phase: metrics for {} files", files.len());

        let store = inputs.cache.store(rules.name());
        let mut measured: Vec<FileQuality> = Vec::new();
        let stats = self.dispatch(phase, &files, inputs, &rules, store.as_ref(), |_, result| {
            let language = languages.get(result.file.as_str()).copied();
            for candidate in result.candidates {
                if let (Candidate::Metrics(metrics), Some(language)) = (candidate, language) {
                    measured.push(FileQuality {
                        file: result.file.clone(),
                        language,
                        metrics,
                    });
                }
            }
        });
        self.ensure_not_cancelled(&stats)?;

        let failures: Vec<FailedFile<'_>> = self
            .errors
            .iter()
            .map(|e| FailedFile {
                file: &e.path,
                phase: e.phase.name(),
                reason: e.error.to_string(),
            })
            .collect();
        let use_cases_ran = self
            .phases
            .iter()
            .any(|p| p.phase == Phase::UseCases && p.status == PhaseStatus::Completed);
        let report = quality::build_report(staged, measured, &failures, use_cases_ran);
        debug!("Quality report: {} findings", report.findings.len());
        staged.set_quality(report);
        Ok(stats)
    }

    /// Run the pool over `files`, recording file errors and progress, and
    /// hand every successful result to `merge` on this thread.
    fn dispatch<F>(
        &mut self,
        phase: Phase,
        files: &[SourceFile],
        inputs: &PhaseInputs<'_>,
        rules: &RuleSet,
        store: &dyn CacheStore,
        mut merge: F,
    ) -> PoolStats
    where
        F: FnMut(&Self, ExtractionResult),
    {
        self.progress.begin_phase(phase, files.len());
        let cancel = self.cancel.clone();
        let mut failures: Vec<FileError> = Vec::new();

        let stats = inputs.pool.run_extraction(files, rules, store, &cancel, |outcome: FileOutcome| {
            self.progress.file_done();
            match outcome.result {
                Ok(result) => merge(&*self, result),
                Err(error) => failures.push(FileError {
                    path: outcome.file.relative.clone(),
                    phase,
                    error,
                }),
            }
        });

        for failure in failures {
            if self.failed_paths.insert(failure.path.clone()) {
                warn!("{}: {} ({} phase)", failure.path, failure.error, phase);
                self.progress.push_error(failure.clone());
                self.errors.push(failure);
            } else {
                debug!("{}: already recorded, ignoring {} phase failure", failure.path, phase);
            }
        }
        stats
    }

    fn ensure_not_cancelled(&self, stats: &PoolStats) -> Result<(), (PhaseError, PoolStats)> {
        if stats.skipped > 0 || self.cancel.is_cancelled() {
            Err((PhaseError::Cancelled, *stats))
        } else {
            Ok(())
        }
    }

    fn check_capacity(&self, phase: Phase, model: &DomainModel) -> Result<(), PhaseError> {
        match self.config.max_entities {
            Some(limit) => {
                let attempted = model.counts().total();
                if attempted > limit {
                    Err(PhaseError::CapacityExceeded {
                        phase,
                        limit,
                        attempted,
                    })
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }
}

fn model_error(phase: Phase, source: ModelError) -> (PhaseError, PoolStats) {
    (PhaseError::Model { phase, source }, PoolStats::default())
}
