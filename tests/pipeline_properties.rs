/// Run-level guarantees: failure isolation, determinism, reference ordering,
/// cancellation, capacity limits, configuration checks and cache recovery.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use archlens::application::{
    AnalysisConfig, AnalysisRun, ConfigError, Phase, PhaseStatus, RawConfig, RunState,
};
use archlens::domain::extraction::ExtractionError;
use archlens::domain::framework::Framework;
use archlens::domain::model::{ComponentRef, DomainModel, FindingKind};
use archlens::infrastructure::CancellationToken;
use archlens::ports::PhaseObserver;
use pretty_assertions::assert_eq;

use common::{config, orders_repo, run, shop_repo, write};

fn assert_references_resolve(model: &DomainModel) {
    let endpoints: BTreeSet<&str> = model.endpoints().map(|e| e.id.as_str()).collect();
    let models: BTreeSet<&str> = model.models().map(|m| m.id.as_str()).collect();
    let actors: BTreeSet<&str> = model.actors().map(|a| a.id.as_str()).collect();

    for actor in model.actors() {
        for id in &actor.endpoint_ids {
            assert!(endpoints.contains(id.as_str()), "actor {} links missing {}", actor.id, id);
        }
    }
    for boundary in model.boundaries() {
        for member in &boundary.members {
            let resolved = match member {
                ComponentRef::Endpoint(id) => model.endpoint(id).is_some(),
                ComponentRef::Model(id) => model.model(id).is_some(),
                ComponentRef::Service(id) => model.service(id).is_some(),
                ComponentRef::View(id) => model.view(id).is_some(),
                ComponentRef::Actor(id) => model.actor(id).is_some(),
            };
            assert!(resolved, "boundary {} has dangling member {:?}", boundary.id, member);
        }
    }
    for use_case in model.use_cases() {
        assert!(use_case.endpoint_ids.iter().all(|id| endpoints.contains(id.as_str())));
        assert!(use_case.model_ids.iter().all(|id| models.contains(id.as_str())));
        assert!(use_case.actor_ids.iter().all(|id| actors.contains(id.as_str())));
        if let Some(primary) = &use_case.primary_actor {
            assert!(actors.contains(primary.as_str()));
        }
        if let Some(boundary) = &use_case.boundary {
            assert!(model.boundary(boundary).is_some());
        }
    }
}

#[test]
fn test_one_undecodable_file_is_isolated() {
    let repo = orders_repo();
    write(repo.path(), "broken.py", [b'd', b'e', b'f', b' ', 0xff, 0xfe, b'\n']);

    let report = run(repo.path(), config());
    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "broken.py");
    assert_eq!(report.errors[0].phase, Phase::Structure);
    assert!(matches!(report.errors[0].error, ExtractionError::Encoding { .. }));

    assert_eq!(report.model.endpoints().count(), 2);
    assert_eq!(report.model.models().count(), 1);
    assert_eq!(report.model.project().failed_files, 1);
    assert_eq!(report.model.project().analyzed_files, 3);
    assert!(report
        .model
        .quality()
        .findings
        .iter()
        .any(|f| f.kind == FindingKind::ExtractionFailure && f.subject == "broken.py"));
}

#[test]
fn test_rust_parse_failure_is_isolated() {
    let repo = tempfile::tempdir().unwrap();
    write(
        repo.path(),
        "Cargo.toml",
        "[package]\nname = \"svc\"\n\n[dependencies]\nactix-web = \"4\"\n",
    );
    write(
        repo.path(),
        "src/handlers/users.rs",
        "\
use actix_web::{get, post, HttpResponse};

#[get(\"/users\")]
async fn list_users() -> HttpResponse {
    HttpResponse::Ok().finish()
}

#[post(\"/users\")]
#[has_roles(\"ADMIN\")]
async fn create_user() -> HttpResponse {
    HttpResponse::Created().finish()
}
",
    );
    write(repo.path(), "src/handlers/broken.rs", "fn ok() {}\nfn broken(x: ) {}\n");

    let report = run(repo.path(), config());
    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "src/handlers/broken.rs");
    assert!(matches!(report.errors[0].error, ExtractionError::Parse { .. }));
    assert_eq!(report.model.endpoints().count(), 2);

    let identities: Vec<&str> = report.model.actors().map(|a| a.identity.as_str()).collect();
    assert!(identities.contains(&"visitor"));
    assert!(identities.contains(&"admin"));
}

#[test]
fn test_parallel_and_sequential_runs_agree() {
    let repo = shop_repo(12);
    let parallel = run(
        repo.path(),
        AnalysisConfig {
            incremental: false,
            max_workers: Some(4),
            ..AnalysisConfig::default()
        },
    );
    let sequential = run(
        repo.path(),
        AnalysisConfig {
            incremental: false,
            parallel: false,
            ..AnalysisConfig::default()
        },
    );

    assert_eq!(parallel.state, RunState::Done);
    assert!(parallel.model.endpoints().count() >= 36);
    assert_eq!(parallel.model, sequential.model);
    assert_eq!(parallel.errors, sequential.errors);
}

#[test]
fn test_derived_entities_reference_existing_entities() {
    let repo = shop_repo(3);
    let report = run(repo.path(), config());
    assert!(report.model.actors().count() > 0);
    assert!(report.model.boundaries().count() > 0);
    assert!(report.model.use_cases().count() > 0);
    assert_references_resolve(&report.model);

    let orders = run(orders_repo().path(), config());
    assert_references_resolve(&orders.model);
}

#[test]
fn test_disabled_phases_are_skipped() {
    let repo = orders_repo();
    let config = RawConfig {
        disabled_phases: vec!["use_cases".to_string(), "boundaries".to_string()],
        ..RawConfig::default()
    }
    .validate()
    .unwrap();

    let report = run(repo.path(), config);
    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.phase(Phase::UseCases).unwrap().status, PhaseStatus::Skipped);
    assert_eq!(report.phase(Phase::Boundaries).unwrap().status, PhaseStatus::Skipped);
    assert_eq!(report.phase(Phase::Quality).unwrap().status, PhaseStatus::Completed);
    assert_eq!(report.model.use_cases().count(), 0);
    assert_eq!(report.model.boundaries().count(), 0);
    assert_eq!(report.model.actors().count(), 1);
    assert!(report
        .model
        .quality()
        .findings
        .iter()
        .all(|f| f.kind != FindingKind::UncoveredEndpoint));
}

struct CancelAfter {
    phase: Phase,
    token: CancellationToken,
    seen: Vec<Phase>,
}

impl PhaseObserver for CancelAfter {
    fn phase_committed(&mut self, phase: Phase, _model: &DomainModel) {
        self.seen.push(phase);
        if phase == self.phase {
            self.token.cancel();
        }
    }
}

#[test]
fn test_cancellation_keeps_committed_phases() {
    let repo = orders_repo();
    let token = CancellationToken::new();
    let run = AnalysisRun::new(repo.path(), config())
        .unwrap()
        .with_cancellation(token.clone())
        .with_observer(Box::new(CancelAfter {
            phase: Phase::Structure,
            token,
            seen: Vec::new(),
        }));
    let progress = run.progress();

    let report = run.execute();
    assert_eq!(report.state, RunState::Failed);
    assert!(!report.complete);
    assert!(!report.model.project().complete);
    assert!(report.failure.as_deref().unwrap().contains("cancelled"));
    assert_eq!(report.model.endpoints().count(), 2);
    assert_eq!(report.model.actors().count(), 0);
    assert_eq!(report.phases.len(), 1);

    let snapshot = progress.snapshot();
    assert_eq!(snapshot.state, RunState::Failed);
    assert_eq!(snapshot.phases[&Phase::Structure].status, PhaseStatus::Completed);
    assert_eq!(snapshot.phases[&Phase::Structure].counts.endpoints, 2);
}

#[test]
fn test_cancelled_before_start_does_nothing() {
    let repo = orders_repo();
    let run = AnalysisRun::new(repo.path(), config()).unwrap();
    run.cancellation_token().cancel();

    let report = run.execute();
    assert_eq!(report.state, RunState::Failed);
    assert!(report.phases.is_empty());
    assert_eq!(report.model.counts().total(), 0);
}

#[test]
fn test_capacity_failure_keeps_previous_phases() {
    let repo = orders_repo();
    let structure_only = RawConfig {
        disabled_phases: vec![
            "actors".to_string(),
            "boundaries".to_string(),
            "use-cases".to_string(),
            "quality".to_string(),
        ],
        ..RawConfig::default()
    }
    .validate()
    .unwrap();
    let baseline = run(repo.path(), structure_only);
    let structure_entities = baseline.model.counts().total();

    let report = run(
        repo.path(),
        AnalysisConfig {
            max_entities: Some(structure_entities),
            ..AnalysisConfig::default()
        },
    );
    assert_eq!(report.state, RunState::Failed);
    assert!(report.failure.as_deref().unwrap().contains("actors"));
    assert_eq!(report.phase(Phase::Structure).unwrap().status, PhaseStatus::Completed);
    assert_eq!(report.phase(Phase::Actors).unwrap().status, PhaseStatus::Failed);
    assert!(report.phase(Phase::Boundaries).is_none());
    assert_eq!(report.model.counts().total(), structure_entities);
    assert_eq!(report.model.actors().count(), 0);
    assert!(!report.model.project().complete);
}

#[test]
fn test_invalid_configuration_fails_before_any_io() {
    let repo = orders_repo();

    let bad = RawConfig::from_toml_str("max_workers = 0\n").unwrap().validate();
    assert!(matches!(bad, Err(ConfigError::InvalidWorkerCount(0))));

    let config = AnalysisConfig {
        max_workers: Some(0),
        ..AnalysisConfig::default()
    };
    assert!(matches!(
        AnalysisRun::new(repo.path(), config),
        Err(ConfigError::InvalidWorkerCount(0))
    ));

    let missing = repo.path().join("does-not-exist");
    assert!(matches!(
        AnalysisRun::new(&missing, AnalysisConfig::default()),
        Err(ConfigError::InvalidRoot(_))
    ));
    assert!(!repo.path().join(".archlens").exists());
}

#[test]
fn test_timeouts_are_isolated_and_never_cached() {
    let repo = orders_repo();
    let impatient = AnalysisConfig {
        file_timeout: Duration::from_nanos(1),
        ..AnalysisConfig::default()
    };

    let report = run(repo.path(), impatient);
    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.errors.len(), 3);
    assert!(report
        .errors
        .iter()
        .all(|e| matches!(e.error, ExtractionError::Timeout { .. })));
    assert_eq!(report.model.endpoints().count(), 0);

    let retry = run(repo.path(), config());
    assert!(retry.errors.is_empty());
    assert_eq!(retry.phase(Phase::Structure).unwrap().stats.cache_hits, 0);
    assert_eq!(retry.model.endpoints().count(), 2);
}

#[test]
fn test_corrupt_cache_records_fall_back_to_extraction() {
    let repo = orders_repo();
    let first = run(repo.path(), config());

    {
        let db = sled::open(repo.path().join(".archlens").join("cache")).unwrap();
        for name in db.tree_names() {
            let tree = db.open_tree(&name).unwrap();
            let keys: Vec<_> = tree.iter().keys().map(|k| k.unwrap()).collect();
            for key in keys {
                tree.insert(key, b"not a cache record".to_vec()).unwrap();
            }
        }
        db.flush().unwrap();
    }

    let second = run(repo.path(), config());
    assert!(second.errors.is_empty());
    assert_eq!(second.totals().cache_hits, 0);
    assert_eq!(second.model, first.model);

    let third = run(repo.path(), config());
    assert_eq!(third.totals().cache_misses, 0);
}

/// Tree names and keys of the repository's on-disk cache.
fn cache_contents(root: &std::path::Path) -> (BTreeSet<String>, BTreeSet<String>) {
    let db = sled::open(root.join(".archlens").join("cache")).unwrap();
    let mut trees = BTreeSet::new();
    let mut keys = BTreeSet::new();
    for name in db.tree_names() {
        if &name[..] == b"__sled__default" {
            continue;
        }
        let tree = db.open_tree(&name).unwrap();
        keys.extend(tree.iter().keys().map(|k| String::from_utf8(k.unwrap().to_vec()).unwrap()));
        trees.insert(String::from_utf8(name.to_vec()).unwrap());
    }
    (trees, keys)
}

#[test]
fn test_cache_forgets_deleted_files_and_old_namespaces() {
    let repo = orders_repo();
    run(repo.path(), config());
    let (trees, keys) = cache_contents(repo.path());
    assert_eq!(trees.len(), 3, "trees: {:?}", trees);
    assert!(keys.iter().any(|k| k.ends_with("/services.py")));

    std::fs::remove_file(repo.path().join("services.py")).unwrap();
    let mut django = config();
    django.framework = archlens::application::FrameworkChoice::Fixed(Framework::Django);
    let report = run(repo.path(), django);
    assert_eq!(report.state, RunState::Done);

    let (trees, keys) = cache_contents(repo.path());
    assert_eq!(trees.len(), 3, "trees: {:?}", trees);
    assert!(trees.iter().all(|t| !t.contains("flask")), "trees: {:?}", trees);
    assert!(keys.iter().all(|k| !k.ends_with("/services.py")), "keys: {:?}", keys);
    assert!(keys.iter().any(|k| k.ends_with("/models.py")));
}

#[test]
fn test_unusable_cache_location_falls_back_to_memory() {
    let repo = orders_repo();
    let blocker = tempfile::tempdir().unwrap();
    let not_a_dir = blocker.path().join("cache-file");
    std::fs::write(&not_a_dir, "occupied").unwrap();

    let config = AnalysisConfig {
        cache_dir: Some(not_a_dir),
        ..AnalysisConfig::default()
    };
    let report = run(repo.path(), config);
    assert_eq!(report.state, RunState::Done);
    assert!(report.errors.is_empty());
    assert_eq!(report.model.endpoints().count(), 2);
}
