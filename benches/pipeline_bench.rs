/// Benchmarks for the archlens pipeline.
///
/// Run with: `cargo bench`
///
/// - Cold run: every file extracted (no cache)
/// - Warm run: every file served from the on-disk cache
/// - Worker scaling on a cold run

use std::fs;
use std::path::Path;

use archlens::application::{AnalysisConfig, AnalysisRun};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::tempdir;

// ═══════════════════════════════════════════════════════════════════════════
// Synthetic Repositories
// ═══════════════════════════════════════════════════════════════════════════

/// Flask application with `packages` blueprints, each with routes and models.
fn create_synthetic_repo(root: &Path, packages: usize) {
    fs::write(root.join("requirements.txt"), "flask==3.0\nflask-login\n").unwrap();
    for i in 0..packages {
        let dir = root.join("app").join(format!("module{}", i));
        fs::create_dir_all(&dir).unwrap();

        let mut routes = format!(
            "from flask import Blueprint\nbp = Blueprint('m{i}', __name__, url_prefix='/api/m{i}')\n\n"
        );
        for r in 0..10 {
            routes.push_str(&format!(
                "@bp.route('/res{r}', methods=['GET', 'POST'])\n@login_required\ndef res{r}():\n    return []\n\n\
                 @bp.route('/res{r}/<int:id>', methods=['PUT', 'DELETE'])\n@roles_required('admin')\ndef res{r}_item(id):\n    return {{}}\n\n"
            ));
        }
        fs::write(dir.join("routes.py"), routes).unwrap();

        let mut models = String::new();
        for r in 0..10 {
            models.push_str(&format!(
                "class Res{r}(db.Model):\n    id = db.Column(db.Integer, primary_key=True)\n    name = db.Column(db.String)\n\n"
            ));
        }
        fs::write(dir.join("models.py"), models).unwrap();
    }
}

fn config(incremental: bool, workers: Option<usize>) -> AnalysisConfig {
    AnalysisConfig {
        incremental,
        max_workers: workers,
        ..AnalysisConfig::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Benchmarks
// ═══════════════════════════════════════════════════════════════════════════

fn bench_cold_vs_warm(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    for packages in [10usize, 50] {
        let dir = tempdir().unwrap();
        create_synthetic_repo(dir.path(), packages);
        group.throughput(Throughput::Elements((packages * 2) as u64));

        group.bench_with_input(BenchmarkId::new("cold", packages), &packages, |b, _| {
            b.iter(|| {
                let run = AnalysisRun::new(dir.path(), config(false, None)).unwrap();
                black_box(run.execute())
            })
        });

        // Prime the cache once; every iteration afterwards is all hits.
        AnalysisRun::new(dir.path(), config(true, None)).unwrap().execute();
        group.bench_with_input(BenchmarkId::new("warm", packages), &packages, |b, _| {
            b.iter(|| {
                let run = AnalysisRun::new(dir.path(), config(true, None)).unwrap();
                black_box(run.execute())
            })
        });
    }
    group.finish();
}

fn bench_worker_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("workers");
    group.sample_size(10);

    let dir = tempdir().unwrap();
    create_synthetic_repo(dir.path(), 40);

    for workers in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &w| {
            b.iter(|| {
                let run = AnalysisRun::new(dir.path(), config(false, Some(w))).unwrap();
                black_box(run.execute())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cold_vs_warm, bench_worker_scaling);
criterion_main!(benches);
