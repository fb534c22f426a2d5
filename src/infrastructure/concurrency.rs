/// Worker pool for per-file extraction.
///
/// Each run owns a dedicated rayon pool (never the global one) sized to the
/// configured worker count. Files of one phase are fanned out over the pool
/// from a scoped producer thread; outcomes stream back over a channel to the
/// caller's thread as they complete, so the caller is the only writer of
/// whatever it builds from them.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::extraction::{ExtractionError, ExtractionResult};
use crate::domain::rules::{Deadline, RuleSet};
use crate::domain::source::{Fingerprint, SourceFile};
use crate::domain::store::CacheStore;

/// Worker count when none is configured: one per available core.
pub fn default_workers() -> usize {
    std::cmp::max(1, num_cpus::get())
}

/// Cooperative cancellation flag shared between a run and its front end.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeOrigin {
    CacheHit,
    Extracted,
}

/// What one file produced in one phase.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: SourceFile,
    /// Fingerprint of the bytes actually processed.
    pub fingerprint: Option<Fingerprint>,
    pub result: Result<ExtractionResult, ExtractionError>,
    pub origin: OutcomeOrigin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub dispatched: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub failed: usize,
    /// Files never dispatched because the run was cancelled.
    pub skipped: usize,
}

impl PoolStats {
    fn record(&mut self, outcome: &FileOutcome) {
        self.dispatched += 1;
        match outcome.origin {
            OutcomeOrigin::CacheHit => self.cache_hits += 1,
            OutcomeOrigin::Extracted => self.cache_misses += 1,
        }
        if outcome.result.is_err() {
            self.failed += 1;
        }
    }
}

enum Message {
    Done(Box<FileOutcome>),
    Skipped,
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    parallel: bool,
    workers: usize,
    file_timeout: Duration,
}

impl WorkerPool {
    pub fn new(parallel: bool, max_workers: Option<usize>, file_timeout: Duration) -> Result<Self> {
        let workers = if parallel {
            max_workers.unwrap_or_else(default_workers).max(1)
        } else {
            1
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("archlens-worker-{}", i))
            .build()
            .context("Failed to build extraction thread pool")?;
        debug!(
            "Worker pool ready: {} workers ({} cores available)",
            workers,
            num_cpus::get()
        );
        Ok(Self {
            pool,
            parallel,
            workers,
            file_timeout,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn thread_pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    /// Apply `rules` to every file, consulting `cache` first, and hand each
    /// outcome to `on_outcome` on the calling thread as soon as it is ready.
    ///
    /// Returns once every dispatched file has been reported. Cancellation is
    /// checked before each dispatch; files already running finish normally.
    pub fn run_extraction<F>(
        &self,
        files: &[SourceFile],
        rules: &RuleSet,
        cache: &dyn CacheStore,
        cancel: &CancellationToken,
        mut on_outcome: F,
    ) -> PoolStats
    where
        F: FnMut(FileOutcome),
    {
        let mut stats = PoolStats::default();

        if !self.parallel {
            for file in files {
                if cancel.is_cancelled() {
                    stats.skipped += 1;
                    continue;
                }
                let outcome = process_file(file, rules, cache, self.file_timeout);
                stats.record(&outcome);
                on_outcome(outcome);
            }
            cache.flush();
            return stats;
        }

        let timeout = self.file_timeout;
        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Message>();
            scope.spawn(move || {
                self.pool.install(|| {
                    files.par_iter().for_each_with(tx, |tx, file| {
                        let message = if cancel.is_cancelled() {
                            Message::Skipped
                        } else {
                            Message::Done(Box::new(process_file(file, rules, cache, timeout)))
                        };
                        // The receiver only disappears if the consumer panicked.
                        let _ = tx.send(message);
                    });
                });
            });

            for message in rx {
                match message {
                    Message::Done(outcome) => {
                        stats.record(&outcome);
                        on_outcome(*outcome);
                    }
                    Message::Skipped => stats.skipped += 1,
                }
            }
        });

        cache.flush();
        stats
    }
}

/// Cache lookup, then extraction. Errors are reported, never cached.
fn process_file(
    file: &SourceFile,
    rules: &RuleSet,
    cache: &dyn CacheStore,
    timeout: Duration,
) -> FileOutcome {
    let key = file.cache_key();

    let Some(discovered) = &file.fingerprint else {
        return FileOutcome {
            file: file.clone(),
            fingerprint: None,
            result: Err(ExtractionError::Unreadable),
            origin: OutcomeOrigin::Extracted,
        };
    };

    if let Some(entry) = cache.get(&key) {
        if &entry.fingerprint == discovered {
            debug!("[{}] cache hit {}", rules.name(), file.relative);
            return FileOutcome {
                file: file.clone(),
                fingerprint: Some(entry.fingerprint),
                result: Ok(entry.result),
                origin: OutcomeOrigin::CacheHit,
            };
        }
    }
    debug!("[{}] cache miss {}", rules.name(), file.relative);

    let bytes = match fs::read(&file.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Cannot read {}: {}", file.relative, e);
            return FileOutcome {
                file: file.clone(),
                fingerprint: None,
                result: Err(ExtractionError::Io(e.to_string())),
                origin: OutcomeOrigin::Extracted,
            };
        }
    };
    // The file may have changed since discovery; key the record on what was read.
    let fingerprint = Fingerprint::of(&bytes);
    let deadline = Deadline::after(timeout);
    let result = rules.extract(file, &bytes, &deadline);

    match &result {
        Ok(extracted) => cache.put(&key, &fingerprint, extracted),
        Err(e) => warn!("[{}] {} failed: {}", rules.name(), file.relative, e),
    }

    FileOutcome {
        file: file.clone(),
        fingerprint: Some(fingerprint),
        result,
        origin: OutcomeOrigin::Extracted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::framework::Framework;
    use crate::domain::language::Language;
    use crate::domain::rules::{ExtractorRegistry, RulePhase};
    use crate::domain::store::MemoryCacheStore;
    use tempfile::tempdir;

    fn write_source(dir: &std::path::Path, rel: &str, content: &str) -> SourceFile {
        let path = dir.join(rel);
        fs::write(&path, content).unwrap();
        SourceFile {
            path,
            relative: rel.to_string(),
            language: Language::Python,
            size: content.len() as u64,
            fingerprint: Some(Fingerprint::of(content.as_bytes())),
        }
    }

    fn flask_rules() -> RuleSet {
        ExtractorRegistry::with_defaults()
            .rule_set(Framework::Flask, RulePhase::Structure)
            .unwrap()
    }

    #[test]
    fn test_second_pass_is_all_cache_hits() {
        let dir = tempdir().unwrap();
        let files: Vec<SourceFile> = (0..8)
            .map(|i| {
                write_source(
                    dir.path(),
                    &format!("m{}.py", i),
                    &format!("@app.route('/r{}')\ndef r{}():\n    return 'ok'\n", i, i),
                )
            })
            .collect();
        let rules = flask_rules();
        let cache = MemoryCacheStore::default();
        let pool = WorkerPool::new(true, Some(4), Duration::from_secs(5)).unwrap();
        let cancel = CancellationToken::new();

        let mut seen = 0;
        let first = pool.run_extraction(&files, &rules, &cache, &cancel, |o| {
            assert!(o.result.is_ok());
            seen += 1;
        });
        assert_eq!(seen, 8);
        assert_eq!(first.cache_misses, 8);
        assert_eq!(cache.len(), 8);

        let second = pool.run_extraction(&files, &rules, &cache, &cancel, |o| {
            assert_eq!(o.origin, OutcomeOrigin::CacheHit);
        });
        assert_eq!(second.cache_hits, 8);
        assert_eq!(second.cache_misses, 0);
    }

    #[test]
    fn test_unreadable_file_is_isolated() {
        let dir = tempdir().unwrap();
        let good = write_source(dir.path(), "good.py", "@app.get('/ok')\ndef ok():\n    pass\n");
        let mut gone = write_source(dir.path(), "gone.py", "x = 1\n");
        fs::remove_file(&gone.path).unwrap();
        gone.fingerprint = Some(Fingerprint::of(b"stale"));

        let cache = MemoryCacheStore::default();
        let pool = WorkerPool::new(true, Some(2), Duration::from_secs(5)).unwrap();
        let mut failures = Vec::new();
        let stats = pool.run_extraction(
            &[good, gone],
            &flask_rules(),
            &cache,
            &CancellationToken::new(),
            |o| {
                if let Err(e) = &o.result {
                    failures.push((o.file.relative.clone(), e.clone()));
                }
            },
        );
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "gone.py");
        assert!(matches!(failures[0].1, ExtractionError::Io(_)));
        // Only the successful file was cached.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sequential_preserves_input_order() {
        let dir = tempdir().unwrap();
        let files: Vec<SourceFile> = ["a.py", "b.py", "c.py"]
            .iter()
            .map(|rel| write_source(dir.path(), rel, "x = 1\n"))
            .collect();
        let pool = WorkerPool::new(false, Some(8), Duration::from_secs(5)).unwrap();
        assert_eq!(pool.workers(), 1);

        let mut order = Vec::new();
        pool.run_extraction(
            &files,
            &flask_rules(),
            &MemoryCacheStore::default(),
            &CancellationToken::new(),
            |o| order.push(o.file.relative),
        );
        assert_eq!(order, vec!["a.py", "b.py", "c.py"]);
    }

    #[test]
    fn test_cancelled_run_dispatches_nothing() {
        let dir = tempdir().unwrap();
        let files = vec![write_source(dir.path(), "a.py", "x = 1\n")];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = WorkerPool::new(true, Some(2), Duration::from_secs(5)).unwrap();
        let stats = pool.run_extraction(&files, &flask_rules(), &MemoryCacheStore::default(), &cancel, |_| {
            panic!("nothing should be dispatched");
        });
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.dispatched, 0);
    }

    #[test]
    fn test_zero_timeout_is_reported_and_not_cached() {
        let dir = tempdir().unwrap();
        let files = vec![write_source(dir.path(), "slow.py", "@app.route('/x')\ndef x():\n    pass\n")];
        let cache = MemoryCacheStore::default();
        let pool = WorkerPool::new(false, None, Duration::ZERO).unwrap();
        let mut errors = Vec::new();
        pool.run_extraction(&files, &flask_rules(), &cache, &CancellationToken::new(), |o| {
            errors.extend(o.result.err());
        });
        assert!(matches!(errors.as_slice(), [ExtractionError::Timeout { .. }]));
        assert!(cache.is_empty());
    }
}
