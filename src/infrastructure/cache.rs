//! Cache Location Module
//!
//! Decides where a repository's extraction cache lives and opens it.
//!
//! Layout:
//! - `<root>/.archlens/cache` by default
//! - `<cache_dir>/projects/<project-id>` when a shared cache directory is
//!   configured; the id is derived from the canonical repository path so two
//!   repositories never share records
//!
//! Inside, one sled database holds a tree per rule-set namespace. Trees of
//! namespaces no longer in use are dropped at the end of a run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::domain::store::{CacheStore, DiskCacheStore, MemoryCacheStore};

/// Directory name the inventory never descends into.
pub const CACHE_DIR_NAME: &str = ".archlens";

/// sled's own tree; it cannot be dropped and holds no records of ours.
const SLED_DEFAULT_TREE: &[u8] = b"__sled__default";

/// First 16 hex chars of SHA-256 over the repository path.
pub fn project_id(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().replace('\\', "/").as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..16].to_string()
}

#[derive(Debug, Clone)]
pub struct CacheLocation {
    dir: PathBuf,
}

impl CacheLocation {
    pub fn for_repository(root: &Path, cache_dir: Option<&Path>) -> Self {
        let dir = match cache_dir {
            Some(base) => base.join("projects").join(project_id(root)),
            None => root.join(CACHE_DIR_NAME).join("cache"),
        };
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn open(&self) -> Result<CacheDb> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {}", self.dir.display()))?;
        let db = sled::open(&self.dir)
            .with_context(|| format!("Failed to open cache at {}", self.dir.display()))?;
        info!("Opened extraction cache at {}", self.dir.display());
        Ok(CacheDb { db: Some(db) })
    }

    /// Remove the whole cache. The next run re-extracts everything.
    pub fn invalidate(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .with_context(|| format!("Failed to remove cache {}", self.dir.display()))?;
        }
        Ok(())
    }
}

/// Handle on the run's cache: a sled database, or nothing (memory only).
pub struct CacheDb {
    db: Option<sled::Db>,
}

impl CacheDb {
    /// A cache that forgets everything at the end of the run.
    pub fn in_memory() -> Self {
        Self { db: None }
    }

    /// Open the configured location, falling back to memory when the
    /// on-disk cache cannot be used.
    pub fn open_or_memory(location: &CacheLocation) -> Self {
        match location.open() {
            Ok(db) => db,
            Err(e) => {
                warn!("Extraction cache unavailable, continuing without it: {:#}", e);
                Self::in_memory()
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    /// Store for one rule-set namespace.
    pub fn store(&self, namespace: &str) -> Arc<dyn CacheStore> {
        if let Some(db) = &self.db {
            match db.open_tree(namespace) {
                Ok(tree) => return Arc::new(DiskCacheStore::new(tree)),
                Err(e) => warn!("Cache namespace {} unavailable: {}", namespace, e),
            }
        }
        Arc::new(MemoryCacheStore::default())
    }

    /// Names of the namespaces currently on disk.
    pub fn namespaces(&self) -> Vec<String> {
        let Some(db) = &self.db else {
            return Vec::new();
        };
        db.tree_names()
            .into_iter()
            .filter(|name| &name[..] != SLED_DEFAULT_TREE)
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .collect()
    }

    /// Drop every namespace not in `live`; returns how many were dropped.
    pub fn retain_namespaces(&self, live: &[String]) -> usize {
        let Some(db) = &self.db else {
            return 0;
        };
        let mut dropped = 0;
        for name in self.namespaces() {
            if live.contains(&name) {
                continue;
            }
            match db.drop_tree(name.as_bytes()) {
                Ok(true) => {
                    debug!("Dropped stale cache namespace {}", name);
                    dropped += 1;
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to drop cache namespace {}: {}", name, e),
            }
        }
        dropped
    }

    pub fn flush(&self) {
        if let Some(db) = &self.db {
            if let Err(e) = db.flush() {
                warn!("Cache flush failed: {}", e);
            }
        }
    }
}
