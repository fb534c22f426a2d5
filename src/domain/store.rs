use crate::domain::extraction::ExtractionResult;
use crate::domain::source::Fingerprint;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// One file's last extraction, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Record layout version; anything else reads as a miss.
    pub version: u32,
    pub fingerprint: Fingerprint,
    /// Unix seconds.
    pub extracted_at: u64,
    pub result: ExtractionResult,
}

impl CacheEntry {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(fingerprint: Fingerprint, result: ExtractionResult) -> Self {
        let extracted_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version: Self::CURRENT_VERSION,
            fingerprint,
            extracted_at,
            result,
        }
    }
}

/// Per-file extraction cache for one rule-set namespace.
///
/// Implementations must be thread-safe: workers consult and fill the store
/// concurrently, each owning the keys of the files it was assigned.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry>;
    fn put(&self, key: &str, fingerprint: &Fingerprint, result: &ExtractionResult);

    /// True iff an entry exists and carries exactly this fingerprint.
    fn is_valid(&self, key: &str, fingerprint: &Fingerprint) -> bool {
        self.get(key)
            .map(|entry| &entry.fingerprint == fingerprint)
            .unwrap_or(false)
    }

    /// Drop every record whose key is not in `live`; returns how many went.
    fn retain_keys(&self, live: &HashSet<String>) -> usize;

    /// Push buffered writes to durable storage.
    fn flush(&self) {}
}

// ============================================================================
// MemoryCacheStore - run-local storage using DashMap
// ============================================================================

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|r| r.clone())
    }

    fn put(&self, key: &str, fingerprint: &Fingerprint, result: &ExtractionResult) {
        self.entries
            .insert(key.to_string(), CacheEntry::new(fingerprint.clone(), result.clone()));
    }

    fn retain_keys(&self, live: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| live.contains(key));
        before.saturating_sub(self.entries.len())
    }
}

// ============================================================================
// DiskCacheStore - persistent storage in one sled tree per namespace
// ============================================================================

pub struct DiskCacheStore {
    tree: sled::Tree,
}

impl DiskCacheStore {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    fn decode(key: &str, bytes: &[u8]) -> Option<CacheEntry> {
        match bincode::deserialize::<CacheEntry>(bytes) {
            Ok(entry) if entry.version == CacheEntry::CURRENT_VERSION => Some(entry),
            Ok(entry) => {
                debug!("Cache record for {} has version {}, ignoring", key, entry.version);
                None
            }
            Err(e) => {
                warn!("Corrupt cache record for {}: {}", key, e);
                None
            }
        }
    }
}

impl CacheStore for DiskCacheStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.tree.get(key.as_bytes()) {
            Ok(Some(bytes)) => Self::decode(key, &bytes),
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    fn put(&self, key: &str, fingerprint: &Fingerprint, result: &ExtractionResult) {
        let entry = CacheEntry::new(fingerprint.clone(), result.clone());
        match bincode::serialize(&entry) {
            Ok(bytes) => {
                if let Err(e) = self.tree.insert(key.as_bytes(), bytes) {
                    warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to encode cache record for {}: {}", key, e),
        }
    }

    fn retain_keys(&self, live: &HashSet<String>) -> usize {
        let stale: Vec<sled::IVec> = self
            .tree
            .iter()
            .keys()
            .filter_map(|key| match key {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Cache scan failed: {}", e);
                    None
                }
            })
            .filter(|key| !live.contains(String::from_utf8_lossy(key).as_ref()))
            .collect();

        let mut removed = 0;
        for key in stale {
            match self.tree.remove(&key) {
                Ok(_) => removed += 1,
                Err(e) => warn!("Cache delete failed for {}: {}", String::from_utf8_lossy(&key), e),
            }
        }
        removed
    }

    fn flush(&self) {
        if let Err(e) = self.tree.flush() {
            warn!("Cache flush failed: {}", e);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
