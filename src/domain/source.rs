//! Source files and their content fingerprints.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::language::Language;

/// Hex digest of a file's bytes. Equality decides cache validity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    const HEX_LEN: usize = 32;

    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let hash = format!("{:x}", hasher.finalize());
        Fingerprint(hash[..Self::HEX_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file in a supported language, enumerated once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path (root canonicalized, then joined).
    pub path: PathBuf,
    /// Path relative to the repository root, always `/`-separated.
    pub relative: String,
    pub language: Language,
    pub size: u64,
    /// `None` when the file could not be read during discovery.
    pub fingerprint: Option<Fingerprint>,
}

impl SourceFile {
    /// Normalized absolute path used as the cache key.
    pub fn cache_key(&self) -> String {
        normalize_path(&self.path)
    }

    /// File name without extension, used as the component name for
    /// declarations that live outside any class.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module")
    }
}

/// Everything discovered under a repository root.
#[derive(Debug, Clone, Default)]
pub struct FileInventory {
    pub root: PathBuf,
    /// Every file's relative path, analyzable or not, sorted.
    pub all_files: Vec<String>,
    /// Files in supported languages, sorted by relative path.
    pub sources: Vec<SourceFile>,
}

impl FileInventory {
    pub fn total_files(&self) -> usize {
        self.all_files.len()
    }

    /// True when some file's name ends with `suffix` (e.g. `pom.xml`, `.csproj`).
    pub fn files_ending_with<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.all_files.iter().filter(move |rel| {
            rel.rsplit('/')
                .next()
                .map(|name| name.ends_with(suffix))
                .unwrap_or(false)
        })
    }

    /// True when some file lives under a directory path `dir` (e.g. `src/main/java`).
    pub fn has_directory(&self, dir: &str) -> bool {
        let infix = format!("/{}/", dir);
        let prefix = format!("{}/", dir);
        self.all_files
            .iter()
            .any(|rel| rel.starts_with(&prefix) || rel.contains(&infix))
    }
}

/// Render a path with `/` separators so keys are stable across platforms.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
