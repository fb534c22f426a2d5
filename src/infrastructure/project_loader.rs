use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::domain::language::Language;
use crate::domain::source::{FileInventory, Fingerprint, SourceFile};
use crate::infrastructure::cache::CACHE_DIR_NAME;

/// Directories that never hold application source.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "target",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "build",
    "dist",
    "bin",
    "obj",
    ".idea",
    ".vscode",
    CACHE_DIR_NAME,
];

fn is_ignored(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| IGNORED_DIRS.contains(&name))
            .unwrap_or(false)
}

pub struct ProjectLoader;

impl ProjectLoader {
    /// Enumerate every file under `root` and fingerprint the ones in a
    /// supported language.
    ///
    /// Unreadable files stay in the inventory without a fingerprint; the
    /// pipeline records them as file-level errors.
    pub fn discover(root: &Path, pool: &rayon::ThreadPool) -> Result<FileInventory> {
        if !root.is_dir() {
            bail!("Repository root {} is not a directory", root.display());
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve repository root {}", root.display()))?;

        let mut all_files = Vec::new();
        let mut candidates = Vec::new();

        for entry in WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_ignored(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if let Some(language) = Language::from_path(entry.path()) {
                candidates.push((entry.path().to_path_buf(), relative.clone(), language));
            }
            all_files.push(relative);
        }

        let mut sources: Vec<SourceFile> = pool.install(|| {
            candidates
                .into_par_iter()
                .map(|(path, relative, language)| {
                    let (size, fingerprint) = match fs::read(&path) {
                        Ok(bytes) => (bytes.len() as u64, Some(Fingerprint::of(&bytes))),
                        Err(e) => {
                            debug!("Cannot read {}: {}", relative, e);
                            (0, None)
                        }
                    };
                    SourceFile {
                        path,
                        relative,
                        language,
                        size,
                        fingerprint,
                    }
                })
                .collect()
        });

        all_files.sort();
        sources.sort_by(|a, b| a.relative.cmp(&b.relative));

        info!(
            "Discovered {} files ({} in supported languages) under {}",
            all_files.len(),
            sources.len(),
            root.display()
        );

        Ok(FileInventory {
            root,
            all_files,
            sources,
        })
    }
}
