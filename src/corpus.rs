//! Discovery and loading of JSON content files.
//!
//! Walks a source tree, applies include/exclude globs, and returns files in
//! sorted relative-path order so every downstream stage iterates the
//! corpus deterministically. Loading is per file: a file that cannot be
//! read or parsed becomes a [`FileOutcome::Failed`] value, never an error
//! that stops the run.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{Category, ContentBundle};

/// A JSON file found under the source root.
#[derive(Debug, Clone)]
pub struct CorpusFile {
    pub path: PathBuf,
    /// Path relative to the source root, `/`-separated.
    pub relative: String,
    /// Modification time as Unix seconds (0 when unavailable).
    pub modified: i64,
}

impl CorpusFile {
    /// Category implied by the nearest category-named parent directory,
    /// e.g. `proverbs/batch1.json` -> proverbs.
    pub fn directory_category(&self) -> Option<Category> {
        let mut parts: Vec<&str> = self.relative.split('/').collect();
        parts.pop();
        parts.iter().rev().find_map(|dir| Category::parse_lenient(dir))
    }
}

/// Result of loading one canonical bundle file.
#[derive(Debug)]
pub enum FileOutcome {
    Loaded {
        file: CorpusFile,
        bundle: ContentBundle,
    },
    Skipped {
        file: CorpusFile,
        reason: String,
    },
    Failed {
        file: CorpusFile,
        error: String,
    },
}

/// Every bundle that loaded, plus the files that did not.
#[derive(Debug, Default)]
pub struct LoadedCorpus {
    pub bundles: Vec<(CorpusFile, ContentBundle)>,
    pub skipped: Vec<(CorpusFile, String)>,
    pub failed: Vec<(CorpusFile, String)>,
}

impl LoadedCorpus {
    pub fn files_scanned(&self) -> usize {
        self.bundles.len() + self.skipped.len() + self.failed.len()
    }

    pub fn entry_count(&self) -> usize {
        self.bundles.iter().map(|(_, b)| b.entries.len()).sum()
    }
}

pub fn discover_files(config: &Config, root: &Path) -> Result<Vec<CorpusFile>> {
    if !root.exists() {
        bail!("Source directory does not exist: {}", root.display());
    }
    if !root.is_dir() {
        bail!("Source path is not a directory: {}", root.display());
    }

    let include_set = build_globset(&config.source.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.source.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.source.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let at = e.path().unwrap_or(root);
                eprintln!("Warning: skipping {}: {}", at.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(CorpusFile {
            path: path.to_path_buf(),
            relative: rel_str,
            modified: modified_secs(path),
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(files)
}

/// Absolute, symlink-resolved form of `path`. Trailing components that do
/// not exist yet are appended to the nearest existing ancestor.
pub fn normalized_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(mut resolved) = std::fs::canonicalize(existing) {
            for name in missing.iter().rev() {
                resolved.push(name);
            }
            return Ok(resolved);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => bail!("Cannot resolve path: {}", path.display()),
        }
    }
}

/// Drop files under `subtree` when it lies strictly inside `root`.
pub fn exclude_subtree(files: &mut Vec<CorpusFile>, root: &Path, subtree: &Path) -> Result<()> {
    let root = normalized_path(root)?;
    let subtree = normalized_path(subtree)?;
    if let Ok(inner) = subtree.strip_prefix(&root) {
        if !inner.as_os_str().is_empty() {
            files.retain(|f| !Path::new(&f.relative).starts_with(inner));
        }
    }
    Ok(())
}

pub fn load_bundle(file: CorpusFile) -> FileOutcome {
    let content = match std::fs::read_to_string(&file.path) {
        Ok(c) => c,
        Err(e) => {
            return FileOutcome::Failed {
                error: format!("read error: {}", e),
                file,
            }
        }
    };
    if content.trim().is_empty() {
        return FileOutcome::Skipped {
            file,
            reason: "empty file".to_string(),
        };
    }
    match serde_json::from_str::<ContentBundle>(&content) {
        Ok(bundle) => FileOutcome::Loaded { file, bundle },
        Err(e) => FileOutcome::Failed {
            error: format!("parse error: {}", e),
            file,
        },
    }
}

pub fn load_corpus(files: Vec<CorpusFile>) -> LoadedCorpus {
    let mut corpus = LoadedCorpus::default();
    for file in files {
        match load_bundle(file) {
            FileOutcome::Loaded { file, bundle } => corpus.bundles.push((file, bundle)),
            FileOutcome::Skipped { file, reason } => {
                eprintln!("Warning: skipping {}: {}", file.relative, reason);
                corpus.skipped.push((file, reason));
            }
            FileOutcome::Failed { file, error } => {
                eprintln!("Warning: skipping {}: {}", file.relative, error);
                corpus.failed.push((file, error));
            }
        }
    }
    corpus
}

fn modified_secs(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
