//! Entry-count reconciliation.
//!
//! Explains why counts disagree: between what a file's metadata declares
//! and what it holds, between the sum over all files and the unique
//! corpus, and between export targets that should be mirrors.

use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::convert;
use crate::dedup;
use crate::export::{self, EntryTriple};
use crate::models::ContentBundle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMismatch {
    pub file: String,
    pub declared: usize,
    pub actual: usize,
}

#[derive(Debug, Clone)]
pub struct TargetCounts {
    pub dir: PathBuf,
    pub bundles: usize,
    pub entries: usize,
    pub unified_entries: Option<usize>,
    pub mismatches: Vec<CountMismatch>,
    /// Triples missing from / extra to this target relative to the first.
    pub missing: usize,
    pub extra: usize,
}

#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub files: usize,
    pub unreadable: usize,
    pub mismatches: Vec<CountMismatch>,
    pub entries_in_files: usize,
    pub invalid: usize,
    pub duplicates_removed: usize,
    pub id_conflicts: usize,
    pub unique_after_dedup: usize,
    pub targets: Vec<TargetCounts>,
}

/// Declared count from whichever metadata block a document carries.
pub fn declared_total(doc: &Value) -> Option<usize> {
    let candidates = [
        doc.pointer("/metadata/total_entries"),
        doc.pointer("/batch_info/total_entries"),
        doc.pointer("/batch_info/total_cards"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_u64())
        .map(|n| n as usize)
}

pub fn reconcile(config: &Config, source: &Path, targets: &[PathBuf]) -> Result<ReconcileSummary> {
    let loaded = convert::load_converted(config, source, None)?;
    let mut summary = ReconcileSummary {
        files: loaded.files_scanned(),
        unreadable: loaded.failed.len(),
        entries_in_files: loaded.entry_count(),
        ..Default::default()
    };

    for (file, bundle) in &loaded.bundles {
        // Re-read the raw document: conversion already recomputed totals.
        let declared = std::fs::read_to_string(&file.path)
            .ok()
            .and_then(|c| serde_json::from_str::<Value>(&c).ok())
            .and_then(|doc| declared_total(&doc));
        if let Some(declared) = declared {
            if declared != bundle.entries.len() {
                summary.mismatches.push(CountMismatch {
                    file: file.relative.clone(),
                    declared,
                    actual: bundle.entries.len(),
                });
            }
        }
    }

    let outcome = dedup::deduplicate(&loaded);
    summary.invalid = outcome.report.invalid_entries.len();
    summary.duplicates_removed = outcome.report.entries_removed;
    summary.id_conflicts = outcome.report.id_conflicts.len();
    summary.unique_after_dedup = outcome.survivors.len();

    let mut baseline: Option<BTreeSet<EntryTriple>> = None;
    for target in targets {
        let dir = target.join(&config.export.subtree);
        let counts = target_counts(&dir, &config.export.unified_file, &mut baseline)?;
        summary.targets.push(counts);
    }

    Ok(summary)
}

fn target_counts(
    dir: &Path,
    unified_file: &str,
    baseline: &mut Option<BTreeSet<EntryTriple>>,
) -> Result<TargetCounts> {
    let mut counts = TargetCounts {
        dir: dir.to_path_buf(),
        bundles: 0,
        entries: 0,
        unified_entries: None,
        mismatches: Vec::new(),
        missing: 0,
        extra: 0,
    };
    if !dir.is_dir() {
        return Ok(counts);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    paths.sort();

    for path in &paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let bundle = match ContentBundle::read_from(path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Warning: skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        if bundle.metadata.total_entries != bundle.entries.len() {
            counts.mismatches.push(CountMismatch {
                file: name.clone(),
                declared: bundle.metadata.total_entries,
                actual: bundle.entries.len(),
            });
        }
        if name == unified_file {
            counts.unified_entries = Some(bundle.entries.len());
        } else {
            counts.bundles += 1;
            counts.entries += bundle.entries.len();
        }
    }

    let triples = export::read_target_triples(dir, unified_file)?;
    if let Some(expected) = baseline.as_ref() {
        counts.missing = expected.difference(&triples).count();
        counts.extra = triples.difference(expected).count();
    } else {
        *baseline = Some(triples);
    }

    Ok(counts)
}

pub fn run_reconcile(config: &Config, source: &Path, targets: &[PathBuf]) -> Result<()> {
    let targets: Vec<PathBuf> = if targets.is_empty() {
        config.export.targets.clone()
    } else {
        targets.to_vec()
    };
    let summary = reconcile(config, source, &targets)?;

    println!("reconcile {}", source.display());
    println!("  files: {} ({} unreadable)", summary.files, summary.unreadable);
    if summary.mismatches.is_empty() {
        println!("  declared totals: all match");
    } else {
        println!("  declared totals that do not match:");
        for m in &summary.mismatches {
            println!(
                "    {:<40} declared {:>5}  actual {:>5}",
                m.file, m.declared, m.actual
            );
        }
    }
    println!("  entries in files: {}", summary.entries_in_files);
    println!("  invalid (empty text): {}", summary.invalid);
    println!("  duplicates: {}", summary.duplicates_removed);
    println!("  id conflicts: {}", summary.id_conflicts);
    println!("  unique after dedup: {}", summary.unique_after_dedup);

    if !summary.targets.is_empty() {
        println!("  targets:");
        for t in &summary.targets {
            let unified = t
                .unified_entries
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "    {}  bundles {}  entries {}  unified {}",
                t.dir.display(),
                t.bundles,
                t.entries,
                unified
            );
            for m in &t.mismatches {
                println!(
                    "      {} declares {} but holds {}",
                    m.file, m.declared, m.actual
                );
            }
            if t.missing > 0 || t.extra > 0 {
                println!(
                    "      differs from first target: {} missing, {} extra",
                    t.missing, t.extra
                );
            }
        }
    }

    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_declared_total_lookup() {
        assert_eq!(declared_total(&json!({"metadata": {"total_entries": 4}})), Some(4));
        assert_eq!(declared_total(&json!({"batch_info": {"total_cards": 9}})), Some(9));
        assert_eq!(declared_total(&json!({"entries": []})), None);
    }

    #[test]
    fn test_reconcile_explains_counts() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("a.json"),
            r#"{"batch_info": {"total_cards": 5}, "flashcards": [
                {"english": "thank you", "kikuyu": "nĩ ngatho"},
                {"english": "", "kikuyu": "mũtĩ"}
            ]}"#,
        )
        .unwrap();
        fs::write(
            src.join("b.json"),
            r#"{"metadata": {"total_entries": 1}, "entries": [
                {"id": "p-1", "source_text": "thank you", "target_text": "nĩ ngatho"}
            ]}"#,
        )
        .unwrap();

        let summary = reconcile(&Config::minimal(), &src, &[]).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(
            summary.mismatches,
            vec![CountMismatch {
                file: "a.json".to_string(),
                declared: 5,
                actual: 2
            }]
        );
        assert_eq!(summary.entries_in_files, 3);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.duplicates_removed, 1);
        assert_eq!(summary.unique_after_dedup, 2);
    }

    #[test]
    fn test_reconcile_compares_targets() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("a.json"),
            r#"[{"id": "v-1", "english": "one", "kikuyu": "ĩmwe"},
                {"id": "v-2", "english": "two", "kikuyu": "igĩrĩ"}]"#,
        )
        .unwrap();

        let config = Config::minimal();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::create_dir_all(a.join("curated-content")).unwrap();
        fs::create_dir_all(b.join("curated-content")).unwrap();
        let bundle = json!({
            "metadata": {"total_entries": 2},
            "entries": [
                {"id": "v-1", "source_text": "one", "target_text": "ĩmwe"},
                {"id": "v-2", "source_text": "two", "target_text": "igĩrĩ"}
            ]
        });
        fs::write(a.join("curated-content/vocabulary.json"), bundle.to_string()).unwrap();
        let short = json!({
            "metadata": {"total_entries": 2},
            "entries": [{"id": "v-1", "source_text": "one", "target_text": "ĩmwe"}]
        });
        fs::write(b.join("curated-content/vocabulary.json"), short.to_string()).unwrap();

        let summary = reconcile(&config, &src, &[a, b]).unwrap();
        assert_eq!(summary.targets.len(), 2);
        assert_eq!(summary.targets[0].entries, 2);
        assert_eq!(summary.targets[1].missing, 1);
        assert_eq!(summary.targets[1].mismatches.len(), 1);
    }
}
