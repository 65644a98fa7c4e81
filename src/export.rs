//! Aggregate the deduplicated corpus into per-category bundles and mirror
//! them into every client asset directory.
//!
//! Each export is a full rebuild: the curated-content subtree of every
//! target is removed and rewritten, so files from earlier pipeline
//! versions cannot linger. Bundles are rendered once and the same bytes
//! are written to each target, then every target is read back and its
//! `(id, source_text, target_text)` set compared with the first.

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::corpus;
use crate::dedup::{self, CorpusEntry, DedupReport};
use crate::models::{BundleMetadata, Category, ContentBundle, Entry};
use crate::progress::{ProgressEvent, ProgressReporter};

/// `(id, source_text, target_text)` of one exported entry.
pub type EntryTriple = (String, String, String);

/// Rendered bundles ready to be written, keyed by file name.
#[derive(Debug)]
pub struct ExportPlan {
    pub files: BTreeMap<String, String>,
    pub per_category: BTreeMap<Category, usize>,
    pub total_entries: usize,
    pub invalid_dropped: usize,
    pub remapped: usize,
    pub id_conflicts_overridden: usize,
    pub report: DedupReport,
}

/// Scan, deduplicate, aggregate, and render. Nothing is written.
pub fn build_export(
    config: &Config,
    source: &Path,
    limit: Option<usize>,
    progress: &dyn ProgressReporter,
) -> Result<ExportPlan> {
    progress.report(ProgressEvent::Discovering {
        stage: "export".to_string(),
    });
    let mut files = corpus::discover_files(config, source)?;
    if let Some(lim) = limit {
        files.truncate(lim);
    }
    let loaded = corpus::load_corpus(files);
    let outcome = dedup::deduplicate(&loaded);

    let (mut survivors, id_conflicts_overridden) = dedup::resolve_id_conflicts(
        outcome.survivors,
        &outcome.report.id_conflicts,
        config.dedup.id_conflicts,
    )?;

    let mut invalid_dropped = 0;
    if config.export.drop_invalid {
        let before = survivors.len();
        survivors.retain(|ce| ce.entry.is_valid());
        invalid_dropped = before - survivors.len();
    }

    let remapped = remap_categories(&mut survivors, &config.category_remap());
    let groups = group_by_category(survivors);

    let now = Utc::now();
    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let date = now.format("%Y-%m-%d").to_string();

    let mut rendered = BTreeMap::new();
    let mut per_category = BTreeMap::new();
    let mut all_entries: Vec<Entry> = Vec::new();
    let mut all_files: BTreeSet<String> = BTreeSet::new();

    for (category, members) in &groups {
        let source_files: BTreeSet<String> = members.iter().map(|ce| ce.file.clone()).collect();
        all_files.extend(source_files.iter().cloned());
        let entries: Vec<Entry> = members.iter().map(|ce| ce.entry.clone()).collect();
        all_entries.extend(entries.iter().cloned());
        per_category.insert(*category, entries.len());

        let metadata = export_metadata(
            config,
            Some(*category),
            &date,
            &stamp,
            source_files.into_iter().collect(),
        );
        let mut bundle = ContentBundle::new(metadata, entries);
        rendered.insert(category_file_name(*category), bundle.render()?);
    }

    let total_entries = all_entries.len();
    if config.export.unified {
        let metadata = export_metadata(config, None, &date, &stamp, all_files.into_iter().collect());
        let mut bundle = ContentBundle::new(metadata, all_entries);
        rendered.insert(config.export.unified_file.clone(), bundle.render()?);
    }

    progress.report(ProgressEvent::Processing {
        stage: "export".to_string(),
        n: loaded.files_scanned() as u64,
        total: loaded.files_scanned() as u64,
    });

    Ok(ExportPlan {
        files: rendered,
        per_category,
        total_entries,
        invalid_dropped,
        remapped,
        id_conflicts_overridden,
        report: outcome.report,
    })
}

pub fn category_file_name(category: Category) -> String {
    format!("{}.json", category.as_str())
}

/// Reassign entries whose subcategory is a remap key. Returns how many
/// entries changed category.
pub fn remap_categories(entries: &mut [CorpusEntry], remap: &BTreeMap<String, Category>) -> usize {
    if remap.is_empty() {
        return 0;
    }
    let mut changed = 0;
    for ce in entries.iter_mut() {
        let Some(sub) = ce.entry.subcategory.as_deref() else {
            continue;
        };
        if let Some(&target) = remap.get(sub) {
            if ce.entry.category != target {
                ce.entry.category = target;
                changed += 1;
            }
        }
    }
    changed
}

pub fn group_by_category(entries: Vec<CorpusEntry>) -> BTreeMap<Category, Vec<CorpusEntry>> {
    let mut groups: BTreeMap<Category, Vec<CorpusEntry>> = BTreeMap::new();
    for ce in entries {
        groups.entry(ce.entry.category).or_default().push(ce);
    }
    groups
}

fn export_metadata(
    config: &Config,
    category: Option<Category>,
    date: &str,
    stamp: &str,
    source_files: Vec<String>,
) -> BundleMetadata {
    let description = match category {
        Some(c) => format!("{}: {}", config.curation.description, c),
        None => format!("{}: all categories", config.curation.description),
    };
    BundleMetadata {
        schema_version: config.curation.schema_version.clone(),
        category,
        created_date: Some(date.to_string()),
        last_updated: Some(stamp.to_string()),
        curator: config.curation.curator.clone(),
        source_files,
        total_entries: 0,
        description,
    }
}

/// Refuse targets whose replaced subtree contains the source corpus or
/// lies inside it.
pub fn check_targets_disjoint(source: &Path, targets: &[PathBuf], subtree: &str) -> Result<()> {
    let source_abs = corpus::normalized_path(source)?;
    for target in targets {
        let dir = corpus::normalized_path(&target.join(subtree))?;
        if source_abs.starts_with(&dir) || dir.starts_with(&source_abs) {
            bail!(
                "Export target {} overlaps source {}: the target subtree is replaced on export",
                dir.display(),
                source.display()
            );
        }
    }
    Ok(())
}

/// Replace `<target>/<subtree>` in every target with the plan's files.
pub fn write_targets(plan: &ExportPlan, targets: &[PathBuf], subtree: &str) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(targets.len());
    for target in targets {
        let dir = target.join(subtree);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to clear {}", dir.display()))?;
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for (name, json) in &plan.files {
            let path = dir.join(name);
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        written.push(dir);
    }
    Ok(written)
}

/// Entry triples of every category bundle in an exported subtree. The
/// unified file repeats the category entries and is left out.
pub fn read_target_triples(dir: &Path, unified_file: &str) -> Result<BTreeSet<EntryTriple>> {
    let mut triples = BTreeSet::new();
    let mut names: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .filter(|p| p.file_name().map(|n| n != unified_file).unwrap_or(true))
        .collect();
    names.sort();
    for path in names {
        let bundle = ContentBundle::read_from(&path)?;
        for e in bundle.entries {
            triples.insert((e.id, e.source_text, e.target_text));
        }
    }
    Ok(triples)
}

/// Check that every written target holds the same entry set.
pub fn verify_mirror(dirs: &[PathBuf], unified_file: &str) -> Result<usize> {
    let Some((first, rest)) = dirs.split_first() else {
        return Ok(0);
    };
    let expected = read_target_triples(first, unified_file)?;
    for dir in rest {
        let actual = read_target_triples(dir, unified_file)?;
        if actual != expected {
            let missing = expected.difference(&actual).count();
            let extra = actual.difference(&expected).count();
            bail!(
                "Mirror mismatch between {} and {}: {} missing, {} extra",
                first.display(),
                dir.display(),
                missing,
                extra
            );
        }
    }
    Ok(expected.len())
}

pub fn run_export(
    config: &Config,
    source: &Path,
    targets: &[PathBuf],
    limit: Option<usize>,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let targets: Vec<PathBuf> = if targets.is_empty() {
        config.export.targets.clone()
    } else {
        targets.to_vec()
    };
    if targets.is_empty() && !dry_run {
        bail!("No export targets. Pass --output <dir> or set export.targets in the config.");
    }

    check_targets_disjoint(source, &targets, &config.export.subtree)?;

    let plan = build_export(config, source, limit, progress)?;
    let report = &plan.report;

    if dry_run {
        println!("export {} (dry-run)", source.display());
    } else {
        println!("export {}", source.display());
    }
    println!("  files scanned: {}", report.files_scanned);
    println!("  files skipped: {}", report.files_skipped);
    println!("  entries scanned: {}", report.entries_scanned);
    println!("  duplicates removed: {}", report.entries_removed);
    println!("  invalid dropped: {}", plan.invalid_dropped);
    if plan.remapped > 0 {
        println!("  categories reassigned: {}", plan.remapped);
    }
    if plan.id_conflicts_overridden > 0 {
        println!(
            "  id conflicts overridden (last wins): {}",
            plan.id_conflicts_overridden
        );
    }
    println!("  categories:");
    for (category, count) in &plan.per_category {
        println!("    {:<14} {:>6}", category.as_str(), count);
    }
    println!("  entries exported: {}", plan.total_entries);

    if !dry_run {
        let dirs = write_targets(&plan, &targets, &config.export.subtree)?;
        println!("  targets:");
        for dir in &dirs {
            println!("    {} ({} files)", dir.display(), plan.files.len());
        }
        let mirrored = verify_mirror(&dirs, &config.export.unified_file)?;
        println!("  mirror check: {} entries identical in {} targets", mirrored, dirs.len());
    }

    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn sample_corpus(root: &Path) {
        write(
            root,
            "vocabulary/numbers.json",
            r#"{"metadata": {"total_entries": 3}, "entries": [
                {"id": "vocab-001", "source_text": "one", "target_text": "ĩmwe"},
                {"id": "vocab-002", "source_text": "two", "target_text": "igĩrĩ"}
            ]}"#,
        );
        write(
            root,
            "phrases/greetings.json",
            r#"{"metadata": {}, "entries": [
                {"id": "p-1", "source_text": "thank you", "target_text": "nĩ ngatho", "category": "phrases"},
                {"id": "p-2", "source_text": "", "target_text": "wĩ mwega", "category": "phrases"},
                {"id": "p-3", "source_text": "hello", "target_text": "wĩ mwega", "category": "vocabulary", "subcategory": "greetings"}
            ]}"#,
        );
        write(
            root,
            "phrases/dupes.json",
            r#"{"metadata": {}, "entries": [
                {"id": "p-9", "source_text": "thank you", "target_text": "nĩ ngatho", "category": "phrases"}
            ]}"#,
        );
    }

    #[test]
    fn test_build_export_groups_and_counts() {
        let tmp = TempDir::new().unwrap();
        sample_corpus(tmp.path());
        let mut config = Config::minimal();
        config
            .export
            .category_remap
            .insert("greetings".to_string(), "phrases".to_string());

        let plan = build_export(&config, tmp.path(), None, &NoProgress).unwrap();
        assert_eq!(plan.report.duplicate_content_count, 1);
        assert_eq!(plan.invalid_dropped, 1);
        assert_eq!(plan.remapped, 1);
        assert_eq!(plan.per_category.get(&Category::Phrases), Some(&2));
        assert_eq!(plan.per_category.get(&Category::Vocabulary), Some(&2));
        assert_eq!(plan.total_entries, 4);
        assert!(plan.files.contains_key("phrases.json"));
        assert!(plan.files.contains_key("all_entries.json"));

        for json in plan.files.values() {
            let bundle: ContentBundle = serde_json::from_str(json).unwrap();
            assert_eq!(bundle.metadata.total_entries, bundle.entries.len());
            assert!(bundle.metadata.last_updated.is_some());
        }
    }

    #[test]
    fn test_conflicts_abort_export_by_default() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "a.json",
            r#"{"metadata": {}, "entries": [{"id": "vocab-001", "source_text": "one", "target_text": "ĩmwe"}]}"#,
        );
        write(
            tmp.path(),
            "b.json",
            r#"{"metadata": {}, "entries": [{"id": "vocab-001", "source_text": "two", "target_text": "igĩrĩ"}]}"#,
        );
        let err = build_export(&Config::minimal(), tmp.path(), None, &NoProgress).unwrap_err();
        assert!(err.to_string().contains("vocab-001"));
    }

    #[test]
    fn test_write_targets_replaces_subtree_and_mirrors() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        sample_corpus(&src);
        let android = tmp.path().join("android/assets");
        let web = tmp.path().join("web/public");

        // Stale file from an earlier export must disappear.
        write(&android, "curated-content/legacy_v1.json", "{}");

        let config = Config::minimal();
        let plan = build_export(&config, &src, None, &NoProgress).unwrap();
        let dirs = write_targets(&plan, &[android.clone(), web.clone()], "curated-content").unwrap();

        assert!(!android.join("curated-content/legacy_v1.json").exists());
        assert_eq!(
            fs::read(android.join("curated-content/phrases.json")).unwrap(),
            fs::read(web.join("curated-content/phrases.json")).unwrap()
        );
        let mirrored = verify_mirror(&dirs, "all_entries.json").unwrap();
        assert_eq!(mirrored, plan.total_entries);
    }

    #[test]
    fn test_verify_mirror_detects_difference() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        sample_corpus(&src);
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        let plan = build_export(&Config::minimal(), &src, None, &NoProgress).unwrap();
        let dirs = write_targets(&plan, &[a, b.clone()], "curated-content").unwrap();
        fs::remove_file(b.join("curated-content/phrases.json")).unwrap();
        assert!(verify_mirror(&dirs, "all_entries.json").is_err());
    }

    #[test]
    fn test_export_refuses_target_that_contains_source() {
        let tmp = TempDir::new().unwrap();
        let assets = tmp.path().join("assets");
        let src = assets.join("curated-content");
        sample_corpus(&src);

        let config = Config::minimal();
        let err = run_export(&config, &src, &[assets.clone()], None, false, &NoProgress)
            .unwrap_err();
        assert!(err.to_string().contains("overlaps source"));
        assert!(src.join("vocabulary/numbers.json").exists());

        // A target nested inside the source is refused too.
        let inner = tmp.path().join("./assets/curated-content/phrases");
        assert!(check_targets_disjoint(&src, &[inner], "curated-content").is_err());
        assert!(check_targets_disjoint(&src, &[tmp.path().join("web")], "curated-content").is_ok());
    }

    #[test]
    fn test_empty_text_sharing_an_id_does_not_block_export() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "a.json",
            r#"{"metadata": {}, "entries": [{"id": "vocab-001", "source_text": "one", "target_text": "ĩmwe"}]}"#,
        );
        write(
            tmp.path(),
            "b.json",
            r#"{"metadata": {}, "entries": [{"id": "vocab-001", "source_text": "", "target_text": "ĩmwe"}]}"#,
        );
        let plan = build_export(&Config::minimal(), tmp.path(), None, &NoProgress).unwrap();
        assert_eq!(plan.invalid_dropped, 1);
        assert_eq!(plan.total_entries, 1);
    }
}
