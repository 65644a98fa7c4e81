//! Corpus-wide deduplication.
//!
//! Two indexes are built over every entry of every loaded bundle:
//! `by_id` and `by_content` (trimmed `(source_text, target_text)`, valid
//! entries only). Content identity is authoritative: entries sharing a
//! pair collapse to one survivor, picked by
//!
//! 1. an explicitly set (non-default) `quality.source_quality`,
//! 2. then the most recently modified file,
//! 3. then the first entry in sorted-path iteration order.
//!
//! Entries that share an `id` but differ in content are an
//! [`IdConflict`]: both are kept and the conflict is reported for a human
//! to resolve.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::config::{Config, IdConflictPolicy};
use crate::corpus::{self, LoadedCorpus};
use crate::models::{ContentBundle, Entry};
use crate::progress::{ProgressEvent, ProgressReporter};

/// An entry together with where it was read from.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    /// Relative path of the bundle file.
    pub file: String,
    pub modified: i64,
    /// Position in the corpus-wide iteration order.
    pub order: usize,
    pub entry: Entry,
}

impl CorpusEntry {
    fn entry_ref(&self) -> EntryRef {
        EntryRef {
            file: self.file.clone(),
            id: self.entry.id.clone(),
        }
    }

    /// Trimmed text pair, empty sides included.
    fn raw_pair(&self) -> (String, String) {
        (
            self.entry.source_text.trim().to_string(),
            self.entry.target_text.trim().to_string(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryRef {
    pub file: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub key: String,
    pub members: Vec<EntryRef>,
    /// The member that survived, when the group was resolved.
    pub kept: Option<EntryRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictVariant {
    pub file: String,
    pub source_text: String,
    pub target_text: String,
}

/// Same `id`, different content. Never resolved automatically.
#[derive(Debug, Clone, Serialize)]
pub struct IdConflict {
    pub id: String,
    pub variants: Vec<ConflictVariant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupReport {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub entries_scanned: usize,
    pub unique_ids: usize,
    pub unique_contents: usize,
    pub duplicate_id_count: usize,
    pub duplicate_content_count: usize,
    pub duplicate_id_groups: Vec<DuplicateGroup>,
    pub duplicate_content_groups: Vec<DuplicateGroup>,
    pub id_conflicts: Vec<IdConflict>,
    pub invalid_entries: Vec<EntryRef>,
    pub entries_removed: usize,
}

#[derive(Debug)]
pub struct DedupOutcome {
    /// Surviving entries in corpus order.
    pub survivors: Vec<CorpusEntry>,
    pub report: DedupReport,
}

/// Flatten a loaded corpus into entries, in sorted file order.
pub fn collect_entries(corpus: &LoadedCorpus) -> Vec<CorpusEntry> {
    let mut order = 0;
    let mut entries = Vec::with_capacity(corpus.entry_count());
    for (file, bundle) in &corpus.bundles {
        for entry in &bundle.entries {
            entries.push(CorpusEntry {
                file: file.relative.clone(),
                modified: file.modified,
                order,
                entry: entry.clone(),
            });
            order += 1;
        }
    }
    entries
}

/// Deduplicate a loaded corpus and build the report.
pub fn deduplicate(corpus: &LoadedCorpus) -> DedupOutcome {
    let entries = collect_entries(corpus);

    let mut by_id: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut by_content: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    let mut invalid_entries = Vec::new();

    for (idx, ce) in entries.iter().enumerate() {
        by_id.entry(ce.entry.id.clone()).or_default().push(idx);
        match ce.entry.content_key() {
            Some(key) => by_content.entry(key).or_default().push(idx),
            None => invalid_entries.push(ce.entry_ref()),
        }
    }

    let mut removed: HashSet<usize> = HashSet::new();

    let mut duplicate_content_groups = Vec::new();
    for ((source, target), members) in &by_content {
        if members.len() < 2 {
            continue;
        }
        let keep = pick_survivor(&entries, members);
        removed.extend(members.iter().copied().filter(|&m| m != keep));
        duplicate_content_groups.push(DuplicateGroup {
            key: format!("{} | {}", source, target),
            members: members.iter().map(|&m| entries[m].entry_ref()).collect(),
            kept: Some(entries[keep].entry_ref()),
        });
    }

    let mut duplicate_id_groups = Vec::new();
    let mut id_conflicts = Vec::new();
    for (id, members) in &by_id {
        if members.len() < 2 {
            continue;
        }
        let surviving: Vec<usize> = members
            .iter()
            .copied()
            .filter(|m| !removed.contains(m))
            .collect();
        // Empty-text entries are reported as invalid and never count as
        // conflicting variants.
        let valid: Vec<usize> = surviving
            .iter()
            .copied()
            .filter(|&m| entries[m].entry.is_valid())
            .collect();
        let distinct: BTreeSet<(String, String)> =
            valid.iter().map(|&m| entries[m].raw_pair()).collect();

        let kept = if distinct.len() > 1 {
            id_conflicts.push(IdConflict {
                id: id.clone(),
                variants: valid
                    .iter()
                    .map(|&m| ConflictVariant {
                        file: entries[m].file.clone(),
                        source_text: entries[m].entry.source_text.clone(),
                        target_text: entries[m].entry.target_text.clone(),
                    })
                    .collect(),
            });
            None
        } else {
            // Same id and same text: a plain duplicate, first one stays.
            let mut seen = BTreeSet::new();
            for &m in &surviving {
                if !seen.insert(entries[m].raw_pair()) {
                    removed.insert(m);
                }
            }
            valid
                .first()
                .or(surviving.first())
                .map(|&m| entries[m].entry_ref())
        };

        duplicate_id_groups.push(DuplicateGroup {
            key: id.clone(),
            members: members.iter().map(|&m| entries[m].entry_ref()).collect(),
            kept,
        });
    }

    let mut report = DedupReport {
        files_scanned: corpus.files_scanned(),
        files_skipped: corpus.skipped.len() + corpus.failed.len(),
        skipped_files: corpus
            .skipped
            .iter()
            .chain(corpus.failed.iter())
            .map(|(f, reason)| SkippedFile {
                file: f.relative.clone(),
                reason: reason.clone(),
            })
            .collect(),
        entries_scanned: entries.len(),
        unique_ids: by_id.len(),
        unique_contents: by_content.len(),
        duplicate_id_count: duplicate_id_groups.len(),
        duplicate_content_count: duplicate_content_groups.len(),
        duplicate_id_groups,
        duplicate_content_groups,
        id_conflicts,
        invalid_entries,
        entries_removed: removed.len(),
    };
    report.skipped_files.sort_by(|a, b| a.file.cmp(&b.file));

    let survivors = entries
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !removed.contains(idx))
        .map(|(_, ce)| ce)
        .collect();

    DedupOutcome { survivors, report }
}

/// Tie-break among content-identical entries.
fn pick_survivor(entries: &[CorpusEntry], members: &[usize]) -> usize {
    members
        .iter()
        .copied()
        .min_by_key(|&m| {
            let ce = &entries[m];
            (
                ce.entry.quality.source_quality.is_default(),
                Reverse(ce.modified),
                ce.order,
            )
        })
        .unwrap_or(members[0])
}

/// Apply the configured id-conflict policy to deduplicated survivors.
///
/// `Abort` fails while any conflict remains. `LastWins` keeps the
/// later-processed record for each conflicting id and returns how many
/// records were overridden.
pub fn resolve_id_conflicts(
    survivors: Vec<CorpusEntry>,
    conflicts: &[IdConflict],
    policy: IdConflictPolicy,
) -> Result<(Vec<CorpusEntry>, usize)> {
    if conflicts.is_empty() {
        return Ok((survivors, 0));
    }

    match policy {
        IdConflictPolicy::Abort => {
            let ids = conflicts
                .iter()
                .take(10)
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            bail!(
                "{} id conflict(s) require manual resolution (same id, different content): {}{}. \
                 Fix the source files or set dedup.id_conflicts = \"last_wins\".",
                conflicts.len(),
                ids,
                if conflicts.len() > 10 { ", ..." } else { "" }
            );
        }
        IdConflictPolicy::LastWins => {
            let conflicting: HashSet<&str> = conflicts.iter().map(|c| c.id.as_str()).collect();
            let mut last_order: BTreeMap<String, usize> = BTreeMap::new();
            for ce in &survivors {
                if ce.entry.is_valid() && conflicting.contains(ce.entry.id.as_str()) {
                    last_order.insert(ce.entry.id.clone(), ce.order);
                }
            }
            let before = survivors.len();
            let kept: Vec<CorpusEntry> = survivors
                .into_iter()
                .filter(|ce| match last_order.get(&ce.entry.id) {
                    Some(&last) if ce.entry.is_valid() => ce.order == last,
                    _ => true,
                })
                .collect();
            let overridden = before - kept.len();
            Ok((kept, overridden))
        }
    }
}

/// Rewrite surviving entries back into their original files under `output`.
pub fn write_survivors(
    corpus: &LoadedCorpus,
    survivors: &[CorpusEntry],
    output: &Path,
) -> Result<usize> {
    let mut by_file: BTreeMap<&str, Vec<Entry>> = BTreeMap::new();
    for ce in survivors {
        by_file.entry(ce.file.as_str()).or_default().push(ce.entry.clone());
    }

    let mut written = 0;
    for (file, bundle) in &corpus.bundles {
        let entries = by_file.remove(file.relative.as_str()).unwrap_or_default();
        let mut out = ContentBundle::new(bundle.metadata.clone(), entries);
        out.write_to(&output.join(&file.relative))?;
        written += 1;
    }
    Ok(written)
}

pub fn run_dedup(
    config: &Config,
    source: &Path,
    output: Option<&Path>,
    report_path: Option<&Path>,
    limit: Option<usize>,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    progress.report(ProgressEvent::Discovering {
        stage: "dedup".to_string(),
    });
    let mut files = corpus::discover_files(config, source)?;
    if let Some(lim) = limit {
        files.truncate(lim);
    }
    progress.report(ProgressEvent::Processing {
        stage: "dedup".to_string(),
        n: 0,
        total: files.len() as u64,
    });

    let corpus = corpus::load_corpus(files);
    let outcome = deduplicate(&corpus);
    let report = &outcome.report;

    if dry_run {
        println!("dedup {} (dry-run)", source.display());
    } else {
        println!("dedup {}", source.display());
    }
    print_report(report);

    if !dry_run {
        if let Some(out) = output {
            let written = write_survivors(&corpus, &outcome.survivors, out)?;
            println!("  files written: {} -> {}", written, out.display());
        }
        if let Some(path) = report_path {
            write_report(report, path)?;
            println!("  report: {}", path.display());
        }
    }

    println!("ok");
    Ok(())
}

pub fn print_report(report: &DedupReport) {
    println!("  files scanned: {}", report.files_scanned);
    println!("  files skipped: {}", report.files_skipped);
    println!("  entries scanned: {}", report.entries_scanned);
    println!("  unique ids: {}", report.unique_ids);
    println!("  unique contents: {}", report.unique_contents);
    println!("  duplicate content groups: {}", report.duplicate_content_count);
    println!("  duplicate id groups: {}", report.duplicate_id_count);
    println!("  invalid entries (empty text): {}", report.invalid_entries.len());
    println!("  entries removed: {}", report.entries_removed);
    println!("  id conflicts: {}", report.id_conflicts.len());
    for conflict in &report.id_conflicts {
        println!("    {} (manual resolution required)", conflict.id);
        for v in &conflict.variants {
            println!("      {}: {} / {}", v.file, v.source_text, v.target_text);
        }
    }
}

pub fn write_report(report: &DedupReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}
