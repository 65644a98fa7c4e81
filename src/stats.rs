//! Corpus statistics.
//!
//! A quick breakdown of what a content tree holds: entry counts by
//! category, difficulty, and source quality, plus verification coverage.
//! Used by `curate stats` to sanity-check a tree before export.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::convert;
use crate::models::{Category, Difficulty, Entry, SourceQuality};
use crate::progress::format_number;

#[derive(Debug, Default)]
pub struct CorpusStats {
    pub files: usize,
    pub unreadable: usize,
    pub entries: usize,
    pub verified: usize,
    pub invalid: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub by_difficulty: BTreeMap<Difficulty, usize>,
    pub by_source_quality: BTreeMap<SourceQuality, usize>,
}

impl CorpusStats {
    pub fn add(&mut self, entry: &Entry) {
        self.entries += 1;
        if entry.quality.verified {
            self.verified += 1;
        }
        if !entry.is_valid() {
            self.invalid += 1;
        }
        *self.by_category.entry(entry.category).or_insert(0) += 1;
        *self.by_difficulty.entry(entry.difficulty).or_insert(0) += 1;
        *self
            .by_source_quality
            .entry(entry.quality.source_quality)
            .or_insert(0) += 1;
    }
}

pub fn collect_stats(config: &Config, source: &Path) -> Result<CorpusStats> {
    let loaded = convert::load_converted(config, source, None)?;
    let mut stats = CorpusStats {
        files: loaded.files_scanned(),
        unreadable: loaded.failed.len(),
        ..Default::default()
    };
    for (_, bundle) in &loaded.bundles {
        for entry in &bundle.entries {
            stats.add(entry);
        }
    }
    Ok(stats)
}

pub fn run_stats(config: &Config, source: &Path) -> Result<()> {
    let stats = collect_stats(config, source)?;

    println!("Corpus Stats: {}", source.display());
    println!("================================");
    println!();
    println!("  Files:       {} ({} unreadable)", stats.files, stats.unreadable);
    println!("  Entries:     {}", format_number(stats.entries as u64));
    println!(
        "  Verified:    {} / {} ({}%)",
        stats.verified,
        stats.entries,
        percent(stats.verified, stats.entries)
    );
    println!("  Empty text:  {}", stats.invalid);

    print_table("CATEGORY", &stats.by_category, stats.entries, Category::as_str);
    print_table(
        "DIFFICULTY",
        &stats.by_difficulty,
        stats.entries,
        Difficulty::as_str,
    );
    print_table(
        "SOURCE QUALITY",
        &stats.by_source_quality,
        stats.entries,
        SourceQuality::as_str,
    );
    println!();
    Ok(())
}

fn print_table<K>(
    title: &str,
    rows: &BTreeMap<K, usize>,
    total: usize,
    label: fn(&K) -> &'static str,
) {
    if rows.is_empty() {
        return;
    }
    println!();
    println!("  {:<20} {:>8} {:>6}", title, "ENTRIES", "%");
    println!("  {}", "-".repeat(36));
    for (key, count) in rows {
        println!(
            "  {:<20} {:>8} {:>6}",
            label(key),
            count,
            percent(*count, total)
        );
    }
}

fn percent(part: usize, total: usize) -> usize {
    if total > 0 {
        part * 100 / total
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_stats_breakdown() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("proverbs")).unwrap();
        fs::write(
            tmp.path().join("proverbs/set.json"),
            r#"{"batch_info": {}, "flashcards": [
                {"english": "Patience is wealth", "kikuyu": "Gũkirĩrĩria nĩ ũtonga", "difficulty": "advanced",
                 "quality": {"verified": true, "source_quality": "native_speaker"}},
                {"english": "A", "kikuyu": ""}
            ]}"#,
        )
        .unwrap();
        fs::write(tmp.path().join("bad.json"), "not json").unwrap();

        let stats = collect_stats(&Config::minimal(), tmp.path()).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.unreadable, 1);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.verified, 1);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.by_category.get(&Category::Proverbs), Some(&2));
        assert_eq!(stats.by_difficulty.get(&Difficulty::Advanced), Some(&1));
        assert_eq!(
            stats.by_source_quality.get(&SourceQuality::NativeSpeaker),
            Some(&1)
        );
    }

    #[test]
    fn test_percent_handles_zero_total() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 4), 25);
    }
}
