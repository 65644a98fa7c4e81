//! Schema conversion: legacy JSON shapes to canonical [`ContentBundle`]s.
//!
//! Each document is classified once into a [`LegacyShape`] and every raw
//! card is mapped onto an [`Entry`]:
//!
//! - text: `english`/`kikuyu` win over `source_text`/`target_text`;
//! - `category`/`difficulty` fall back to the directory category, then to
//!   the configured defaults;
//! - `quality` keys missing from the input are filled, present ones kept;
//! - provenance is layered file -> batch -> card, most specific wins;
//! - a missing `id` is synthesized from a SHA-256 of the card content.
//!
//! Conversion is a pure function of its input: no timestamps are stamped,
//! so re-running on unchanged input yields byte-identical bundles.
//! Cards with empty text are kept and counted as flagged.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::corpus::{self, CorpusFile, LoadedCorpus};
use crate::legacy::LegacyShape;
use crate::models::{
    value_as_text, BundleMetadata, Category, ContentBundle, Difficulty, Entry, Provenance,
    Quality, SourceQuality,
};
use crate::progress::{format_number, ProgressEvent, ProgressReporter};

/// Prefix for identifiers derived from content.
pub const SYNTHETIC_ID_PREFIX: &str = "unknown-";
/// Hex digits of the content hash kept in a synthesized id.
pub const SYNTHETIC_ID_LEN: usize = 12;

const PROVENANCE_KEYS: &[&str] = &[
    "origin",
    "attribution",
    "license",
    "created_date",
    "last_updated",
];

/// Everything a conversion needs to know, passed explicitly.
#[derive(Debug, Clone)]
pub struct ConvertContext {
    pub default_category: Category,
    pub default_difficulty: Difficulty,
    pub schema_version: String,
    pub curator: String,
    pub description: String,
    /// Least specific provenance layer.
    pub file_provenance: Map<String, Value>,
}

impl ConvertContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_category: config.default_category(),
            default_difficulty: config.default_difficulty(),
            schema_version: config.curation.schema_version.clone(),
            curator: config.curation.curator.clone(),
            description: config.curation.description.clone(),
            file_provenance: config.file_provenance(),
        }
    }
}

/// Counters for one converted document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub cards: usize,
    pub synthesized_ids: usize,
    pub flagged: usize,
    pub unknown_categories: usize,
    pub unknown_difficulties: usize,
    pub unknown_source_qualities: usize,
    pub unknown_confidence: usize,
}

impl ConversionStats {
    fn absorb(&mut self, other: &ConversionStats) {
        self.cards += other.cards;
        self.synthesized_ids += other.synthesized_ids;
        self.flagged += other.flagged;
        self.unknown_categories += other.unknown_categories;
        self.unknown_difficulties += other.unknown_difficulties;
        self.unknown_source_qualities += other.unknown_source_qualities;
        self.unknown_confidence += other.unknown_confidence;
    }
}

#[derive(Debug)]
pub struct Conversion {
    pub shape: &'static str,
    pub bundle: ContentBundle,
    pub stats: ConversionStats,
}

/// Where a document came from: its path (recorded in `source_files`) and
/// the category implied by its directory, if any.
#[derive(Debug, Clone, Default)]
pub struct DocumentOrigin {
    pub relative: String,
    pub directory_category: Option<Category>,
}

/// Convert one parsed document of any recognized shape.
pub fn convert_document(doc: Value, ctx: &ConvertContext, origin: &DocumentOrigin) -> Conversion {
    let shape = LegacyShape::detect(doc);
    let kind = shape.kind();

    let (scope, cards) = match shape {
        LegacyShape::Batch {
            batch_info,
            flashcards,
        } => (batch_info, flashcards),
        LegacyShape::Bundle { metadata, entries } => (metadata, entries),
        LegacyShape::CardList { scope, cards } => (scope, cards),
        LegacyShape::SingleCard(card) => (Map::new(), vec![Value::Object(card)]),
        LegacyShape::Wrapped(value) => (Map::new(), vec![value]),
    };

    let default_category = origin.directory_category.unwrap_or(ctx.default_category);
    let batch_provenance = scope_provenance(&scope);

    let mut stats = ConversionStats::default();
    let entries: Vec<Entry> = cards
        .iter()
        .map(|card| {
            convert_card(
                card,
                ctx,
                default_category,
                &batch_provenance,
                &mut stats,
            )
        })
        .collect();

    let metadata = bundle_metadata(&scope, ctx, origin, &entries);
    Conversion {
        shape: kind,
        bundle: ContentBundle::new(metadata, entries),
        stats,
    }
}

/// Map one raw card onto an [`Entry`].
pub fn convert_card(
    raw: &Value,
    ctx: &ConvertContext,
    default_category: Category,
    batch_provenance: &Map<String, Value>,
    stats: &mut ConversionStats,
) -> Entry {
    let empty = Map::new();
    let card = raw.as_object().unwrap_or(&empty);
    stats.cards += 1;

    let source_text = first_text(card, &["english", "source_text"]);
    let target_text = first_text(card, &["kikuyu", "target_text"]);

    let id = match card.get("id").and_then(value_as_text) {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => {
            stats.synthesized_ids += 1;
            synthesize_id(raw)
        }
    };

    let category = match card.get("category").and_then(value_as_text) {
        Some(raw_cat) if !raw_cat.trim().is_empty() => Category::parse_lenient(&raw_cat)
            .unwrap_or_else(|| {
                stats.unknown_categories += 1;
                default_category
            }),
        _ => default_category,
    };

    let difficulty = match card.get("difficulty").and_then(value_as_text) {
        Some(raw_diff) if !raw_diff.trim().is_empty() => Difficulty::parse_lenient(&raw_diff)
            .unwrap_or_else(|| {
                stats.unknown_difficulties += 1;
                ctx.default_difficulty
            }),
        _ => ctx.default_difficulty,
    };

    let quality = complete_quality(card.get("quality"), stats);
    let source = layer_provenance(&[
        &ctx.file_provenance,
        batch_provenance,
        &card_provenance(card),
    ]);

    let entry = Entry {
        id,
        source_text,
        target_text,
        category,
        subcategory: card
            .get("subcategory")
            .and_then(value_as_text)
            .filter(|s| !s.is_empty()),
        difficulty,
        quality,
        source,
        context: passthrough(card, "context"),
        cultural_notes: passthrough(card, "cultural_notes"),
        examples: passthrough(card, "examples"),
        grammatical_info: passthrough(card, "grammatical_info"),
        tags: passthrough(card, "tags"),
    };

    if !entry.is_valid() {
        stats.flagged += 1;
    }
    entry
}

/// Deterministic id: `unknown-` plus the first hex digits of a SHA-256
/// over the card's serialized JSON. Object keys serialize sorted, so the
/// id depends only on content.
pub fn synthesize_id(raw: &Value) -> String {
    let serialized = serde_json::to_string(raw).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}{}", SYNTHETIC_ID_PREFIX, &digest[..SYNTHETIC_ID_LEN])
}

/// Fill missing quality keys with defaults; never overwrite present ones.
pub fn complete_quality(raw: Option<&Value>, stats: &mut ConversionStats) -> Quality {
    let mut quality = Quality::default();
    let Some(Value::Object(map)) = raw else {
        return quality;
    };

    match map.get("verified") {
        Some(Value::Bool(b)) => quality.verified = *b,
        Some(Value::String(s)) => quality.verified = s.eq_ignore_ascii_case("true"),
        _ => {}
    }

    // Non-finite scores would serialize as null and make the bundle unreadable.
    let score = match map.get("confidence_score") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(n.as_f64()),
        Some(Value::String(s)) => Some(s.trim().parse::<f64>().ok()),
        Some(_) => Some(None),
    };
    match score {
        Some(Some(f)) if f.is_finite() => quality.confidence_score = f,
        Some(_) => stats.unknown_confidence += 1,
        None => {}
    }

    if let Some(raw_sq) = map.get("source_quality").and_then(value_as_text) {
        match SourceQuality::parse_lenient(&raw_sq) {
            Some(sq) => quality.source_quality = sq,
            None => stats.unknown_source_qualities += 1,
        }
    }

    quality
}

/// Merge provenance layers from least to most specific.
pub fn layer_provenance(layers: &[&Map<String, Value>]) -> Provenance {
    let mut merged = Map::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            if value.is_null() {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
    }
    Provenance::from_map(merged)
}

/// Provenance carried by a batch-level scope (`batch_info` or bundle
/// `metadata`): well-known keys at the top, then its `source` block.
fn scope_provenance(scope: &Map<String, Value>) -> Map<String, Value> {
    let mut prov = Map::new();
    for key in PROVENANCE_KEYS {
        if let Some(value) = scope.get(*key) {
            prov.insert(key.to_string(), value.clone());
        }
    }
    merge_source_field(&mut prov, scope.get("source"));
    prov
}

/// A card carries provenance only in its own `source` field.
fn card_provenance(card: &Map<String, Value>) -> Map<String, Value> {
    let mut prov = Map::new();
    merge_source_field(&mut prov, card.get("source"));
    prov
}

fn merge_source_field(prov: &mut Map<String, Value>, source: Option<&Value>) {
    match source {
        Some(Value::Object(obj)) => {
            for (k, v) in obj {
                prov.insert(k.clone(), v.clone());
            }
        }
        Some(Value::String(s)) if !s.is_empty() => {
            prov.insert("origin".to_string(), Value::String(s.clone()));
        }
        _ => {}
    }
}

fn first_text(card: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| card.get(*k).and_then(value_as_text))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn passthrough(card: &Map<String, Value>, key: &str) -> Option<Value> {
    card.get(key).filter(|v| !v.is_null()).cloned()
}

fn bundle_metadata(
    scope: &Map<String, Value>,
    ctx: &ConvertContext,
    origin: &DocumentOrigin,
    entries: &[Entry],
) -> BundleMetadata {
    let text = |key: &str| {
        scope
            .get(key)
            .and_then(value_as_text)
            .filter(|s| !s.is_empty())
    };

    let mut source_files: Vec<String> = match scope.get("source_files") {
        Some(Value::Array(items)) => items.iter().filter_map(value_as_text).collect(),
        _ => Vec::new(),
    };
    if !origin.relative.is_empty() && !source_files.contains(&origin.relative) {
        source_files.push(origin.relative.clone());
    }

    let category = entries
        .first()
        .map(|e| e.category)
        .filter(|first| entries.iter().all(|e| e.category == *first));

    BundleMetadata {
        schema_version: ctx.schema_version.clone(),
        category,
        created_date: text("created_date").or_else(|| text("date")),
        last_updated: text("last_updated"),
        curator: text("curator").unwrap_or_else(|| ctx.curator.clone()),
        source_files,
        total_entries: entries.len(),
        description: text("description").unwrap_or_else(|| ctx.description.clone()),
    }
}

/// Per-file result of a directory conversion.
#[derive(Debug)]
pub enum ConvertOutcome {
    Converted {
        relative: String,
        shape: &'static str,
        stats: ConversionStats,
    },
    Failed {
        relative: String,
        error: String,
    },
}

#[derive(Debug, Default)]
pub struct ConvertSummary {
    pub outcomes: Vec<ConvertOutcome>,
    pub totals: ConversionStats,
    pub shapes: BTreeMap<&'static str, usize>,
}

impl ConvertSummary {
    pub fn converted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ConvertOutcome::Converted { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.converted()
    }
}

/// Convert every JSON file under `source` into a canonical bundle at the
/// same relative path under `output`.
pub fn convert_tree(
    config: &Config,
    source: &Path,
    output: &Path,
    limit: Option<usize>,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<ConvertSummary> {
    let ctx = ConvertContext::from_config(config);

    progress.report(ProgressEvent::Discovering {
        stage: "convert".to_string(),
    });
    let mut files = corpus::discover_files(config, source)?;

    // Never re-ingest our own output when it lives inside the source tree.
    corpus::exclude_subtree(&mut files, source, output)?;
    if let Some(lim) = limit {
        files.truncate(lim);
    }

    let total = files.len() as u64;
    let mut summary = ConvertSummary::default();

    for (i, file) in files.into_iter().enumerate() {
        let outcome = match convert_file(&ctx, &file, output, dry_run) {
            Ok(conversion) => {
                summary.totals.absorb(&conversion.stats);
                *summary.shapes.entry(conversion.shape).or_insert(0) += 1;
                ConvertOutcome::Converted {
                    relative: file.relative,
                    shape: conversion.shape,
                    stats: conversion.stats,
                }
            }
            Err(e) => {
                eprintln!("Warning: skipping {}: {:#}", file.relative, e);
                ConvertOutcome::Failed {
                    relative: file.relative,
                    error: format!("{:#}", e),
                }
            }
        };
        summary.outcomes.push(outcome);
        progress.report(ProgressEvent::Processing {
            stage: "convert".to_string(),
            n: i as u64 + 1,
            total,
        });
    }

    Ok(summary)
}

fn convert_file(
    ctx: &ConvertContext,
    file: &CorpusFile,
    output: &Path,
    dry_run: bool,
) -> Result<Conversion> {
    let content = std::fs::read_to_string(&file.path)
        .with_context(|| format!("Failed to read {}", file.path.display()))?;
    let doc: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in {}", file.path.display()))?;

    let origin = DocumentOrigin {
        relative: file.relative.clone(),
        directory_category: file.directory_category(),
    };
    let mut conversion = convert_document(doc, ctx, &origin);

    if !dry_run {
        conversion.bundle.write_to(&output.join(&file.relative))?;
    }
    Ok(conversion)
}

/// Convert every file under `source` in memory, whatever its shape.
/// Unreadable files land in `failed` instead of aborting.
pub fn load_converted(
    config: &Config,
    source: &Path,
    limit: Option<usize>,
) -> Result<LoadedCorpus> {
    let ctx = ConvertContext::from_config(config);
    let mut files = corpus::discover_files(config, source)?;
    corpus::exclude_subtree(&mut files, source, &config.convert.output)?;
    if let Some(lim) = limit {
        files.truncate(lim);
    }

    let mut loaded = LoadedCorpus::default();
    for file in files {
        let parsed = std::fs::read_to_string(&file.path)
            .map_err(|e| format!("read error: {}", e))
            .and_then(|c| {
                serde_json::from_str::<Value>(&c).map_err(|e| format!("parse error: {}", e))
            });
        match parsed {
            Ok(doc) => {
                let origin = DocumentOrigin {
                    relative: file.relative.clone(),
                    directory_category: file.directory_category(),
                };
                let conversion = convert_document(doc, &ctx, &origin);
                loaded.bundles.push((file, conversion.bundle));
            }
            Err(error) => {
                eprintln!("Warning: skipping {}: {}", file.relative, error);
                loaded.failed.push((file, error));
            }
        }
    }
    Ok(loaded)
}

pub fn run_convert(
    config: &Config,
    source: &Path,
    output: &Path,
    limit: Option<usize>,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let summary = convert_tree(config, source, output, limit, dry_run, progress)?;

    if dry_run {
        println!("convert {} (dry-run)", source.display());
    } else {
        println!("convert {} -> {}", source.display(), output.display());
    }
    println!("  files processed: {}", summary.outcomes.len());
    println!("  converted: {}", summary.converted());
    println!("  skipped (errors): {}", summary.failed());
    println!("  entries: {}", format_number(summary.totals.cards as u64));
    println!("  synthesized ids: {}", summary.totals.synthesized_ids);
    println!("  flagged (empty text): {}", summary.totals.flagged);
    if summary.totals.unknown_categories > 0
        || summary.totals.unknown_difficulties > 0
        || summary.totals.unknown_source_qualities > 0
        || summary.totals.unknown_confidence > 0
    {
        println!(
            "  unknown values defaulted: category={} difficulty={} source_quality={} confidence={}",
            summary.totals.unknown_categories,
            summary.totals.unknown_difficulties,
            summary.totals.unknown_source_qualities,
            summary.totals.unknown_confidence
        );
    }
    let shapes = summary
        .shapes
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");
    if !shapes.is_empty() {
        println!("  shapes: {}", shapes);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNKNOWN_ORIGIN;
    use crate::progress::NoProgress;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn ctx() -> ConvertContext {
        ConvertContext::from_config(&Config::minimal())
    }

    fn convert(doc: Value) -> Conversion {
        convert_document(doc, &ctx(), &DocumentOrigin::default())
    }

    #[test]
    fn test_batch_card_gets_defaults_and_synthetic_id() {
        let c = convert(json!({
            "batch_info": {},
            "flashcards": [{"english": "hello", "kikuyu": "wĩ mwega"}]
        }));
        assert_eq!(c.shape, "batch");
        assert_eq!(c.bundle.entries.len(), 1);
        let e = &c.bundle.entries[0];
        assert_eq!(e.source_text, "hello");
        assert_eq!(e.target_text, "wĩ mwega");
        assert_eq!(e.category, Category::Vocabulary);
        assert_eq!(e.difficulty, Difficulty::Beginner);
        assert!(e.id.starts_with(SYNTHETIC_ID_PREFIX));
        assert_eq!(e.id.len(), SYNTHETIC_ID_PREFIX.len() + SYNTHETIC_ID_LEN);
        assert_eq!(e.quality, Quality::default());
        assert_eq!(e.source.origin, UNKNOWN_ORIGIN);
        assert_eq!(c.stats.synthesized_ids, 1);
    }

    #[test]
    fn test_synthetic_id_is_pure_function_of_content() {
        let a = json!({"english": "water", "kikuyu": "maaĩ"});
        let b = json!({"kikuyu": "maaĩ", "english": "water"});
        let c = json!({"english": "water", "kikuyu": "maaĩ", "category": "vocabulary"});
        assert_eq!(synthesize_id(&a), synthesize_id(&b));
        assert_ne!(synthesize_id(&a), synthesize_id(&c));
    }

    #[test]
    fn test_modern_field_names_win_over_legacy_aliases() {
        let c = convert(json!({
            "id": "p-1",
            "english": "good morning",
            "source_text": "morning",
            "kikuyu": "ũhoro wa rũciinĩ",
            "target_text": "rũciinĩ"
        }));
        let e = &c.bundle.entries[0];
        assert_eq!(e.source_text, "good morning");
        assert_eq!(e.target_text, "ũhoro wa rũciinĩ");
        assert_eq!(e.id, "p-1");
    }

    #[test]
    fn test_legacy_alias_used_when_modern_empty() {
        let c = convert(json!({"english": "", "source_text": "tree", "target_text": "mũtĩ"}));
        assert_eq!(c.bundle.entries[0].source_text, "tree");
    }

    #[test]
    fn test_partial_quality_is_completed_not_overwritten() {
        let c = convert(json!({
            "english": "rain",
            "kikuyu": "mbura",
            "quality": {"verified": true, "source_quality": "native_speaker"}
        }));
        let q = &c.bundle.entries[0].quality;
        assert!(q.verified);
        assert_eq!(q.source_quality, SourceQuality::NativeSpeaker);
        assert_eq!(q.confidence_score, 4.0);

        let c = convert(json!({
            "english": "rain",
            "kikuyu": "mbura",
            "quality": {"confidence_score": 2}
        }));
        let q = &c.bundle.entries[0].quality;
        assert!(!q.verified);
        assert_eq!(q.confidence_score, 2.0);
        assert_eq!(q.source_quality, SourceQuality::Community);
    }

    #[test]
    fn test_provenance_layers_most_specific_wins() {
        let mut context = ctx();
        context.file_provenance = json!({"origin": "file origin", "license": "CC-BY"})
            .as_object()
            .unwrap()
            .clone();
        let c = convert_document(
            json!({
                "batch_info": {
                    "source": {"origin": "batch origin", "attribution": "Lesson 7"},
                    "created_date": "2024-03-01"
                },
                "flashcards": [
                    {"english": "a", "kikuyu": "b", "source": {"attribution": "Mwalimu Kamau"}},
                    {"english": "c", "kikuyu": "d"}
                ]
            }),
            &context,
            &DocumentOrigin::default(),
        );
        let first = &c.bundle.entries[0].source;
        assert_eq!(first.origin, "batch origin");
        assert_eq!(first.attribution.as_deref(), Some("Mwalimu Kamau"));
        assert_eq!(first.license.as_deref(), Some("CC-BY"));
        assert_eq!(first.created_date.as_deref(), Some("2024-03-01"));

        let second = &c.bundle.entries[1].source;
        assert_eq!(second.attribution.as_deref(), Some("Lesson 7"));
        assert_eq!(c.bundle.metadata.created_date.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn test_missing_text_is_kept_and_flagged() {
        let c = convert(json!({"batch_info": {}, "flashcards": [{"english": "alone"}]}));
        assert_eq!(c.bundle.entries.len(), 1);
        assert_eq!(c.bundle.entries[0].target_text, "");
        assert_eq!(c.stats.flagged, 1);
    }

    #[test]
    fn test_directory_category_is_default_before_config() {
        let origin = DocumentOrigin {
            relative: "proverbs/set1.json".to_string(),
            directory_category: Some(Category::Proverbs),
        };
        let c = convert_document(
            json!([
                {"english": "A", "kikuyu": "B"},
                {"english": "C", "kikuyu": "D", "category": "Phrase"}
            ]),
            &ctx(),
            &origin,
        );
        assert_eq!(c.bundle.entries[0].category, Category::Proverbs);
        assert_eq!(c.bundle.entries[1].category, Category::Phrases);
        assert_eq!(c.bundle.metadata.source_files, vec!["proverbs/set1.json"]);
        assert_eq!(c.bundle.metadata.category, None);
    }

    #[test]
    fn test_unknown_enum_values_are_defaulted_and_counted() {
        let c = convert(json!({
            "english": "x",
            "kikuyu": "y",
            "category": "recipes",
            "difficulty": "expert",
            "quality": {"source_quality": "rumour"}
        }));
        let e = &c.bundle.entries[0];
        assert_eq!(e.category, Category::Vocabulary);
        assert_eq!(e.difficulty, Difficulty::Beginner);
        assert_eq!(c.stats.unknown_categories, 1);
        assert_eq!(c.stats.unknown_difficulties, 1);
        assert_eq!(c.stats.unknown_source_qualities, 1);
    }

    #[test]
    fn test_optional_fields_pass_through() {
        let c = convert(json!({
            "english": "proverb",
            "kikuyu": "thimo",
            "cultural_notes": "Used at weddings",
            "examples": [{"en": "x", "ki": "y"}],
            "tags": ["wisdom"],
            "grammatical_info": {"noun_class": 9}
        }));
        let e = &c.bundle.entries[0];
        assert_eq!(e.cultural_notes, Some(json!("Used at weddings")));
        assert_eq!(e.examples, Some(json!([{"en": "x", "ki": "y"}])));
        assert_eq!(e.tags, Some(json!(["wisdom"])));
        assert_eq!(e.grammatical_info, Some(json!({"noun_class": 9})));
        assert_eq!(e.context, None);
    }

    #[test]
    fn test_bundle_total_not_trusted_from_input() {
        let c = convert(json!({
            "metadata": {"total_entries": 40, "curator": "Njeri"},
            "entries": [{"id": "a", "source_text": "one", "target_text": "ĩmwe"}]
        }));
        assert_eq!(c.shape, "bundle");
        assert_eq!(c.bundle.metadata.total_entries, 1);
        assert_eq!(c.bundle.metadata.curator, "Njeri");
    }

    #[test]
    fn test_convert_tree_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("raw");
        fs::create_dir_all(src.join("phrases")).unwrap();
        fs::write(
            src.join("phrases/batch.json"),
            r#"{"batch_info": {"source": "lesson"}, "flashcards": [
                {"english": "thank you", "kikuyu": "nĩ ngatho"},
                {"english": "welcome", "kikuyu": "wamũkĩrũo"}
            ]}"#,
        )
        .unwrap();
        fs::write(src.join("broken.json"), "{oops").unwrap();

        let out1 = tmp.path().join("out1");
        let out2 = tmp.path().join("out2");
        let config = Config::minimal();
        let s1 = convert_tree(&config, &src, &out1, None, false, &NoProgress).unwrap();
        convert_tree(&config, &src, &out2, None, false, &NoProgress).unwrap();

        assert_eq!(s1.converted(), 1);
        assert_eq!(s1.failed(), 1);
        let a = fs::read(out1.join("phrases/batch.json")).unwrap();
        let b = fs::read(out2.join("phrases/batch.json")).unwrap();
        assert_eq!(a, b);

        let bundle = ContentBundle::read_from(&out1.join("phrases/batch.json")).unwrap();
        assert!(bundle
            .entries
            .iter()
            .all(|e| e.category == Category::Phrases));
    }

    #[test]
    fn test_output_inside_source_is_not_reingested() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().to_path_buf();
        fs::write(src.join("a.json"), r#"{"english": "a", "kikuyu": "b"}"#).unwrap();
        let out = src.join("canonical");

        let config = Config::minimal();
        convert_tree(&config, &src, &out, None, false, &NoProgress).unwrap();
        let again = convert_tree(&config, &src, &out, None, false, &NoProgress).unwrap();
        assert_eq!(again.outcomes.len(), 1);
    }

    #[test]
    fn test_output_spelled_differently_from_source_is_not_reingested() {
        let tmp = TempDir::new().unwrap();
        let raw = tmp.path().join("raw");
        fs::create_dir_all(&raw).unwrap();
        fs::write(raw.join("a.json"), r#"{"english": "a", "kikuyu": "b"}"#).unwrap();
        let src = tmp.path().join("./raw/../raw");
        let out = raw.join("out");

        let config = Config::minimal();
        convert_tree(&config, &src, &out, None, false, &NoProgress).unwrap();
        let again = convert_tree(&config, &src, &out, None, false, &NoProgress).unwrap();
        assert_eq!(again.outcomes.len(), 1);
        assert!(!out.join("out").exists());
    }

    #[test]
    fn test_non_finite_confidence_is_defaulted_and_bundle_reloads() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("raw");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("b.json"),
            r#"{"batch_info": {}, "flashcards": [
                {"english": "one", "kikuyu": "ĩmwe", "quality": {"confidence_score": "NaN"}},
                {"english": "two", "kikuyu": "igĩrĩ", "quality": {"confidence_score": "inf"}},
                {"english": "three", "kikuyu": "ithatũ", "quality": {"confidence_score": " 3.5 "}}
            ]}"#,
        )
        .unwrap();
        let out = tmp.path().join("out");

        let config = Config::minimal();
        let summary = convert_tree(&config, &src, &out, None, false, &NoProgress).unwrap();
        assert_eq!(summary.converted(), 1);
        assert_eq!(summary.totals.unknown_confidence, 2);

        let loaded = corpus::load_corpus(corpus::discover_files(&config, &out).unwrap());
        assert!(loaded.failed.is_empty());
        assert_eq!(loaded.entry_count(), 3);
        let scores: Vec<f64> = loaded.bundles[0]
            .1
            .entries
            .iter()
            .map(|e| e.quality.confidence_score)
            .collect();
        assert_eq!(scores, vec![4.0, 4.0, 3.5]);
    }
}
