//! Core data models used throughout the curation pipeline.
//!
//! An [`Entry`] is one bilingual flashcard (English source text, Kikuyu
//! target text). Entries live inside a [`ContentBundle`], the file-level
//! container every pipeline stage reads and writes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Category tag of an entry. Serialized in snake_case (`"vocabulary"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Vocabulary,
    Phrases,
    Grammar,
    Proverbs,
    Conjugations,
    Cultural,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Vocabulary,
        Category::Phrases,
        Category::Grammar,
        Category::Proverbs,
        Category::Conjugations,
        Category::Cultural,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Vocabulary => "vocabulary",
            Category::Phrases => "phrases",
            Category::Grammar => "grammar",
            Category::Proverbs => "proverbs",
            Category::Conjugations => "conjugations",
            Category::Cultural => "cultural",
        }
    }

    /// Accepts the spellings found in hand-edited batches: any case,
    /// singular or plural, and a few historical synonyms.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match normalize_tag(raw).as_str() {
            "vocabulary" | "vocab" | "word" | "words" => Some(Category::Vocabulary),
            "phrase" | "phrases" | "expression" | "expressions" => Some(Category::Phrases),
            "grammar" => Some(Category::Grammar),
            "proverb" | "proverbs" | "saying" | "sayings" => Some(Category::Proverbs),
            "conjugation" | "conjugations" | "verb_conjugation" | "verb_conjugations" => {
                Some(Category::Conjugations)
            }
            "cultural" | "culture" => Some(Category::Cultural),
            _ => None,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Vocabulary
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::parse_lenient(s).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown category: '{}'. Must be one of: {}",
                s,
                Category::ALL
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }

    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match normalize_tag(raw).as_str() {
            "beginner" | "basic" | "easy" => Some(Difficulty::Beginner),
            "intermediate" | "medium" => Some(Difficulty::Intermediate),
            "advanced" | "hard" => Some(Difficulty::Advanced),
            _ => None,
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Beginner
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Difficulty::parse_lenient(s).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown difficulty: '{}'. Must be beginner, intermediate, or advanced.",
                s
            )
        })
    }
}

/// Where the text of an entry came from, as far as quality is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceQuality {
    NativeSpeaker,
    Academic,
    Educational,
    Dictionary,
    Community,
}

impl SourceQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceQuality::NativeSpeaker => "native_speaker",
            SourceQuality::Academic => "academic",
            SourceQuality::Educational => "educational",
            SourceQuality::Dictionary => "dictionary",
            SourceQuality::Community => "community",
        }
    }

    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match normalize_tag(raw).as_str() {
            "native_speaker" | "native" => Some(SourceQuality::NativeSpeaker),
            "academic" => Some(SourceQuality::Academic),
            "educational" | "education" => Some(SourceQuality::Educational),
            "dictionary" | "wiktionary" => Some(SourceQuality::Dictionary),
            "community" => Some(SourceQuality::Community),
            _ => None,
        }
    }

    /// `community` is what the converter fills in when nothing was set,
    /// so any other value counts as explicitly curated.
    pub fn is_default(&self) -> bool {
        *self == SourceQuality::Community
    }
}

impl Default for SourceQuality {
    fn default() -> Self {
        SourceQuality::Community
    }
}

impl fmt::Display for SourceQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_CONFIDENCE: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    #[serde(default)]
    pub verified: bool,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(default)]
    pub source_quality: SourceQuality,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            verified: false,
            confidence_score: DEFAULT_CONFIDENCE,
            source_quality: SourceQuality::Community,
        }
    }
}

pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Provenance block. Keys other than the well-known ones are kept in
/// `extra` so nothing a curator wrote is lost on the way through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_origin() -> String {
    UNKNOWN_ORIGIN.to_string()
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            attribution: None,
            license: None,
            created_date: None,
            last_updated: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Provenance {
    /// Build a provenance block from an already-layered key map.
    pub fn from_map(map: Map<String, Value>) -> Self {
        let mut prov = Provenance::default();
        for (key, value) in map {
            match key.as_str() {
                "origin" => {
                    if let Some(s) = value_as_text(&value) {
                        prov.origin = s;
                    }
                }
                "attribution" => prov.attribution = value_as_text(&value),
                "license" => prov.license = value_as_text(&value),
                "created_date" => prov.created_date = value_as_text(&value),
                "last_updated" => prov.last_updated = value_as_text(&value),
                _ => {
                    prov.extra.insert(key, value);
                }
            }
        }
        prov
    }
}

/// One canonical bilingual flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(default)]
    pub source_text: String,
    #[serde(default)]
    pub target_text: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub source: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultural_notes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grammatical_info: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
}

/// A reportable problem with a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryIssue {
    EmptySourceText,
    EmptyTargetText,
}

impl fmt::Display for EntryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryIssue::EmptySourceText => f.write_str("empty source_text"),
            EntryIssue::EmptyTargetText => f.write_str("empty target_text"),
        }
    }
}

impl Entry {
    pub fn issues(&self) -> Vec<EntryIssue> {
        let mut issues = Vec::new();
        if self.source_text.trim().is_empty() {
            issues.push(EntryIssue::EmptySourceText);
        }
        if self.target_text.trim().is_empty() {
            issues.push(EntryIssue::EmptyTargetText);
        }
        issues
    }

    pub fn is_valid(&self) -> bool {
        self.issues().is_empty()
    }

    /// Business key: trimmed `(source_text, target_text)`. `None` for
    /// entries missing either side; those never take part in content dedup.
    pub fn content_key(&self) -> Option<(String, String)> {
        let source = self.source_text.trim();
        let target = self.target_text.trim();
        if source.is_empty() || target.is_empty() {
            return None;
        }
        Some((source.to_string(), target.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub curator: String,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub total_entries: usize,
    #[serde(default)]
    pub description: String,
}

/// File-level container: metadata plus entry list.
///
/// `metadata.total_entries` is recomputed by [`ContentBundle::render`]
/// and never trusted from input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBundle {
    pub metadata: BundleMetadata,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl ContentBundle {
    pub fn new(metadata: BundleMetadata, entries: Vec<Entry>) -> Self {
        let mut bundle = Self { metadata, entries };
        bundle.refresh_totals();
        bundle
    }

    pub fn refresh_totals(&mut self) {
        self.metadata.total_entries = self.entries.len();
    }

    /// Pretty JSON with a trailing newline, totals refreshed first.
    pub fn render(&mut self) -> Result<String> {
        self.refresh_totals();
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn write_to(&mut self, path: &Path) -> Result<()> {
        let json = self.render()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write bundle: {}", path.display()))?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bundle: {}", path.display()))?;
        let bundle: ContentBundle = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse bundle: {}", path.display()))?;
        Ok(bundle)
    }
}

fn normalize_tag(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Strings pass through; numbers and booleans are stringified; anything
/// else (null, arrays, objects) yields `None`.
pub(crate) fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
