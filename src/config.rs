use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::models::{Category, Difficulty};

pub const DEFAULT_CONFIG_PATH: &str = "./config/curate.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub curation: CurationConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CurationConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "default_curator")]
    pub curator: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_category")]
    pub default_category: String,
    #[serde(default = "default_difficulty")]
    pub default_difficulty: String,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            curator: default_curator(),
            description: default_description(),
            default_category: default_category(),
            default_difficulty: default_difficulty(),
        }
    }
}

fn default_schema_version() -> String {
    "2.0".to_string()
}
fn default_curator() -> String {
    "kikuyu-curator".to_string()
}
fn default_description() -> String {
    "Kikuyu-English flashcard content".to_string()
}
fn default_category() -> String {
    "vocabulary".to_string()
}
fn default_difficulty() -> String {
    "beginner".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: default_source_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_source_root() -> PathBuf {
    PathBuf::from("content")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConvertConfig {
    #[serde(default = "default_convert_output")]
    pub output: PathBuf,
    /// File-level provenance, the least specific layer.
    #[serde(default)]
    pub provenance: BTreeMap<String, String>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            output: default_convert_output(),
            provenance: BTreeMap::new(),
        }
    }
}

fn default_convert_output() -> PathBuf {
    PathBuf::from("content/canonical")
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdConflictPolicy {
    /// Refuse to export while content-distinct records share an id.
    #[default]
    Abort,
    /// Later-processed record wins; every override is counted.
    LastWins,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DedupConfig {
    #[serde(default)]
    pub id_conflicts: IdConflictPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default)]
    pub targets: Vec<PathBuf>,
    #[serde(default = "default_subtree")]
    pub subtree: String,
    #[serde(default = "default_true")]
    pub unified: bool,
    #[serde(default = "default_unified_file")]
    pub unified_file: String,
    #[serde(default = "default_true")]
    pub drop_invalid: bool,
    /// subcategory -> category reassignment applied by the aggregator.
    #[serde(default)]
    pub category_remap: BTreeMap<String, String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            subtree: default_subtree(),
            unified: true,
            unified_file: default_unified_file(),
            drop_invalid: true,
            category_remap: BTreeMap::new(),
        }
    }
}

fn default_subtree() -> String {
    "curated-content".to_string()
}
fn default_unified_file() -> String {
    "all_entries.json".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Built-in configuration used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            curation: CurationConfig::default(),
            source: SourceConfig::default(),
            convert: ConvertConfig::default(),
            dedup: DedupConfig::default(),
            export: ExportConfig::default(),
        }
    }

    pub fn default_category(&self) -> Category {
        Category::parse_lenient(&self.curation.default_category).unwrap_or_default()
    }

    pub fn default_difficulty(&self) -> Difficulty {
        Difficulty::parse_lenient(&self.curation.default_difficulty).unwrap_or_default()
    }

    pub fn file_provenance(&self) -> Map<String, Value> {
        self.convert
            .provenance
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    }

    /// Parsed `export.category_remap`. Validated at load time.
    pub fn category_remap(&self) -> BTreeMap<String, Category> {
        self.export
            .category_remap
            .iter()
            .filter_map(|(sub, cat)| Category::parse_lenient(cat).map(|c| (sub.clone(), c)))
            .collect()
    }
}

/// Load configuration from `path`, or from the default location.
///
/// An explicitly given path must exist. When no path is given and the
/// default file is absent, [`Config::minimal`] is used.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_config(default_path)
            } else {
                Ok(Config::minimal())
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    config
        .curation
        .default_category
        .parse::<Category>()
        .context("curation.default_category")?;
    config
        .curation
        .default_difficulty
        .parse::<Difficulty>()
        .context("curation.default_difficulty")?;

    if config.curation.schema_version.trim().is_empty() {
        bail!("curation.schema_version must not be empty");
    }

    // The subtree is removed wholesale on every export, so it must be a
    // single plain directory name below each target.
    let subtree = Path::new(&config.export.subtree);
    let mut components = subtree.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => bail!(
            "export.subtree must be a single directory name, got '{}'",
            config.export.subtree
        ),
    }

    if config.export.unified_file.trim().is_empty() || !config.export.unified_file.ends_with(".json")
    {
        bail!("export.unified_file must be a .json file name");
    }

    for (sub, cat) in &config.export.category_remap {
        cat.parse::<Category>()
            .with_context(|| format!("export.category_remap.{}", sub))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.curation.schema_version, "2.0");
        assert_eq!(config.default_category(), Category::Vocabulary);
        assert_eq!(config.default_difficulty(), Difficulty::Beginner);
        assert_eq!(config.dedup.id_conflicts, IdConflictPolicy::Abort);
        assert_eq!(config.export.subtree, "curated-content");
        assert!(config.export.unified);
        assert!(config.export.drop_invalid);
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
[curation]
curator = "Wanjiru"
default_category = "phrases"
default_difficulty = "intermediate"

[source]
root = "data/raw"
exclude_globs = ["**/backup/**"]

[convert.provenance]
origin = "native speaker lessons"
license = "CC-BY-SA-4.0"

[dedup]
id_conflicts = "last_wins"

[export]
targets = ["android/app/src/main/assets", "web/public"]
unified = false

[export.category_remap]
greetings = "phrases"
"#,
        )
        .unwrap();
        assert_eq!(config.default_category(), Category::Phrases);
        assert_eq!(config.dedup.id_conflicts, IdConflictPolicy::LastWins);
        assert_eq!(config.export.targets.len(), 2);
        assert_eq!(
            config.category_remap().get("greetings"),
            Some(&Category::Phrases)
        );
        assert_eq!(
            config.file_provenance().get("license"),
            Some(&Value::String("CC-BY-SA-4.0".to_string()))
        );
    }

    #[test]
    fn test_rejects_nested_subtree() {
        assert!(parse("[export]\nsubtree = \"../assets\"").is_err());
        assert!(parse("[export]\nsubtree = \"a/b\"").is_err());
        assert!(parse("[export]\nsubtree = \"\"").is_err());
    }

    #[test]
    fn test_rejects_unknown_default_category() {
        assert!(parse("[curation]\ndefault_category = \"recipes\"").is_err());
    }

    #[test]
    fn test_rejects_unknown_remap_target() {
        assert!(parse("[export.category_remap]\ngreetings = \"nonsense\"").is_err());
    }
}
