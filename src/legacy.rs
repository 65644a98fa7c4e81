//! Recognition of historical export formats.
//!
//! Every raw document is classified exactly once into a [`LegacyShape`];
//! the converter then matches on the variant instead of probing fields.
//! Shapes are tried in a fixed order:
//!
//! 1. `{batch_info, flashcards}`: older batch exports.
//! 2. `{metadata, entries}`: canonical or nearly canonical bundles.
//! 3. A bare card: direct text fields and no collection key.
//! 4. A card list found under `entries`/`flashcards` (top level or
//!    under `data`), or a top-level array.
//! 5. Anything else is wrapped as a single card.

use serde_json::{Map, Value};

/// Fields whose presence marks an object as a single card.
const CARD_FIELDS: &[&str] = &["source_text", "target_text", "english", "kikuyu"];

/// Keys that mark an object as a container of cards.
const COLLECTION_KEYS: &[&str] = &[
    "batch_info",
    "flashcards",
    "metadata",
    "entries",
    "data",
    "cards",
];

#[derive(Debug, Clone, PartialEq)]
pub enum LegacyShape {
    Batch {
        batch_info: Map<String, Value>,
        flashcards: Vec<Value>,
    },
    Bundle {
        metadata: Map<String, Value>,
        entries: Vec<Value>,
    },
    SingleCard(Map<String, Value>),
    CardList {
        /// Batch-level metadata found next to the list, if any.
        scope: Map<String, Value>,
        cards: Vec<Value>,
    },
    Wrapped(Value),
}

impl LegacyShape {
    pub fn detect(doc: Value) -> Self {
        let mut obj = match doc {
            Value::Object(obj) => obj,
            Value::Array(cards) => {
                return LegacyShape::CardList {
                    scope: Map::new(),
                    cards,
                }
            }
            other => return LegacyShape::Wrapped(other),
        };

        if obj.contains_key("batch_info") && is_array(&obj, "flashcards") {
            let flashcards = take_array(&mut obj, "flashcards");
            return LegacyShape::Batch {
                batch_info: take_object(&mut obj, "batch_info"),
                flashcards,
            };
        }

        if obj.contains_key("metadata") && is_array(&obj, "entries") {
            let entries = take_array(&mut obj, "entries");
            return LegacyShape::Bundle {
                metadata: take_object(&mut obj, "metadata"),
                entries,
            };
        }

        let has_card_field = CARD_FIELDS.iter().any(|k| obj.contains_key(*k));
        let has_collection_key = COLLECTION_KEYS.iter().any(|k| obj.contains_key(*k));
        if has_card_field && !has_collection_key {
            return LegacyShape::SingleCard(obj);
        }

        for key in ["entries", "flashcards"] {
            if is_array(&obj, key) {
                let cards = take_array(&mut obj, key);
                return LegacyShape::CardList {
                    scope: batch_scope(&mut obj),
                    cards,
                };
            }
        }

        let mut nested = None;
        if let Some(Value::Object(data)) = obj.get_mut("data") {
            for key in ["entries", "flashcards"] {
                if is_array(data, key) {
                    nested = Some(take_array(data, key));
                    break;
                }
            }
        }
        if let Some(cards) = nested {
            return LegacyShape::CardList {
                scope: batch_scope(&mut obj),
                cards,
            };
        }

        LegacyShape::Wrapped(Value::Object(obj))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LegacyShape::Batch { .. } => "batch",
            LegacyShape::Bundle { .. } => "bundle",
            LegacyShape::SingleCard(_) => "single_card",
            LegacyShape::CardList { .. } => "card_list",
            LegacyShape::Wrapped(_) => "wrapped",
        }
    }
}

fn is_array(obj: &Map<String, Value>, key: &str) -> bool {
    matches!(obj.get(key), Some(Value::Array(_)))
}

fn take_array(obj: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match obj.remove(key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn take_object(obj: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match obj.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// A card list may sit next to `metadata` or `batch_info`; either one is
/// the batch-level scope.
fn batch_scope(obj: &mut Map<String, Value>) -> Map<String, Value> {
    let metadata = take_object(obj, "metadata");
    if !metadata.is_empty() {
        return metadata;
    }
    take_object(obj, "batch_info")
}
