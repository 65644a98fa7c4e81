//! # Kikuyu Curator
//!
//! Content curation pipeline for a Kikuyu-English flashcard application.
//!
//! Vocabulary, proverbs, and grammar examples arrive as JSON in several
//! historical shapes. The pipeline normalizes them into one canonical
//! entry format, removes duplicates across overlapping files, and exports
//! per-category bundles mirrored into every client app's asset tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌────────────┐   ┌──────────────┐
//! │ legacy     │──▶│ convert   │──▶│ dedup      │──▶│ export       │
//! │ JSON files │   │ canonical │   │ by content │   │ Android, web │
//! └────────────┘   └───────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! curate convert --source raw/ --output content/
//! curate dedup --source content/ --report dedup-report.json
//! curate export --source content/ --output android/app/src/main/assets --output web/public
//! curate reconcile --source content/ --target android/app/src/main/assets
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Entry and bundle types |
//! | [`legacy`] | Recognition of historical document shapes |
//! | [`convert`] | Legacy to canonical conversion |
//! | [`corpus`] | Source tree discovery and bundle loading |
//! | [`dedup`] | Corpus-wide deduplication and reporting |
//! | [`export`] | Category aggregation and multi-target export |
//! | [`reconcile`] | Entry-count reconciliation |
//! | [`stats`] | Corpus breakdowns |
//! | [`progress`] | stderr progress reporting |

pub mod config;
pub mod convert;
pub mod corpus;
pub mod dedup;
pub mod export;
pub mod legacy;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod stats;
