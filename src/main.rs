//! # Kikuyu Curator CLI (`curate`)
//!
//! Each pipeline stage is its own command and can be run independently.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `curate convert` | Convert legacy JSON shapes into canonical bundles |
//! | `curate dedup` | Find and remove duplicates across a canonical tree |
//! | `curate export` | Deduplicate, group by category, and mirror into client asset trees |
//! | `curate reconcile` | Explain entry-count discrepancies between files and targets |
//! | `curate stats` | Entry breakdown by category, difficulty, and source quality |
//!
//! ## Examples
//!
//! ```bash
//! curate convert --source raw/ --output content/ --limit 20
//! curate dedup --source content/ --output content/ --report dedup.json
//! curate export --source content/ --output android/app/src/main/assets --output web/public
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kikuyu_curator::config;
use kikuyu_curator::convert;
use kikuyu_curator::dedup;
use kikuyu_curator::export;
use kikuyu_curator::progress::ProgressMode;
use kikuyu_curator::reconcile;
use kikuyu_curator::stats;

/// Kikuyu Curator: normalize, deduplicate, and export Kikuyu-English
/// flashcard content.
#[derive(Parser)]
#[command(
    name = "curate",
    about = "Kikuyu Curator: normalize, deduplicate, and export flashcard content",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/curate.toml` when it exists, otherwise
    /// built-in defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress on stderr: `off`, `human`, or `json`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert legacy JSON documents into canonical bundles.
    ///
    /// Every `*.json` file under the source tree is written to the same
    /// relative path under the output directory.
    Convert {
        /// Directory of raw JSON files (defaults to `source.root`).
        #[arg(long)]
        source: Option<PathBuf>,

        /// Directory for canonical bundles (defaults to `convert.output`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Show counts without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Detect duplicates across a canonical tree.
    ///
    /// Entries with identical (source_text, target_text) collapse to one.
    /// Entries sharing an id but differing in content are reported as
    /// conflicts and left in place.
    Dedup {
        /// Directory of canonical bundles (defaults to `convert.output`).
        #[arg(long)]
        source: Option<PathBuf>,

        /// Write the surviving entries back out, one file per input file.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the full report as JSON.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Report only; write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Rebuild per-category bundles and mirror them into every target.
    ///
    /// The curated-content subtree of each target is replaced entirely.
    Export {
        /// Directory of canonical bundles (defaults to `convert.output`).
        #[arg(long)]
        source: Option<PathBuf>,

        /// Target asset directory. Repeat for several targets
        /// (defaults to `export.targets`).
        #[arg(long = "output")]
        outputs: Vec<PathBuf>,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Show what would be exported without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Explain entry-count discrepancies.
    Reconcile {
        /// Raw or canonical content directory (defaults to `source.root`).
        #[arg(long)]
        source: Option<PathBuf>,

        /// Export target to compare. Repeat for several targets
        /// (defaults to `export.targets`).
        #[arg(long = "target")]
        targets: Vec<PathBuf>,
    },

    /// Show entry counts by category, difficulty, and source quality.
    Stats {
        /// Raw or canonical content directory (defaults to `source.root`).
        #[arg(long)]
        source: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::resolve_config(cli.config.as_deref())?;
    let reporter = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Convert {
            source,
            output,
            limit,
            dry_run,
        } => {
            let source = source.unwrap_or_else(|| cfg.source.root.clone());
            let output = output.unwrap_or_else(|| cfg.convert.output.clone());
            convert::run_convert(&cfg, &source, &output, limit, dry_run, &*reporter)?;
        }
        Commands::Dedup {
            source,
            output,
            report,
            limit,
            dry_run,
        } => {
            let source = source.unwrap_or_else(|| cfg.convert.output.clone());
            dedup::run_dedup(
                &cfg,
                &source,
                output.as_deref(),
                report.as_deref(),
                limit,
                dry_run,
                &*reporter,
            )?;
        }
        Commands::Export {
            source,
            outputs,
            limit,
            dry_run,
        } => {
            let source = source.unwrap_or_else(|| cfg.convert.output.clone());
            export::run_export(&cfg, &source, &outputs, limit, dry_run, &*reporter)?;
        }
        Commands::Reconcile { source, targets } => {
            let source = source.unwrap_or_else(|| cfg.source.root.clone());
            reconcile::run_reconcile(&cfg, &source, &targets)?;
        }
        Commands::Stats { source } => {
            let source = source.unwrap_or_else(|| cfg.source.root.clone());
            stats::run_stats(&cfg, &source)?;
        }
    }

    Ok(())
}
