//! Recalculate the items of a snapshot.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::CliConfig;
use super::validate::OutputFormat;
use crate::engine::{CatalogEngine, RecalcFilter, RecalcSummary};
use crate::models::Category;
use crate::snapshot::CatalogSnapshot;

/// Recompute parameters, derived quantities, markings and names.
#[derive(Args)]
pub struct RecalculateCommand {
    /// Snapshot file (.json, .yaml, .yml or .toml)
    #[arg(short, long, value_name = "FILE")]
    pub snapshot: PathBuf,

    /// Only items of this category (detail, assembly_unit, product, billet)
    #[arg(long)]
    pub category: Option<Category>,

    /// Only items of the detail type with this designation
    #[arg(long)]
    pub designation: Option<String>,

    /// Write the result here instead of updating the snapshot in place
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Compute without writing anything
    #[arg(long, conflicts_with = "output")]
    pub dry_run: bool,

    /// Summary format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl RecalculateCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot cannot be loaded or written, or when the item
    /// composition is cyclic. Failures of single items are reported and make
    /// the command fail after the snapshot is written.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine = CatalogEngine::new(config.engine_config().await?);
        let mut snapshot = CatalogSnapshot::load(&self.snapshot).await?;
        let filter = RecalcFilter {
            category: self.category,
            designation: self.designation.clone(),
        };

        let progress = config.progress_bar(snapshot.items().count() as u64);
        let summary = engine.recalculate_all(&mut snapshot, &filter, &progress)?;

        if !self.dry_run {
            let target = self.output.as_ref().unwrap_or(&self.snapshot);
            snapshot.save(target).await.with_context(|| format!("Failed to save {}", target.display()))?;
            tracing::info!("Wrote {}", target.display());
        }

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            OutputFormat::Text if !config.quiet => print_summary(&summary),
            OutputFormat::Text => {}
        }

        if summary.failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("{} item(s) could not be recalculated", summary.failures.len()))
        }
    }
}

fn print_summary(summary: &RecalcSummary) {
    println!("{} Recalculated {} item(s), skipped {}", "✓".green(), summary.recalculated, summary.skipped);
    if summary.parameter_errors > 0 {
        println!("{} {} item(s) have parameter errors", "⚠".yellow(), summary.parameter_errors);
    }
    if summary.marking_errors > 0 {
        println!("{} {} item(s) have marking errors", "⚠".yellow(), summary.marking_errors);
    }
    for (id, message) in &summary.failures {
        println!("{} Item {id}: {message}", "✗".red());
    }
    if !summary.stale.is_empty() {
        let ids: Vec<String> = summary.stale.iter().map(ToString::to_string).collect();
        println!("{} Outside the filter and now stale: {}", "⚠".yellow(), ids.join(", "));
    }
}
