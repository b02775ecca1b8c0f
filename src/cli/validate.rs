//! Validate a snapshot.
//!
//! Checks, in order:
//!
//! 1. every attribute definition (scope, name, calculated-attribute
//!    restrictions, catalog reference, default value)
//! 2. every type-level composition rule
//! 3. every item composition edge, and that items nest without cycles
//! 4. that the formulas visible to each variant are acyclic
//! 5. that every item's variant belongs to its detail type

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::CliConfig;
use crate::composition::{children_first_order, validate_base_composition, validate_item_child};
use crate::config::EngineConfig;
use crate::engine::CatalogEngine;
use crate::providers::CatalogRepository;
use crate::snapshot::CatalogSnapshot;

/// Check a snapshot for definition-level errors.
#[derive(Args)]
pub struct ValidateCommand {
    /// Snapshot file (.json, .yaml, .yml or .toml)
    #[arg(short, long, value_name = "FILE")]
    pub snapshot: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Output format for command results.
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON for scripts
    Json,
}

/// Aggregated validation outcome.
#[derive(Debug, Default, Serialize)]
pub struct ValidationResults {
    pub valid: bool,
    pub attributes_checked: usize,
    pub compositions_checked: usize,
    pub variants_checked: usize,
    pub items_checked: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidateCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot cannot be loaded or is invalid.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine_config = config.engine_config().await?;
        let snapshot = CatalogSnapshot::load(&self.snapshot).await?;
        let mut results = validate_snapshot(&snapshot, &engine_config);

        if self.strict && !results.warnings.is_empty() {
            results.errors.append(&mut results.warnings);
        }
        results.valid = results.errors.is_empty();

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            OutputFormat::Text if !config.quiet => print_results(&results),
            OutputFormat::Text => {}
        }

        if results.valid {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Validation failed with {} error(s)", results.errors.len()))
        }
    }
}

/// Run every check against `snapshot`.
#[must_use]
pub fn validate_snapshot(snapshot: &CatalogSnapshot, config: &EngineConfig) -> ValidationResults {
    let mut results = ValidationResults::default();

    for attribute in snapshot.attributes() {
        results.attributes_checked += 1;
        let mut cleaned = attribute.clone();
        if let Err(e) = cleaned.clean(config.number_precision, snapshot) {
            results.errors.push(format!("Attribute {}: {e}", attribute.id));
        }
    }

    for composition in snapshot.base_compositions() {
        results.compositions_checked += 1;
        if let Err(e) = validate_base_composition(snapshot, &composition) {
            results.errors.push(format!("Composition {}: {e}", composition.id));
        }
    }

    for edge in snapshot.item_children() {
        results.compositions_checked += 1;
        if let Err(e) = validate_item_child(snapshot, edge) {
            results.errors.push(format!("Item child {}: {e}", edge.id));
        }
    }
    if let Err(e) = children_first_order(snapshot) {
        results.errors.push(e.to_string());
    }

    let engine = CatalogEngine::new(config.clone());
    for variant in snapshot.variants() {
        results.variants_checked += 1;
        if let Err(cycle) = engine.sorted_attributes(snapshot, variant.id) {
            results.errors.push(format!("Variant {}: {cycle}", variant.id));
        }
        if variant.marking_template.trim().is_empty() {
            results.warnings.push(format!("Variant {} has no marking template", variant.id));
        }
    }

    for item in snapshot.items() {
        results.items_checked += 1;
        match item.variant_id.map(|id| (id, snapshot.variant(id))) {
            None => results.warnings.push(format!("Item {} has no variant", item.id)),
            Some((id, None)) => results.errors.push(format!("Item {}: variant {id} not found", item.id)),
            Some((id, Some(variant))) if variant.detail_type_id != item.detail_type_id => results.errors.push(
                format!("Item {}: variant {id} does not belong to detail type {}", item.id, item.detail_type_id),
            ),
            Some(_) => {}
        }
    }

    results.valid = results.errors.is_empty();
    results
}

fn print_results(results: &ValidationResults) {
    for warning in &results.warnings {
        println!("{} {warning}", "⚠".yellow());
    }
    for error in &results.errors {
        println!("{} {error}", "✗".red());
    }
    if results.valid {
        println!(
            "{} Snapshot is valid ({} attributes, {} compositions, {} variants, {} items)",
            "✓".green(),
            results.attributes_checked,
            results.compositions_checked,
            results.variants_checked,
            results.items_checked
        );
    }
}
