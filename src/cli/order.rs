//! Show the evaluation order of a variant's attributes.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::CliConfig;
use super::validate::OutputFormat;
use crate::core::CatalogError;
use crate::engine::CatalogEngine;
use crate::models::Attribute;
use crate::providers::CatalogRepository;
use crate::resolver::extract_dependencies;
use crate::snapshot::CatalogSnapshot;

/// Print the attributes of a variant in the order they are evaluated.
#[derive(Args)]
pub struct OrderCommand {
    /// Snapshot file (.json, .yaml, .yml or .toml)
    #[arg(short, long, value_name = "FILE")]
    pub snapshot: PathBuf,

    /// Variant id
    #[arg(long)]
    pub variant: i64,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct OrderedAttribute<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    formula: Option<&'a str>,
    depends_on: Vec<String>,
}

impl OrderCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Fails for an unknown variant or when the formulas form a cycle.
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine = CatalogEngine::new(config.engine_config().await?);
        let snapshot = CatalogSnapshot::load(&self.snapshot).await?;
        if snapshot.variant(self.variant).is_none() {
            return Err(CatalogError::NotFound {
                kind: "variant",
                id: self.variant,
            }
            .into());
        }

        let sorted = engine.sorted_attributes(&snapshot, self.variant).map_err(CatalogError::from)?;
        let ordered: Vec<OrderedAttribute<'_>> = sorted.iter().map(describe).collect();

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ordered)?),
            OutputFormat::Text => {
                for (index, attribute) in ordered.iter().enumerate() {
                    match attribute.formula {
                        Some(formula) => println!("{:>3}. {} = {}", index + 1, attribute.name.bold(), formula.cyan()),
                        None => println!("{:>3}. {}", index + 1, attribute.name.bold()),
                    }
                }
            }
        }
        Ok(())
    }
}

fn describe(attribute: &Attribute) -> OrderedAttribute<'_> {
    let formula = attribute.formula();
    OrderedAttribute {
        name: &attribute.name,
        formula,
        depends_on: formula.map(|f| extract_dependencies(f).into_iter().collect()).unwrap_or_default(),
    }
}
