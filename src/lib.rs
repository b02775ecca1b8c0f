//! catalog-calc - calculation engine for a parametric piping-support catalog
//!
//! A catalog describes components at three levels:
//!
//! - **Detail types** (`FHD`, `HDH`, ...) grouped into categories
//! - **Variants**, concrete executions of a detail type with a marking template
//! - **Items**, instances of a variant with parameter values, nested through
//!   composition edges
//!
//! Attributes may be *calculated*: their value is a formula over other
//! attributes of the same item or over attributes of its child components.
//! This crate resolves such attributes in dependency order, renders marking
//! templates and derived quantities, and keeps the caches that make bulk
//! recalculation cheap.
//!
//! # Core Modules
//!
//! ## Calculation
//! - [`resolver`] - Dependency extraction, topological ordering, value resolution
//! - [`templating`] - Bracket-reference preprocessing and strict Tera rendering
//! - [`engine`] - Item recalculation, bulk runs and change events
//! - [`composition`] - Composition graphs and their validation
//!
//! ## Data
//! - [`models`] - Attributes, detail types, variants, items
//! - [`providers`] - Ports to stored catalog data
//! - [`snapshot`] - File-backed catalog data (JSON, YAML, TOML)
//! - [`cache`] - Read-through cache port with an in-memory adapter
//!
//! ## Supporting Modules
//! - [`config`] - Engine configuration (`~/.catcalc/config.toml`)
//! - [`core`] - Error types and user-facing error reporting
//! - [`cli`] - The `catcalc` command line
//!
//! # Formula Syntax
//!
//! ```text
//! d * 2 + s                         bare expression (formulas are auto-wrapped)
//! {{ <detail_HDH-12>.E + 5 }}       attribute E of child component HDH-12
//! {{ <detail_ZZF>.2.L }}            child in composition slot 2
//! FHD {{ d }}x{{ s }}-{{ inner_id|zfill(width=6) }}
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use catalog_calc::engine::CatalogEngine;
//! use catalog_calc::providers::CatalogRepository;
//! use catalog_calc::snapshot::CatalogSnapshot;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let snapshot = CatalogSnapshot::load(Path::new("catalog.yaml")).await?;
//! let engine = CatalogEngine::default();
//!
//! let mut item = snapshot.item(1000).cloned().unwrap_or_default();
//! engine.recalculate_item(&snapshot, &mut item)?;
//! println!("{:?} {:?}", item.marking, item.parameters_errors);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod composition;
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod models;
pub mod providers;
pub mod resolver;
pub mod snapshot;
pub mod templating;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
