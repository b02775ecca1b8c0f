//! Command-line interface for catcalc.
//!
//! `catcalc` runs the calculation engine against catalog snapshots (JSON,
//! YAML or TOML files holding detail types, variants, attributes, items and
//! reference catalogs).
//!
//! # Available Commands
//!
//! - `recalculate` - Recompute parameters, markings and derived quantities
//! - `order` - Show the evaluation order of a variant's attributes
//! - `render` - Render a marking template or formula with ad-hoc values
//! - `validate` - Check attribute definitions, compositions and formula cycles
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Suppress all output except errors
//! - `--no-progress` - Disable progress bars
//! - `--config` - Path to a configuration file
//!
//! # Example
//!
//! ```bash
//! catcalc validate --snapshot catalog.yaml
//! catcalc recalculate --snapshot catalog.yaml --category product --output out.yaml
//! catcalc order --snapshot catalog.yaml --variant 12
//! catcalc render "FHD {{ <detail_HDH>.m * 2 }}" --child detail_HDH.m=3
//! ```

mod order;
mod recalculate;
mod render;
mod validate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::engine::ProgressBar;

pub use order::OrderCommand;
pub use recalculate::RecalculateCommand;
pub use render::RenderCommand;
pub use validate::{OutputFormat, ValidateCommand};

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// `EnvFilter` directive; `None` disables logging
    pub log_level: Option<String>,
    pub no_progress: bool,
    pub quiet: bool,
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the global tracing subscriber. `RUST_LOG` takes precedence.
    pub fn init_logging(&self) {
        let filter = match (&self.log_level, std::env::var("RUST_LOG")) {
            (_, Ok(directive)) if !directive.is_empty() => EnvFilter::new(directive),
            (Some(level), _) => EnvFilter::new(format!("catalog_calc={level}")),
            (None, _) => return,
        };
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
    }

    /// Progress bar for `len` steps, hidden when progress is off.
    #[must_use]
    pub fn progress_bar(&self, len: u64) -> ProgressBar {
        if self.no_progress || self.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(len)
        }
    }

    /// Load and check the engine configuration.
    ///
    /// # Errors
    ///
    /// Fails when the configuration cannot be read or holds invalid values.
    pub async fn engine_config(&self) -> Result<EngineConfig> {
        let config = EngineConfig::load(self.config_path.as_deref()).await?;
        config.validate()?;
        Ok(config)
    }
}

/// Main CLI structure.
#[derive(Parser)]
#[command(
    name = "catcalc",
    about = "Parametric catalog calculator - resolve attributes and compile markings",
    version,
    author,
    long_about = "catcalc resolves calculated attributes in dependency order, compiles marking templates and \
                  validates catalog snapshots."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to a configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Recalculate items of a snapshot
    Recalculate(RecalculateCommand),

    /// Show the evaluation order of a variant's attributes
    Order(OrderCommand),

    /// Render a marking template or formula
    Render(RenderCommand),

    /// Validate a snapshot
    Validate(ValidateCommand),
}

impl Cli {
    /// Execute the selected command.
    ///
    /// # Errors
    ///
    /// Propagates the command's error.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("warn".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            quiet: self.quiet,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Propagates the command's error.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Recalculate(cmd) => cmd.execute(&config).await,
            Commands::Order(cmd) => cmd.execute(&config).await,
            Commands::Render(cmd) => cmd.execute(&config).await,
            Commands::Validate(cmd) => cmd.execute(&config).await,
        }
    }
}
