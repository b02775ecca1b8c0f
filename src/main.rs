//! catcalc CLI entry point
//!
//! Parses the command line, runs the command and prints errors with context
//! and suggestions:
//! - `recalculate` - Recalculate items of a snapshot
//! - `order` - Show the evaluation order of a variant's attributes
//! - `render` - Render a marking template or formula
//! - `validate` - Validate a snapshot

use anyhow::Result;
use catalog_calc::cli;
use catalog_calc::core::user_friendly_error;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
