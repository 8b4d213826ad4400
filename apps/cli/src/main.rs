//! docweave CLI: incremental document consolidation.
//!
//! Runs the Parse, Split, Consolidate and Render phases over a local document
//! tree and reports what changed, what was reused and what failed.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
