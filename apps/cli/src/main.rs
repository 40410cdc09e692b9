//! citefill CLI: find incomplete LaTeX citations and fill them.
//!
//! Scans manuscripts for empty `\cite{}`-style commands, resolves them
//! against a candidate catalog, and writes keys plus bibliography entries.

mod catalog;
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
