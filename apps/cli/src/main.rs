//! kbscan CLI: search and export a hosted knowledge base.
//!
//! Walks the knowledge base's public JSON tree, searches article HTML for a
//! term, and streams results to the terminal, to CSV, or over HTTP.

mod commands;
mod server;

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
