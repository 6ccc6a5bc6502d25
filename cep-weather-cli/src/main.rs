//! Binary crate for the `cep-weather` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Running the finder or validator service
//! - One-shot lookups and interactive configuration

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    cmd.run().await
}
