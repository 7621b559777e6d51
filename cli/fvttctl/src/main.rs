//! fvttctl (fvtt) - CLI for Foundry VTT license switching
//!
//! Submits activation intents against the resource store and waits for the
//! license controller to confirm them.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod intent;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
