//! promptgen CLI: compiles command documents into prompt artifacts for
//! another agent runtime and verifies the checked-in artifacts.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
