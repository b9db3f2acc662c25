//! Prints the effective pipeline configuration as JSON.

use clap::StructOpt;
use eyre::Result;
use talon::{cli::Cli, config::Config};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config =
        cli.config.as_ref().map(|path| Config::load(path)).transpose()?.unwrap_or_default();
    cli.apply(&mut config);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
