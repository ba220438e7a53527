//! Binary entry point: parse flags, hand off to `pushd::bootstrap::run`.

use clap::Parser;
use pushd::cli::Cli;

#[compio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    pushd::bootstrap::run(cli).await?;
    Ok(())
}
