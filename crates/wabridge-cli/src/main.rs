//! wabridge CLI entry point.

use clap::Parser;
use wabridge_cli::{logging, run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = wabridge_cli::load_config(cli.config.as_deref())?;

    logging::init(&config.logging, cli.verbose);

    run(cli, config).await
}
