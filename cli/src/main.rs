use std::process::ExitCode;

use activity_feed_cli::Cli;
use activity_feed_cli::run_main;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    run_main(cli).await
}
