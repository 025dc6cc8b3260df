//! NLDI CLI - Command line tool for polygon queries against the NHDPlus network.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "nldi-cli",
    version,
    about = "Catchments, flowlines and stream gages for an area of interest"
)]
struct Cli {
    #[command(flatten)]
    services: nldi_cmd::ServiceArgs,

    #[command(subcommand)]
    command: nldi_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    nldi_cmd::run(cli.command, cli.services).await
}
