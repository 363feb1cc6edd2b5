use anyhow::Result;
use clap::Parser;
use csvagent::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    csvagent::run(args).await
}
