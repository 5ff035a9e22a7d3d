//! lepilote binary entry point

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lepilote::Cli::parse().run().await
}
