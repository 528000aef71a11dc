mod auth;
mod cli;
mod config;
mod error;
mod models;
mod monitor;
mod poller;
mod providers;
mod server;
mod store;
mod view;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting ci-monitor");
    cli.execute().await?;

    Ok(())
}
