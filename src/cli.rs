use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use crate::config::ConfigLoader;
use crate::monitor::{Fetcher, Notifier};
use crate::poller::Poller;
use crate::providers::gitlab::build_http_client;
use crate::server;
use crate::store::{MemoryStore, Storage};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "ci-monitor")]
#[command(author, version, about = "GitLab commit and pipeline status monitor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON config, re-read on every polling cycle
    #[arg(short, long, global = true, env = "CI_MONITOR_CONFIG", default_value = "config.json")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll continuously and serve the aggregated status over HTTP
    Serve {
        /// Address the status API listens on
        #[arg(short, long, env = "CI_MONITOR_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Seconds to wait between polling cycles
        #[arg(short, long, default_value_t = 5)]
        interval: u64,

        /// Redis address, overriding `redis_addr` from the config
        #[arg(short, long, env = "CI_MONITOR_REDIS_ADDR")]
        redis_addr: Option<String>,
    },
    /// Run a single polling cycle and print the snapshot as JSON
    Poll {
        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty print JSON output
        #[arg(short, long, default_value_t = false)]
        pretty: bool,
    },
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let loader = ConfigLoader::new(self.config.clone());

        match &self.command {
            Commands::Serve {
                bind,
                interval,
                redis_addr,
            } => {
                let redis_addr = match redis_addr {
                    Some(addr) => Some(addr.clone()),
                    None => match loader.load().await {
                        Ok(config) => Some(config.redis_addr),
                        Err(e) => {
                            warn!("Could not read redis_addr from config: {e}");
                            None
                        }
                    },
                };

                let storage = Storage::connect(redis_addr.as_deref(), loader.clone()).await;
                info!("Status backend: {}", storage.backend());

                let http = build_http_client()?;
                let (notifier, worker) = Notifier::spawn(http.clone());
                let poller = Poller::new(Fetcher::new(http, notifier), loader, storage.clone());

                info!("Polling every {interval}s");
                let polling = tokio::spawn(poller.run(Duration::from_secs(*interval)));

                let shutdown = async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for shutdown signal: {e}");
                        std::future::pending::<()>().await;
                    }
                    info!("Shutting down");
                };
                let served = server::serve(*bind, storage, shutdown).await;

                polling.abort();
                let _ = polling.await;
                if tokio::time::timeout(SHUTDOWN_GRACE, worker.join()).await.is_err() {
                    warn!("Pending notifications abandoned after {}s", SHUTDOWN_GRACE.as_secs());
                }

                served?;
                Ok(())
            }
            Commands::Poll { output, pretty } => {
                let storage = Storage::new(Arc::new(MemoryStore::new()), loader.clone());

                let http = build_http_client()?;
                let (notifier, worker) = Notifier::spawn(http.clone());
                let poller = Poller::new(Fetcher::new(http, notifier), loader, storage.clone());

                poller.run_cycle().await?;
                drop(poller);
                worker.join().await;

                let statuses = storage.load().await?;

                // Serialize to JSON
                let json_output = if *pretty {
                    serde_json::to_string_pretty(&statuses)?
                } else {
                    serde_json::to_string(&statuses)?
                };

                // Write to output
                if let Some(output_path) = output {
                    std::fs::write(output_path, json_output)?;
                    info!("Snapshot written to: {}", output_path.display());
                } else {
                    println!("{json_output}");
                }

                Ok(())
            }
        }
    }
}
