use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};

use crate::config::ConfigLoader;
use crate::error::Result;
use crate::models::ProjectStatus;
use crate::monitor::{fetch_all, Fetcher, StatusCache};
use crate::store::Storage;

/// Owns the change-detection baseline and drives one cycle at a time.
pub struct Poller {
    fetcher: Fetcher,
    config: ConfigLoader,
    storage: Storage,
    cache: Arc<StatusCache>,
}

impl Poller {
    pub fn new(fetcher: Fetcher, config: ConfigLoader, storage: Storage) -> Self {
        Self {
            fetcher,
            config,
            storage,
            cache: Arc::new(StatusCache::new()),
        }
    }

    /// Reloads the config, polls every project and stores the snapshot.
    pub async fn run_cycle(&self) -> Result<Vec<ProjectStatus>> {
        let config = Arc::new(self.config.load().await?);

        let statuses = fetch_all(&self.fetcher, config, &self.cache).await;

        if let Err(e) = self.storage.save(statuses.clone()).await {
            error!("Failed to save project status: {e}");
        }

        Ok(statuses)
    }

    /// Polls forever with `interval` between cycles. Config errors skip the
    /// cycle and are retried after the same delay.
    pub async fn run(self, interval: Duration) {
        loop {
            if let Err(e) = self.run_cycle().await {
                warn!(
                    "Failed to load config from {}: {e}",
                    self.config.path().display()
                );
            }
            tokio::time::sleep(interval).await;
        }
    }
}
