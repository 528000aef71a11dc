use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, warn};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};

use super::StatusStore;
use crate::error::{MonitorError, Result};
use crate::models::ProjectStatus;

const KEY_PREFIX: &str = "project:";

/// One JSON value per project under `project:<id>`, without expiry.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects and verifies the server answers `PING` within `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(connection_url(addr))?;

        // Probe with a single attempt; the manager would keep retrying.
        let mut probe = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| MonitorError::Config(format!("Timed out connecting to redis at {addr}")))??;
        let _: String = redis::cmd("PING").query_async(&mut probe).await?;

        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| MonitorError::Config(format!("Timed out connecting to redis at {addr}")))??;

        Ok(Self { conn })
    }
}

fn connection_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

fn key_for(project_id: u64) -> String {
    format!("{KEY_PREFIX}{project_id}")
}

/// Decodes one stored value. Missing or undecodable values are skipped.
fn decode_status(key: &str, value: Option<String>) -> Option<ProjectStatus> {
    let value = value?;
    match serde_json::from_str::<ProjectStatus>(&value) {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("Skipping undecodable {key}: {e}");
            None
        }
    }
}

/// Writes every status through `write`. A failed key is logged and the batch
/// continues. Returns the number of keys that were not written.
async fn write_each<F, Fut>(statuses: &[ProjectStatus], mut write: F) -> usize
where
    F: FnMut(String, String) -> Fut,
    Fut: Future<Output = RedisResult<()>>,
{
    let mut failed = 0;

    for status in statuses {
        let key = key_for(status.id);
        let payload = match serde_json::to_string(status) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize {key}: {e}");
                failed += 1;
                continue;
            }
        };

        if let Err(e) = write(key.clone(), payload).await {
            error!("Redis write failed for {key}: {e}");
            failed += 1;
        }
    }

    failed
}

/// Reads every key through `read`, skipping failed reads and bad values.
async fn read_each<F, Fut>(keys: Vec<String>, mut read: F) -> Vec<ProjectStatus>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = RedisResult<Option<String>>>,
{
    let mut statuses = Vec::with_capacity(keys.len());

    for key in keys {
        let value = match read(key.clone()).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Redis read failed for {key}: {e}");
                continue;
            }
        };
        statuses.extend(decode_status(&key, value));
    }

    statuses
}

#[async_trait]
impl StatusStore for RedisStore {
    async fn save(&self, statuses: Vec<ProjectStatus>) -> Result<()> {
        let failed = write_each(&statuses, |key, payload| {
            let mut conn = self.conn.clone();
            async move { conn.set::<_, _, ()>(key, payload).await }
        })
        .await;

        if failed > 0 {
            warn!("{failed} of {} project statuses not written", statuses.len());
        }

        Ok(())
    }

    async fn load(&self) -> Result<Vec<ProjectStatus>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{KEY_PREFIX}*")).await?;

        Ok(read_each(keys, |key| {
            let mut conn = self.conn.clone();
            async move { conn.get::<_, Option<String>>(key).await }
        })
        .await)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
