//! Latest-status persistence shared by the poller (writer) and the read API.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};

use crate::config::{ConfigLoader, GroupInfo};
use crate::error::Result;
use crate::models::ProjectStatus;

pub const UNGROUPED: &str = "ungrouped";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend holding the most recent snapshot of every project.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Replaces the stored snapshot with `statuses`.
    async fn save(&self, statuses: Vec<ProjectStatus>) -> Result<()>;

    /// Returns the current snapshot.
    async fn load(&self) -> Result<Vec<ProjectStatus>>;

    fn backend(&self) -> &'static str;
}

/// The selected store plus the config source used to resolve group names.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn StatusStore>,
    config: ConfigLoader,
}

impl Storage {
    pub fn new(store: Arc<dyn StatusStore>, config: ConfigLoader) -> Self {
        Self { store, config }
    }

    /// Picks the backend once at startup. Redis is used when `redis_addr` is
    /// set and reachable; anything else falls back to memory.
    pub async fn connect(redis_addr: Option<&str>, config: ConfigLoader) -> Self {
        let store: Arc<dyn StatusStore> = match redis_addr.filter(|addr| !addr.is_empty()) {
            Some(addr) => match RedisStore::connect(addr, CONNECT_TIMEOUT).await {
                Ok(store) => {
                    info!("Storing project status in redis at {addr}");
                    Arc::new(store)
                }
                Err(e) => {
                    error!("Redis connection failed, falling back to memory: {e}");
                    Arc::new(MemoryStore::new())
                }
            },
            None => {
                info!("No redis configured, storing project status in memory");
                Arc::new(MemoryStore::new())
            }
        };

        Self::new(store, config)
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn save(&self, statuses: Vec<ProjectStatus>) -> Result<()> {
        self.store.save(statuses).await
    }

    pub async fn load(&self) -> Result<Vec<ProjectStatus>> {
        self.store.load().await
    }

    /// Snapshot partitioned by group name, each group sorted by project ID.
    pub async fn load_grouped(&self) -> Result<BTreeMap<String, Vec<ProjectStatus>>> {
        let config = self.config.load().await?;
        let statuses = self.store.load().await.unwrap_or_else(|e| {
            error!("Failed to load project status: {e}");
            Vec::new()
        });

        Ok(group_statuses(statuses, &config.group_info))
    }
}

pub fn group_statuses(
    statuses: Vec<ProjectStatus>,
    groups: &[GroupInfo],
) -> BTreeMap<String, Vec<ProjectStatus>> {
    let mut grouped: BTreeMap<String, Vec<ProjectStatus>> = BTreeMap::new();

    for status in statuses {
        let name = groups
            .iter()
            .find(|group| status.group_id != 0 && group.id == status.group_id)
            .map(|group| group.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNGROUPED);

        grouped.entry(name.to_string()).or_default().push(status);
    }

    for bucket in grouped.values_mut() {
        bucket.sort_by_key(|status| status.id);
    }

    grouped
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn status(id: u64, group_id: u64) -> ProjectStatus {
        ProjectStatus {
            id,
            group_id,
            ..ProjectStatus::default()
        }
    }

    fn groups() -> Vec<GroupInfo> {
        vec![
            GroupInfo {
                id: 1,
                name: "platform".to_string(),
            },
            GroupInfo {
                id: 2,
                name: "payments".to_string(),
            },
            GroupInfo {
                id: 3,
                name: String::new(),
            },
        ]
    }

    fn ids(statuses: &[ProjectStatus]) -> Vec<u64> {
        statuses.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_group_statuses_partitions_and_sorts() {
        let grouped = group_statuses(
            vec![status(9, 1), status(3, 2), status(5, 1), status(1, 1), status(2, 2)],
            &groups(),
        );

        assert_eq!(grouped.len(), 2);
        assert_eq!(ids(&grouped["platform"]), vec![1, 5, 9]);
        assert_eq!(ids(&grouped["payments"]), vec![2, 3]);
    }

    #[test]
    fn test_group_statuses_ungrouped_bucket() {
        let grouped = group_statuses(
            vec![status(8, 42), status(4, 0), status(6, 3), status(7, 1)],
            &groups(),
        );

        assert_eq!(ids(&grouped[UNGROUPED]), vec![4, 6, 8]);
        assert_eq!(ids(&grouped["platform"]), vec![7]);
    }

    #[test]
    fn test_group_zero_is_ungrouped_even_if_configured() {
        let groups = vec![GroupInfo {
            id: 0,
            name: "zero".to_string(),
        }];

        let grouped = group_statuses(vec![status(1, 0)], &groups);

        assert!(grouped.contains_key(UNGROUPED));
        assert!(!grouped.contains_key("zero"));
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_grouped_reloads_config() {
        let file = config_file(r#"{"groupinfo": [{"id": 1, "name": "platform"}]}"#);
        let storage = Storage::new(Arc::new(MemoryStore::new()), ConfigLoader::new(file.path()));

        storage
            .save(vec![status(3, 1), status(2, 99), status(1, 1)])
            .await
            .unwrap();

        let grouped = storage.load_grouped().await.unwrap();
        assert_eq!(ids(&grouped["platform"]), vec![1, 3]);
        assert_eq!(ids(&grouped[UNGROUPED]), vec![2]);
    }

    #[tokio::test]
    async fn test_load_grouped_propagates_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(
            Arc::new(MemoryStore::new()),
            ConfigLoader::new(dir.path().join("config.json")),
        );

        assert!(storage.load_grouped().await.is_err());
    }

    #[tokio::test]
    async fn test_connect_without_redis_uses_memory() {
        let storage = Storage::connect(None, ConfigLoader::new("config.json")).await;
        assert_eq!(storage.backend(), "memory");

        let storage = Storage::connect(Some(""), ConfigLoader::new("config.json")).await;
        assert_eq!(storage.backend(), "memory");
    }

    #[tokio::test]
    async fn test_connect_falls_back_when_redis_unreachable() {
        let storage = Storage::connect(Some("127.0.0.1:1"), ConfigLoader::new("config.json")).await;

        assert_eq!(storage.backend(), "memory");
        storage.save(vec![status(1, 0)]).await.unwrap();
        assert_eq!(ids(&storage.load().await.unwrap()), vec![1]);
    }
}
