use async_trait::async_trait;
use tokio::sync::RwLock;

use super::StatusStore;
use crate::error::Result;
use crate::models::ProjectStatus;

/// In-process snapshot behind a single reader/writer lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: RwLock<Vec<ProjectStatus>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn save(&self, statuses: Vec<ProjectStatus>) -> Result<()> {
        *self.snapshot.write().await = statuses;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<ProjectStatus>> {
        Ok(self.snapshot.read().await.clone())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
