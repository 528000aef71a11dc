use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::models::ProjectStatus;

/// Last observed status per project, the baseline for change detection.
///
/// Entries are replaced wholesale on every poll and never removed, so a
/// project dropped from the config keeps its last entry for the lifetime of
/// the cache.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: Mutex<HashMap<u64, ProjectStatus>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_baseline(statuses: impl IntoIterator<Item = ProjectStatus>) -> Self {
        let entries = statuses.into_iter().map(|s| (s.id, s)).collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Stores `status` and returns the entry it replaced.
    pub async fn swap(&self, status: ProjectStatus) -> Option<ProjectStatus> {
        self.entries.lock().await.insert(status.id, status)
    }

    #[cfg(test)]
    pub async fn get(&self, project_id: u64) -> Option<ProjectStatus> {
        self.entries.lock().await.get(&project_id).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
