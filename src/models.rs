use serde::{Deserialize, Serialize};

/// Latest CI run for a branch, passed through from upstream as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineInfo {
    pub id: u64,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitInfo {
    pub sha: String,
    pub short_sha: String,
    pub author: String,
    pub created_at: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchStatus {
    pub commit: CommitInfo,
    pub pipeline: PipelineInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthColor {
    Red,
    #[default]
    Yellow,
    Green,
}

impl HealthColor {
    /// Summarizes the development and release pipeline statuses.
    ///
    /// A failure on either branch wins over everything, then any in-flight
    /// pipeline, and only two successes give green. Empty or unknown statuses
    /// fall through to yellow.
    pub fn from_pipelines(development: &str, release: &str) -> Self {
        let statuses = [development, release];

        if statuses.contains(&"failed") {
            return Self::Red;
        }
        if statuses.iter().any(|s| matches!(*s, "pending" | "running")) {
            return Self::Yellow;
        }
        if statuses.iter().all(|s| *s == "success") {
            return Self::Green;
        }
        Self::Yellow
    }
}

impl std::fmt::Display for HealthColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
        };
        f.write_str(name)
    }
}

/// Snapshot of one project, the unit of storage, comparison and notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectStatus {
    pub id: u64,
    pub name: String,
    pub group_id: u64,
    pub branch: String,
    pub intro: String,
    pub development: BranchStatus,
    pub release: BranchStatus,
    pub status_color: HealthColor,
}

/// First 8 characters of a commit SHA, or the whole SHA when shorter.
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(8) {
        Some((end, _)) => &sha[..end],
        None => sha,
    }
}
