use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level monitor configuration, re-read at the start of every polling cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub redis_addr: String,
    pub phone_books: Vec<PhoneBook>,
    #[serde(rename = "groupinfo")]
    pub group_info: Vec<GroupInfo>,
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneBook {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupInfo {
    pub id: u64,
    pub name: String,
}

/// A monitored project. The development branch lives on `gitlab_host` under
/// `id`, the release branch on `release_host` under `release_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub id: u64,
    pub name: String,
    pub branch: String,
    pub token: String,
    pub gitlab_host: String,
    pub release_id: u64,
    pub release_branch: String,
    pub release_token: String,
    pub release_host: String,
    pub group_id: u64,
    pub message_group: String,
    pub message_at: String,
    pub intro: String,
}

/// Where one tracked branch of a project can be fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchTarget<'a> {
    pub host: &'a str,
    pub repository_id: u64,
    pub branch: &'a str,
    pub token: &'a str,
}

impl ProjectConfig {
    pub fn development(&self) -> BranchTarget<'_> {
        BranchTarget {
            host: &self.gitlab_host,
            repository_id: self.id,
            branch: &self.branch,
            token: &self.token,
        }
    }

    pub fn release(&self) -> BranchTarget<'_> {
        BranchTarget {
            host: &self.release_host,
            repository_id: self.release_id,
            branch: &self.release_branch,
            token: &self.release_token,
        }
    }
}

/// Reads the config document from a fixed path on demand.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Config> {
        let data = tokio::fs::read(&self.path).await?;
        let config = serde_json::from_slice(&data)?;
        Ok(config)
    }
}
