use log::{debug, error, info};
use reqwest::Client;

use super::cache::StatusCache;
use super::notifier::{detect_changes, Notification, Notifier};
use crate::auth::Token;
use crate::config::{BranchTarget, Config, ProjectConfig};
use crate::error::Result;
use crate::models::{short_sha, BranchStatus, CommitInfo, HealthColor, ProjectStatus};
use crate::providers::gitlab::GitLabClient;

/// Fetches the status of a single project and reports transitions.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    notifier: Notifier,
}

impl Fetcher {
    pub fn new(client: Client, notifier: Notifier) -> Self {
        Self { client, notifier }
    }

    /// Polls both tracked branches of `project`.
    ///
    /// Never fails: upstream errors are logged and leave the affected fields
    /// empty. The fresh status becomes the new baseline in `cache`, and any
    /// change against the previous baseline is handed to the notifier.
    pub async fn fetch_one(
        &self,
        project: &ProjectConfig,
        config: &Config,
        cache: &StatusCache,
    ) -> ProjectStatus {
        let development = self
            .fetch_branch(&project.name, "Dev", project.development())
            .await;
        let release = self
            .fetch_branch(&project.name, "Release", project.release())
            .await;

        let status_color =
            HealthColor::from_pipelines(&development.pipeline.status, &release.pipeline.status);

        let status = ProjectStatus {
            id: project.id,
            name: project.name.clone(),
            group_id: project.group_id,
            branch: project.branch.clone(),
            intro: project.intro.clone(),
            development,
            release,
            status_color,
        };

        if let Some(previous) = cache.swap(status.clone()).await {
            for event in detect_changes(&previous, &status) {
                debug!("[{}] detected {event}", project.name);
                if let Some(notification) =
                    Notification::compose(event, project, &status, &config.phone_books)
                {
                    self.notifier.notify(notification);
                }
            }
        }

        status
    }

    async fn fetch_branch(
        &self,
        project: &str,
        label: &str,
        target: BranchTarget<'_>,
    ) -> BranchStatus {
        debug!("[{project}] Fetch {label} commits from {}", target.host);

        match self.try_fetch_branch(project, label, target).await {
            Ok(status) => status,
            Err(e) => {
                error!("[{project}] {label} fetch failed: {e}");
                BranchStatus::default()
            }
        }
    }

    async fn try_fetch_branch(
        &self,
        project: &str,
        label: &str,
        target: BranchTarget<'_>,
    ) -> Result<BranchStatus> {
        let client = GitLabClient::new(
            self.client.clone(),
            target.host,
            Some(Token::from(target.token)),
        )?;

        let Some(commit) = client
            .fetch_latest_commit(target.repository_id, target.branch)
            .await?
        else {
            info!("[{project}] {label} branch '{}' has no commits", target.branch);
            return Ok(BranchStatus::default());
        };

        let commit = CommitInfo {
            short_sha: short_sha(&commit.id).to_string(),
            sha: commit.id,
            author: commit.author_name,
            created_at: commit.created_at,
            message: commit.title,
        };
        info!(
            "[{project}] {label} commit: {} by {} at {} msg: {}",
            commit.sha, commit.author, commit.created_at, commit.message
        );

        let pipeline = match client
            .fetch_latest_pipeline(target.repository_id, target.branch)
            .await
        {
            Ok(Some(pipeline)) => {
                info!("[{project}] {label} latest pipeline status: {}", pipeline.status);
                pipeline
            }
            Ok(None) => Default::default(),
            Err(e) => {
                error!("[{project}] {label} pipeline fetch failed: {e}");
                Default::default()
            }
        };

        Ok(BranchStatus { commit, pipeline })
    }
}
