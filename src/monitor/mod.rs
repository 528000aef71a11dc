mod cache;
mod fetcher;
mod notifier;

pub use cache::StatusCache;
pub use fetcher::Fetcher;
pub use notifier::Notifier;

use std::sync::Arc;

use log::{error, info};
use tokio::task::JoinSet;

use crate::config::{Config, ProjectConfig};
use crate::models::ProjectStatus;

/// Polls every configured project concurrently.
///
/// Returns exactly one status per project, sorted by project ID. A project
/// whose task dies still gets an identity-only placeholder so that callers
/// always see the full project list. Dropping the returned future aborts every
/// in-flight fetch.
pub async fn fetch_all(
    fetcher: &Fetcher,
    config: Arc<Config>,
    cache: &Arc<StatusCache>,
) -> Vec<ProjectStatus> {
    info!("Polling {} projects...", config.projects.len());

    let mut tasks = JoinSet::new();
    for index in 0..config.projects.len() {
        let fetcher = fetcher.clone();
        let config = Arc::clone(&config);
        let cache = Arc::clone(cache);
        tasks.spawn(async move {
            let project = &config.projects[index];
            (index, fetcher.fetch_one(project, &config, &cache).await)
        });
    }

    let mut slots: Vec<Option<ProjectStatus>> = vec![None; config.projects.len()];
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok((index, status)) => slots[index] = Some(status),
            Err(e) => error!("Fetch task failed: {e}"),
        }
    }

    let mut statuses: Vec<ProjectStatus> = slots
        .into_iter()
        .zip(&config.projects)
        .map(|(slot, project)| slot.unwrap_or_else(|| placeholder(project)))
        .collect();

    statuses.sort_by_key(|status| status.id);

    info!("Polled {} projects", statuses.len());

    statuses
}

fn placeholder(project: &ProjectConfig) -> ProjectStatus {
    ProjectStatus {
        id: project.id,
        name: project.name.clone(),
        group_id: project.group_id,
        branch: project.branch.clone(),
        intro: project.intro.clone(),
        ..ProjectStatus::default()
    }
}
