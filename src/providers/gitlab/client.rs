use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::auth::Token;
use crate::error::{MonitorError, Result};
use crate::models::PipelineInfo;

pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitLabCommitDto {
    pub id: String,
    pub author_name: String,
    pub created_at: String,
    pub title: String,
}

/// Shared HTTP client for upstream hosts and webhook delivery.
pub fn build_http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("ci-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| MonitorError::Config(format!("Failed to create HTTP client: {e}")))
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(MonitorError::Api(format!("Failed to fetch {what}: {status} - {body}")))
}

impl GitLabClient {
    pub fn new(client: Client, base_url: &str, token: Option<Token>) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| MonitorError::Config(format!("Invalid base URL '{base_url}': {e}")))?;

        // Url::join replaces the last segment unless the path ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let api_url = base
            .join("api/v4/")
            .map_err(|e| MonitorError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    /// Helper to build authenticated requests
    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) if !token.is_empty() => request.header("PRIVATE-TOKEN", token.as_str()),
            _ => request,
        }
    }

    fn project_url(&self, project_id: u64) -> Result<Url> {
        self.api_url
            .join(&format!("projects/{project_id}/"))
            .map_err(|e| MonitorError::Config(format!("Invalid project URL: {e}")))
    }

    /// Newest commit on `branch`, or `None` when the branch has no commits.
    pub async fn fetch_latest_commit(
        &self,
        project_id: u64,
        branch: &str,
    ) -> Result<Option<GitLabCommitDto>> {
        let url = self
            .project_url(project_id)?
            .join("repository/commits")
            .map_err(|e| MonitorError::Config(format!("Invalid commits URL: {e}")))?;

        let request = self.client.get(url).query(&[("ref_name", branch)]);
        let request = self.auth_request(request);

        let response = check_status(request.send().await?, "commits").await?;
        let commits = response.json::<Vec<GitLabCommitDto>>().await?;
        Ok(commits.into_iter().next())
    }

    /// Most recent pipeline run for `branch`.
    pub async fn fetch_latest_pipeline(
        &self,
        project_id: u64,
        branch: &str,
    ) -> Result<Option<PipelineInfo>> {
        let url = self
            .project_url(project_id)?
            .join("pipelines")
            .map_err(|e| MonitorError::Config(format!("Invalid pipelines URL: {e}")))?;

        let request = self
            .client
            .get(url)
            .query(&[("ref", branch), ("per_page", "1")]);
        let request = self.auth_request(request);

        let response = check_status(request.send().await?, "pipelines").await?;
        let pipelines = response.json::<Vec<PipelineInfo>>().await?;
        Ok(pipelines.into_iter().next())
    }
}
