use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::issue_tracker::{
    CleanupIssue, IssueTracker, IssueTrackerError, TrackedIssue, CLEANUP_LABEL,
};

const USER_AGENT: &str = "flag-janitor";
// Cap on how much of an error body ends up in logs and API errors
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub api_url: String,
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct CreateIssueRequest<'a> {
    title: String,
    body: String,
    labels: [&'a str; 1],
}

#[derive(Deserialize)]
struct CreateIssueResponse {
    number: i32,
    html_url: String,
}

/// Opens issues through the GitHub REST API (`POST /repos/{owner}/{repo}/issues`).
pub struct GithubIssueTracker {
    client: Client,
    settings: GithubSettings,
}

impl GithubIssueTracker {
    pub fn new(settings: GithubSettings) -> Result<Self, IssueTrackerError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            header::HeaderValue::from_static("2022-11-28"),
        );
        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()?;

        Ok(Self { client, settings })
    }

    fn issues_url(&self) -> Result<String, IssueTrackerError> {
        let missing: Vec<&str> = [
            ("GITHUB_TOKEN", &self.settings.token),
            ("GITHUB_OWNER", &self.settings.owner),
            ("GITHUB_REPO", &self.settings.repo),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(IssueTrackerError::NotConfigured(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        Ok(format!(
            "{}/repos/{}/{}/issues",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.owner,
            self.settings.repo
        ))
    }
}

#[async_trait]
impl IssueTracker for GithubIssueTracker {
    #[instrument(skip_all, fields(flag_key = %issue.flag_key))]
    async fn create_cleanup_issue(
        &self,
        issue: &CleanupIssue,
    ) -> Result<TrackedIssue, IssueTrackerError> {
        let url = self.issues_url()?;
        let request = CreateIssueRequest {
            title: issue.title(),
            body: issue.body(),
            labels: [CLEANUP_LABEL],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            tracing::warn!(status = status.as_u16(), "GitHub rejected issue creation");
            return Err(IssueTrackerError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateIssueResponse = response.json().await?;
        tracing::info!(number = created.number, url = %created.html_url, "Created cleanup issue");

        Ok(TrackedIssue {
            url: created.html_url,
            number: created.number,
        })
    }
}
