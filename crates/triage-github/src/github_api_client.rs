use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::github_transport_helpers::{
    is_retryable_github_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};
use crate::github_types::{
    GithubIssue, GithubIssueComment, GithubLabel, GithubPullRequest, GithubPullRequestFile,
};
use crate::repo_ref::RepoRef;

const GITHUB_PAGE_SIZE: usize = 100;
const GITHUB_DIFF_ACCEPT: &str = "application/vnd.github.v3.diff";

#[derive(Debug, Clone)]
pub struct GithubApiClientConfig {
    pub api_base: String,
    pub token: String,
    pub repo: RepoRef,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubCommentCreateResponse {
    pub id: u64,
    pub html_url: Option<String>,
}

#[derive(Clone)]
/// REST client scoped to one repository.
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    repo: RepoRef,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubApiClient {
    pub fn new(config: GithubApiClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("backlog-triage"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", config.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo,
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    pub fn repo(&self) -> &RepoRef {
        &self.repo
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base,
            self.repo.owner,
            self.repo.name,
            suffix.trim_start_matches('/')
        )
    }

    /// Lists open issues, dropping pull requests the issues API mixes in.
    pub async fn list_open_issues(&self, limit: Option<usize>) -> Result<Vec<GithubIssue>> {
        let url = self.repo_url("issues");
        let rows = self
            .paginate::<GithubIssue>("list issues", &url, &[("state", "open")], limit, |issue| {
                !issue.is_pull_request()
            })
            .await?;
        Ok(rows)
    }

    pub async fn list_open_pull_requests(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<GithubPullRequest>> {
        let url = self.repo_url("pulls");
        self.paginate::<GithubPullRequest>(
            "list pull requests",
            &url,
            &[("state", "open")],
            limit,
            |_| true,
        )
        .await
    }

    pub async fn get_issue(&self, number: u64) -> Result<GithubIssue> {
        let url = self.repo_url(&format!("issues/{number}"));
        self.request_json("get issue", || self.http.get(&url)).await
    }

    pub async fn get_pull_request(&self, number: u64) -> Result<GithubPullRequest> {
        let url = self.repo_url(&format!("pulls/{number}"));
        self.request_json("get pull request", || self.http.get(&url))
            .await
    }

    pub async fn get_pull_request_diff(&self, number: u64) -> Result<String> {
        let url = self.repo_url(&format!("pulls/{number}"));
        let response = self
            .send_with_retries("get pull request diff", || {
                self.http
                    .get(&url)
                    .header(reqwest::header::ACCEPT, GITHUB_DIFF_ACCEPT)
            })
            .await?;
        response
            .text()
            .await
            .context("failed to read github get pull request diff body")
    }

    pub async fn list_pull_request_files(&self, number: u64) -> Result<Vec<GithubPullRequestFile>> {
        let url = self.repo_url(&format!("pulls/{number}/files"));
        self.paginate("list pull request files", &url, &[], None, |_| true)
            .await
    }

    pub async fn list_repository_labels(&self) -> Result<Vec<GithubLabel>> {
        let url = self.repo_url("labels");
        self.paginate("list labels", &url, &[], None, |_| true)
            .await
    }

    pub async fn list_issue_comments(&self, number: u64) -> Result<Vec<GithubIssueComment>> {
        let url = self.repo_url(&format!("issues/{number}/comments"));
        self.paginate("list issue comments", &url, &[], None, |_| true)
            .await
    }

    pub async fn create_issue_comment(
        &self,
        number: u64,
        body: &str,
    ) -> Result<GithubCommentCreateResponse> {
        let url = self.repo_url(&format!("issues/{number}/comments"));
        let payload = json!({ "body": body });
        self.request_json("create issue comment", || {
            self.http.post(&url).json(&payload)
        })
        .await
    }

    /// Adds existing labels; an empty list issues no request.
    pub async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(&format!("issues/{number}/labels"));
        let payload = json!({ "labels": labels });
        let _: Vec<GithubLabel> = self
            .request_json("add labels", || self.http.post(&url).json(&payload))
            .await?;
        Ok(())
    }

    async fn paginate<T>(
        &self,
        operation: &str,
        url: &str,
        filters: &[(&str, &str)],
        limit: Option<usize>,
        keep: impl Fn(&T) -> bool,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let per_page = GITHUB_PAGE_SIZE.to_string();
            let chunk: Vec<T> = self
                .request_json(operation, || {
                    self.http
                        .get(url)
                        .query(filters)
                        .query(&[("per_page", per_page.as_str()), ("page", page_value.as_str())])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk.into_iter().filter(|row| keep(row)));
            if let Some(limit) = limit {
                if rows.len() >= limit {
                    rows.truncate(limit);
                    break;
                }
            }
            if chunk_len < GITHUB_PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    async fn request_json<T, F>(&self, operation: &str, request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.send_with_retries(operation, request_builder).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode github {operation}"))
    }

    async fn send_with_retries<F>(
        &self,
        operation: &str,
        mut request_builder: F,
    ) -> Result<reqwest::Response>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header(
                    "x-triage-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_github_status(status.as_u16())
                    {
                        tracing::debug!(operation, attempt, status = status.as_u16(), "retrying github request");
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }
}
