use anyhow::Result;
use async_trait::async_trait;

use crate::github_api_client::GithubApiClient;
use crate::github_types::{
    GithubIssue, GithubIssueComment, GithubLabel, GithubPullRequest, GithubPullRequestFile,
};

#[async_trait]
/// Hosting operations the triage runtime depends on.
///
/// Reads never mix item kinds: issue listings exclude pull requests.
/// `add_labels` with an empty list must not reach the network.
pub trait TriageHost: Send + Sync {
    async fn list_open_issues(&self, limit: Option<usize>) -> Result<Vec<GithubIssue>>;
    async fn list_open_pull_requests(&self, limit: Option<usize>)
        -> Result<Vec<GithubPullRequest>>;
    async fn get_issue(&self, number: u64) -> Result<GithubIssue>;
    async fn get_pull_request(&self, number: u64) -> Result<GithubPullRequest>;
    async fn get_pull_request_diff(&self, number: u64) -> Result<String>;
    async fn list_pull_request_files(&self, number: u64) -> Result<Vec<GithubPullRequestFile>>;
    async fn list_repository_labels(&self) -> Result<Vec<GithubLabel>>;
    async fn list_issue_comments(&self, number: u64) -> Result<Vec<GithubIssueComment>>;
    /// Posts a comment and returns its id.
    async fn create_issue_comment(&self, number: u64, body: &str) -> Result<u64>;
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()>;
}

#[async_trait]
impl TriageHost for GithubApiClient {
    async fn list_open_issues(&self, limit: Option<usize>) -> Result<Vec<GithubIssue>> {
        GithubApiClient::list_open_issues(self, limit).await
    }

    async fn list_open_pull_requests(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<GithubPullRequest>> {
        GithubApiClient::list_open_pull_requests(self, limit).await
    }

    async fn get_issue(&self, number: u64) -> Result<GithubIssue> {
        GithubApiClient::get_issue(self, number).await
    }

    async fn get_pull_request(&self, number: u64) -> Result<GithubPullRequest> {
        GithubApiClient::get_pull_request(self, number).await
    }

    async fn get_pull_request_diff(&self, number: u64) -> Result<String> {
        GithubApiClient::get_pull_request_diff(self, number).await
    }

    async fn list_pull_request_files(&self, number: u64) -> Result<Vec<GithubPullRequestFile>> {
        GithubApiClient::list_pull_request_files(self, number).await
    }

    async fn list_repository_labels(&self) -> Result<Vec<GithubLabel>> {
        GithubApiClient::list_repository_labels(self).await
    }

    async fn list_issue_comments(&self, number: u64) -> Result<Vec<GithubIssueComment>> {
        GithubApiClient::list_issue_comments(self, number).await
    }

    async fn create_issue_comment(&self, number: u64, body: &str) -> Result<u64> {
        let created = GithubApiClient::create_issue_comment(self, number, body).await?;
        Ok(created.id)
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        GithubApiClient::add_labels(self, number, labels).await
    }
}
