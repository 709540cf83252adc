//! GitHub boundary for backlog triage.
//! This crate provides typed issue/PR records, the REST client and the
//! `TriageHost` seam used by the orchestrator, plus label filtering and
//! comment templates with idempotency markers.

pub mod github_api_client;
pub mod github_transport_helpers;
pub mod github_types;
pub mod label_filter;
pub mod repo_ref;
pub mod triage_comment;
pub mod triage_host;

pub use github_api_client::{GithubApiClient, GithubApiClientConfig};
pub use github_types::{
    GithubIssue, GithubIssueComment, GithubLabel, GithubPullRequest, GithubPullRequestFile,
    GithubPullRequestHead, GithubUser,
};
pub use repo_ref::RepoRef;
pub use triage_host::TriageHost;
