use chrono::{DateTime, Utc};
use triage_dedupe::TriageItem;
use triage_github::{GithubIssue, GithubPullRequest};
use triage_vector::ContentIdentity;

/// Parses a GitHub RFC 3339 timestamp; unparsable values map to the epoch.
pub fn parse_created_at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_default()
}

pub fn issue_to_triage_item(issue: &GithubIssue) -> TriageItem {
    TriageItem {
        identity: ContentIdentity::Issue {
            number: issue.number,
        },
        title: issue.title.clone(),
        body: issue.body.clone().unwrap_or_default(),
        url: issue.html_url.clone(),
        created_at: parse_created_at(&issue.created_at),
        is_open: issue.is_open(),
    }
}

/// PR identity pins the head commit so a new push gets a fresh embedding.
pub fn pull_request_to_triage_item(pull_request: &GithubPullRequest) -> TriageItem {
    TriageItem {
        identity: ContentIdentity::PullRequest {
            number: pull_request.number,
            head_sha: pull_request.head.sha.clone(),
        },
        title: pull_request.title.clone(),
        body: pull_request.body.clone().unwrap_or_default(),
        url: pull_request.html_url.clone(),
        created_at: parse_created_at(&pull_request.created_at),
        is_open: pull_request.is_open(),
    }
}
