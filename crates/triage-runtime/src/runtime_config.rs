use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
/// Side-effect policy and per-run settings for `TriageRuntime`.
pub struct TriageRuntimeConfig {
    /// `owner/repo`, used to label reports.
    pub repository: String,
    /// Post duplicate/related comments on sources and targets.
    pub post_comments: bool,
    /// Apply suggested labels (and `duplicate_label`).
    pub apply_labels: bool,
    /// Label added to both sides of a confirmed duplicate, if it exists.
    pub duplicate_label: Option<String>,
    /// Vision document text; vision alignment is skipped without one.
    pub vision_document: Option<String>,
    /// Per-item budget. Overruns are logged, never aborted.
    pub soft_deadline: Duration,
    /// Cap on issues and on pull requests fetched for a backlog run.
    pub backlog_limit: Option<usize>,
}

impl Default for TriageRuntimeConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            post_comments: false,
            apply_labels: false,
            duplicate_label: None,
            vision_document: None,
            soft_deadline: Duration::from_secs(60),
            backlog_limit: None,
        }
    }
}
