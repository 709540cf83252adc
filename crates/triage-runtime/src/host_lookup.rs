use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use triage_dedupe::{CandidateLookup, TriageItem};
use triage_github::TriageHost;
use triage_vector::ItemType;

use crate::item_conversion::{issue_to_triage_item, pull_request_to_triage_item};

#[derive(Clone)]
/// Fetches neighbor details from the hosting API.
pub struct HostCandidateLookup {
    host: Arc<dyn TriageHost>,
}

impl HostCandidateLookup {
    pub fn new(host: Arc<dyn TriageHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl CandidateLookup for HostCandidateLookup {
    async fn lookup_candidate(&self, item_type: ItemType, number: u64) -> Result<Option<TriageItem>> {
        let item = match item_type {
            ItemType::Issue => {
                let issue = self
                    .host
                    .get_issue(number)
                    .await
                    .with_context(|| format!("failed to fetch issue #{number}"))?;
                // The issues endpoint also answers for PR numbers.
                if issue.is_pull_request() {
                    return Ok(None);
                }
                issue_to_triage_item(&issue)
            }
            ItemType::PullRequest => {
                let pull_request = self
                    .host
                    .get_pull_request(number)
                    .await
                    .with_context(|| format!("failed to fetch pull request #{number}"))?;
                pull_request_to_triage_item(&pull_request)
            }
        };
        Ok(Some(item))
    }
}
